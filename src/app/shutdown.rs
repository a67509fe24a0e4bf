use super::{BorghiOrchestrator, ComponentState};
use crate::error::{BorghiError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl BorghiOrchestrator {
    /// Stop components in reverse start order. Returns the process exit code.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if let Some(mut poller) = self.poller_handle.take() {
            if let Err(e) = self.stop_component("signals", async move { poller.stop().await }).await {
                error!("Error stopping signals: {}", e);
                exit_code = 1;
            }
        }

        // Listener first, then let any in-flight drain write its results
        if let Some(mut handle) = self.monitor_handle.take() {
            let monitor = Arc::clone(&self.monitor);
            let stop = async move {
                handle.stop().await;
                monitor.wait_idle().await;
            };
            if let Err(e) = self.stop_component("monitor", stop).await {
                error!("Error stopping monitor: {}", e);
                exit_code = 1;
            }
        }

        self.set_component_state("queue", ComponentState::Stopped).await;

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component<F>(&self, component: &str, stop: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping).await;

        match timeout(STOP_TIMEOUT, stop).await {
            Ok(()) => {
                self.set_component_state(component, ComponentState::Stopped).await;
                info!("{} component stopped", component);
                Ok(())
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed).await;
                error!("{} component stop timeout", component);
                Err(BorghiError::component(component, "stop timeout"))
            }
        }
    }
}
