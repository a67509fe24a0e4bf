use super::{BorghiOrchestrator, ShutdownReason};
use crate::error::{BorghiError, Result};
use crate::events::BorghiEvent;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

/// Cloneable one-shot request to stop a running orchestrator
#[derive(Clone)]
pub struct ShutdownTrigger {
    sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
}

impl ShutdownTrigger {
    pub(super) fn new(sender: oneshot::Sender<ShutdownReason>) -> Self {
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    /// Returns `false` if shutdown was already requested
    pub async fn trigger(&self, reason: ShutdownReason) -> bool {
        match self.sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}

impl BorghiOrchestrator {
    /// Run until a signal or a shutdown trigger, then shut down gracefully
    pub async fn run(&mut self) -> Result<i32> {
        info!("Borghi sync daemon is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| BorghiError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| BorghiError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {}", shutdown_reason);
        self.event_bus
            .publish_lossy(BorghiEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: shutdown_reason.to_string(),
            })
            .await;

        let exit_code = self.shutdown().await?;
        info!("Borghi sync daemon shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self) {
        // SIGTERM (systemd stop), Unix only
        #[cfg(unix)]
        {
            let trigger = self.shutdown_trigger.clone();
            let token = self.cancellation_token.clone();
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate())
                {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                tokio::select! {
                    _ = token.cancelled() => {}
                    Some(()) = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        trigger.trigger(ShutdownReason::Signal("SIGTERM".to_string())).await;
                    }
                }
            });
        }

        let trigger = self.shutdown_trigger.clone();
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                Ok(()) = signal::ctrl_c() => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    trigger.trigger(ShutdownReason::Signal("SIGINT".to_string())).await;
                }
            }
        });
    }
}
