use super::{BorghiOrchestrator, ComponentState};
use crate::error::Result;
use crate::signals::SignalPoller;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

impl BorghiOrchestrator {
    /// Register every component as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing Borghi components");

        let mut states = self.component_states.lock().await;
        states.insert("queue".to_string(), ComponentState::Stopped);
        states.insert("signals".to_string(), ComponentState::Stopped);
        states.insert("monitor".to_string(), ComponentState::Stopped);
        drop(states);

        Ok(())
    }

    /// Start the queue, the signal poller and the sync monitor, in that order
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting Borghi sync daemon");

        self.set_component_state("queue", ComponentState::Starting).await;
        self.store.ensure_setup().await;
        let stats = self.store.stats().await?;
        info!(
            "Queue holds {} shots ({} pending, {} done, {} failed)",
            stats.total, stats.pending, stats.done, stats.failed
        );
        self.set_component_state("queue", ComponentState::Running).await;

        // Monitor subscribes before the poller publishes its first readings
        self.set_component_state("monitor", ComponentState::Starting).await;
        self.monitor_handle = Some(self.monitor.start().await);
        self.set_component_state("monitor", ComponentState::Running).await;

        self.set_component_state("signals", ComponentState::Starting).await;
        let poller = SignalPoller::new(
            Arc::clone(&self.network),
            Arc::clone(&self.battery),
            Arc::clone(&self.event_bus),
            Duration::from_secs(self.config.sync.poll_interval_seconds),
        );
        self.poller_handle = Some(poller.spawn());
        self.set_component_state("signals", ComponentState::Running).await;

        info!("Borghi sync daemon started");
        Ok(())
    }
}
