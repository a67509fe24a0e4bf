use crate::events::{BorghiEvent, EventBus};
use crate::gate::{BatteryProbe, NetworkProbe, NetworkState};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Battery changes smaller than this are not worth an event
const LEVEL_EPSILON: f32 = 0.01;

#[derive(Debug, Default, Clone, Copy)]
struct LastSeen {
    network: Option<NetworkState>,
    level: Option<f32>,
    low_power: Option<bool>,
}

/// Periodically reads the probes and publishes change events.
///
/// The first successful reading of each signal is always published. Failed
/// reads are logged and skipped; they never publish.
pub struct SignalPoller {
    network: Arc<dyn NetworkProbe>,
    battery: Arc<dyn BatteryProbe>,
    event_bus: Arc<EventBus>,
    interval: Duration,
    last: LastSeen,
}

pub struct PollerHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SignalPoller {
    pub fn new(
        network: Arc<dyn NetworkProbe>,
        battery: Arc<dyn BatteryProbe>,
        event_bus: Arc<EventBus>,
        interval: Duration,
    ) -> Self {
        Self {
            network,
            battery,
            event_bus,
            interval,
            last: LastSeen::default(),
        }
    }

    /// Read every probe once and publish what changed. Returns the number of
    /// events published.
    pub async fn poll_once(&mut self) -> usize {
        let mut published = 0;
        let now = SystemTime::now();

        match self.network.network_state().await {
            Ok(state) if self.last.network != Some(state) => {
                self.last.network = Some(state);
                self.event_bus
                    .publish_lossy(BorghiEvent::NetworkStateChanged {
                        state,
                        timestamp: now,
                    })
                    .await;
                published += 1;
            }
            Ok(_) => {}
            Err(e) => warn!("Network poll failed: {}", e),
        }

        match self.battery.battery_level().await {
            Ok(level)
                if self
                    .last
                    .level
                    .map_or(true, |prev| (prev - level).abs() >= LEVEL_EPSILON) =>
            {
                self.last.level = Some(level);
                self.event_bus
                    .publish_lossy(BorghiEvent::BatteryLevelChanged {
                        level,
                        timestamp: now,
                    })
                    .await;
                published += 1;
            }
            Ok(_) => {}
            Err(e) => warn!("Battery poll failed: {}", e),
        }

        match self.battery.low_power_mode().await {
            Ok(enabled) if self.last.low_power != Some(enabled) => {
                self.last.low_power = Some(enabled);
                self.event_bus
                    .publish_lossy(BorghiEvent::LowPowerModeChanged {
                        enabled,
                        timestamp: now,
                    })
                    .await;
                published += 1;
            }
            Ok(_) => {}
            Err(e) => warn!("Low power poll failed: {}", e),
        }

        if published > 0 {
            debug!("Signal poll published {} change(s)", published);
        }
        published
    }

    pub fn spawn(mut self) -> PollerHandle {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        self.poll_once().await;
                    }
                }
            }
            debug!("Signal poller exited");
        });

        info!("Signal poller started");
        PollerHandle {
            token,
            task: Some(task),
        }
    }
}

impl PollerHandle {
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Signal poller ended abnormally: {}", e);
            }
            info!("Signal poller stopped");
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
