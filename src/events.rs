use crate::error::EventBusError;
use crate::gate::NetworkState;
use crate::queue::DrainReport;
use serde::Serialize;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events shared between the capture flow, the sync monitor and the signal pollers
#[derive(Debug, Clone, Serialize)]
pub enum BorghiEvent {
    /// Connectivity changed
    NetworkStateChanged {
        state: NetworkState,
        timestamp: SystemTime,
    },
    /// Battery level changed (0.0..=1.0)
    BatteryLevelChanged { level: f32, timestamp: SystemTime },
    /// OS battery saver toggled
    LowPowerModeChanged { enabled: bool, timestamp: SystemTime },
    /// A shot was persisted in the queue
    CaptureQueued { capture_id: String, village_id: String },
    /// A village was photographed; consumed by the badge engine
    VillageVisited {
        region_id: String,
        village_id: String,
        village_name: String,
        province_code: Option<String>,
    },
    /// A drain pass finished
    DrainCompleted { report: DrainReport },
    /// A component hit an error it could not recover from locally
    SystemError { component: String, error: String },
    /// Process shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl BorghiEvent {
    pub fn description(&self) -> String {
        match self {
            BorghiEvent::NetworkStateChanged { state, .. } => format!(
                "Network {} (reachable: {})",
                if state.connected {
                    "connected"
                } else {
                    "disconnected"
                },
                state.internet_reachable
            ),
            BorghiEvent::BatteryLevelChanged { level, .. } => {
                format!("Battery at {:.0}%", level * 100.0)
            }
            BorghiEvent::LowPowerModeChanged { enabled, .. } => {
                format!("Low power mode {}", if *enabled { "on" } else { "off" })
            }
            BorghiEvent::CaptureQueued {
                capture_id,
                village_id,
            } => format!("Shot {} queued for {}", capture_id, village_id),
            BorghiEvent::VillageVisited {
                village_name,
                region_id,
                ..
            } => format!("Visited {} ({})", village_name, region_id),
            BorghiEvent::DrainCompleted { report } => format!(
                "Drain completed: {} uploaded, {} to retry, {} failed",
                report.uploaded, report.retried, report.exhausted
            ),
            BorghiEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            BorghiEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            BorghiEvent::NetworkStateChanged { .. } => "network_state_changed",
            BorghiEvent::BatteryLevelChanged { .. } => "battery_level_changed",
            BorghiEvent::LowPowerModeChanged { .. } => "low_power_mode_changed",
            BorghiEvent::CaptureQueued { .. } => "capture_queued",
            BorghiEvent::VillageVisited { .. } => "village_visited",
            BorghiEvent::DrainCompleted { .. } => "drain_completed",
            BorghiEvent::SystemError { .. } => "system_error",
            BorghiEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }

    /// Whether this event can flip the sync gate
    pub fn affects_sync_conditions(&self) -> bool {
        matches!(
            self,
            BorghiEvent::NetworkStateChanged { .. }
                | BorghiEvent::BatteryLevelChanged { .. }
                | BorghiEvent::LowPowerModeChanged { .. }
        )
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<BorghiEvent>,
    debug_logging: bool,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BorghiEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers. Returns the number of receivers.
    pub async fn publish(&self, event: BorghiEvent) -> Result<usize, EventBusError> {
        match &event {
            BorghiEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            BorghiEvent::NetworkStateChanged { state, .. } => {
                if state.is_online() {
                    info!("{}", event.description());
                } else {
                    warn!("{}", event.description());
                }
            }
            BorghiEvent::VillageVisited { .. } | BorghiEvent::ShutdownRequested { .. } => {
                info!("{}", event.description());
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish without caring whether anyone is listening
    pub async fn publish_lossy(&self, event: BorghiEvent) {
        if let Err(e) = self.publish(event).await {
            debug!("Event dropped: {}", e);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
    /// Network, battery and low-power changes
    SyncConditions,
}

impl EventFilter {
    pub fn matches(&self, event: &BorghiEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::SyncConditions => event.affects_sync_conditions(),
        }
    }
}

/// Named receiver that skips events its filter rejects
pub struct EventReceiver {
    receiver: broadcast::Receiver<BorghiEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<BorghiEvent>,
        filter: EventFilter,
        name: impl Into<String>,
    ) -> Self {
        Self {
            receiver,
            filter,
            name: name.into(),
        }
    }

    /// Next matching event. Lag is reported as an error; the receiver stays usable.
    pub async fn recv(&mut self) -> Result<BorghiEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged(n));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
