use super::probe::{BatteryProbe, NetworkProbe, NetworkState};
use crate::config::SyncConfig;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Inputs the gate decided on, after defaults were applied for failed reads
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SyncConditions {
    pub network: NetworkState,
    pub battery_level: f32,
    pub low_power_mode: bool,
    pub permitted: bool,
}

/// Decides whether a queue drain may run right now.
///
/// Sync needs a connected, internet-reachable network, a battery at or above
/// `min_battery_level`, and low-power mode off. Unreadable battery sensors
/// never block sync: an unknown level counts as full and an unknown
/// low-power flag as off. An unreadable network counts as offline.
pub struct SyncConditionGate {
    network: Arc<dyn NetworkProbe>,
    battery: Arc<dyn BatteryProbe>,
    min_battery_level: f32,
}

impl SyncConditionGate {
    pub fn new(network: Arc<dyn NetworkProbe>, battery: Arc<dyn BatteryProbe>) -> Self {
        Self {
            network,
            battery,
            min_battery_level: 0.15,
        }
    }

    pub fn from_config(
        network: Arc<dyn NetworkProbe>,
        battery: Arc<dyn BatteryProbe>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            network,
            battery,
            min_battery_level: config.min_battery_level,
        }
    }

    pub fn with_min_battery_level(mut self, level: f32) -> Self {
        self.min_battery_level = level;
        self
    }

    pub fn min_battery_level(&self) -> f32 {
        self.min_battery_level
    }

    /// Read every signal and evaluate the gate
    pub async fn evaluate(&self) -> SyncConditions {
        let network = match self.network.network_state().await {
            Ok(state) => state,
            Err(e) => {
                warn!("Network state unreadable, treating as offline: {}", e);
                NetworkState::offline()
            }
        };

        let battery_level = match self.battery.battery_level().await {
            Ok(level) => level,
            Err(e) => {
                warn!("Battery level unreadable, assuming full: {}", e);
                1.0
            }
        };

        let low_power_mode = match self.battery.low_power_mode().await {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!("Low power flag unreadable, assuming off: {}", e);
                false
            }
        };

        let permitted =
            network.is_online() && battery_level >= self.min_battery_level && !low_power_mode;

        debug!(
            "Sync gate: connected={} reachable={} battery={:.2} low_power={} -> {}",
            network.connected,
            network.internet_reachable,
            battery_level,
            low_power_mode,
            permitted
        );

        SyncConditions {
            network,
            battery_level,
            low_power_mode,
            permitted,
        }
    }

    pub async fn can_sync(&self) -> bool {
        self.evaluate().await.permitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{MockBatteryProbe, MockNetworkProbe};

    fn gate(
        network: MockNetworkProbe,
        battery: MockBatteryProbe,
    ) -> (SyncConditionGate, Arc<MockNetworkProbe>, Arc<MockBatteryProbe>) {
        let network = Arc::new(network);
        let battery = Arc::new(battery);
        let gate = SyncConditionGate::new(network.clone(), battery.clone());
        (gate, network, battery)
    }

    #[tokio::test]
    async fn test_permits_when_all_conditions_met() {
        let (gate, _, _) = gate(MockNetworkProbe::online(), MockBatteryProbe::charged());
        assert!(gate.can_sync().await);
    }

    #[tokio::test]
    async fn test_requires_connected_and_reachable() {
        let (gate, network, _) = gate(MockNetworkProbe::online(), MockBatteryProbe::charged());

        network.set_state(NetworkState {
            connected: true,
            internet_reachable: false,
        });
        assert!(!gate.can_sync().await);

        network.set_state(NetworkState {
            connected: false,
            internet_reachable: true,
        });
        assert!(!gate.can_sync().await);

        network.set_failing(true);
        assert!(!gate.can_sync().await);
    }

    #[tokio::test]
    async fn test_battery_threshold_is_inclusive() {
        let (gate, _, battery) = gate(MockNetworkProbe::online(), MockBatteryProbe::new(0.15, false));
        assert!(gate.can_sync().await);

        battery.set_level(0.14);
        assert!(!gate.can_sync().await);
    }

    #[tokio::test]
    async fn test_low_power_blocks() {
        let (gate, _, _) = gate(MockNetworkProbe::online(), MockBatteryProbe::new(0.9, true));
        assert!(!gate.can_sync().await);
    }

    #[tokio::test]
    async fn test_battery_read_failures_are_permissive() {
        let (gate, _, battery) = gate(MockNetworkProbe::online(), MockBatteryProbe::new(0.01, true));
        battery.set_level_failing(true);
        battery.set_low_power_failing(true);

        let conditions = gate.evaluate().await;
        assert_eq!(conditions.battery_level, 1.0);
        assert!(!conditions.low_power_mode);
        assert!(conditions.permitted);
    }

    #[tokio::test]
    async fn test_level_failure_alone_does_not_block() {
        let (gate, _, battery) = gate(MockNetworkProbe::online(), MockBatteryProbe::charged());
        battery.set_level_failing(true);
        assert!(gate.can_sync().await);
    }

    #[tokio::test]
    async fn test_min_level_from_config() {
        let mut config = crate::config::BorghiConfig::default().sync;
        config.min_battery_level = 0.5;
        let network: Arc<dyn NetworkProbe> = Arc::new(MockNetworkProbe::online());
        let battery = Arc::new(MockBatteryProbe::new(0.4, false));
        let gate = SyncConditionGate::from_config(network, battery, &config);
        assert_eq!(gate.min_battery_level(), 0.5);
        assert!(!gate.can_sync().await);
    }
}
