use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Point-in-time connectivity snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkState {
    pub connected: bool,
    pub internet_reachable: bool,
}

impl NetworkState {
    pub fn online() -> Self {
        Self {
            connected: true,
            internet_reachable: true,
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }

    pub fn is_online(&self) -> bool {
        self.connected && self.internet_reachable
    }
}

/// Source of network state
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn network_state(&self) -> Result<NetworkState>;
}

/// Source of battery and power-saving state
#[async_trait]
pub trait BatteryProbe: Send + Sync {
    /// Charge level in `0.0..=1.0`
    async fn battery_level(&self) -> Result<f32>;

    /// Whether the OS low-power / battery-saver mode is on
    async fn low_power_mode(&self) -> Result<bool>;
}
