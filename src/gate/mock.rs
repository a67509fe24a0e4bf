use super::probe::{BatteryProbe, NetworkProbe, NetworkState};
use crate::error::{BorghiError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Network probe with scripted state, for tests and dry runs
#[derive(Debug)]
pub struct MockNetworkProbe {
    state: Mutex<NetworkState>,
    fail: Mutex<bool>,
}

impl MockNetworkProbe {
    pub fn new(state: NetworkState) -> Self {
        Self {
            state: Mutex::new(state),
            fail: Mutex::new(false),
        }
    }

    pub fn online() -> Self {
        Self::new(NetworkState::online())
    }

    pub fn offline() -> Self {
        Self::new(NetworkState::offline())
    }

    pub fn set_state(&self, state: NetworkState) {
        *self.state.lock() = state;
    }

    /// Make every read fail until reset
    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock() = failing;
    }
}

#[async_trait]
impl NetworkProbe for MockNetworkProbe {
    async fn network_state(&self) -> Result<NetworkState> {
        if *self.fail.lock() {
            return Err(BorghiError::probe("mock_network", "scripted failure"));
        }
        Ok(*self.state.lock())
    }
}

#[derive(Debug, Clone, Copy)]
struct BatteryScript {
    level: f32,
    low_power: bool,
    level_fails: bool,
    low_power_fails: bool,
}

/// Battery probe with scripted readings, for tests and dry runs
#[derive(Debug)]
pub struct MockBatteryProbe {
    script: Mutex<BatteryScript>,
}

impl MockBatteryProbe {
    pub fn new(level: f32, low_power: bool) -> Self {
        Self {
            script: Mutex::new(BatteryScript {
                level,
                low_power,
                level_fails: false,
                low_power_fails: false,
            }),
        }
    }

    pub fn charged() -> Self {
        Self::new(1.0, false)
    }

    pub fn set_level(&self, level: f32) {
        self.script.lock().level = level;
    }

    pub fn set_low_power(&self, low_power: bool) {
        self.script.lock().low_power = low_power;
    }

    pub fn set_level_failing(&self, failing: bool) {
        self.script.lock().level_fails = failing;
    }

    pub fn set_low_power_failing(&self, failing: bool) {
        self.script.lock().low_power_fails = failing;
    }
}

#[async_trait]
impl BatteryProbe for MockBatteryProbe {
    async fn battery_level(&self) -> Result<f32> {
        let script = *self.script.lock();
        if script.level_fails {
            return Err(BorghiError::probe("mock_battery", "level unavailable"));
        }
        Ok(script.level)
    }

    async fn low_power_mode(&self) -> Result<bool> {
        let script = *self.script.lock();
        if script.low_power_fails {
            return Err(BorghiError::probe("mock_battery", "low power flag unavailable"));
        }
        Ok(script.low_power)
    }
}
