mod condition;
mod mock;
mod probe;

pub use condition::{SyncConditionGate, SyncConditions};
pub use mock::{MockBatteryProbe, MockNetworkProbe};
pub use probe::{BatteryProbe, NetworkProbe, NetworkState};
