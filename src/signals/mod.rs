//! Device-backed network and battery probes, and the poller that turns
//! their readings into bus events.

mod battery;
mod network;
mod poller;

pub use battery::SysfsBatteryProbe;
pub use network::TcpReachabilityProbe;
pub use poller::{PollerHandle, SignalPoller};
