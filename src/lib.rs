pub mod app;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod geo;
pub mod heading;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod signals;
pub mod targeting;
pub mod upload;
pub mod visits;

pub use app::{BorghiOrchestrator, ComponentState, ShutdownReason, ShutdownTrigger};
pub use capture::{CaptureOutcome, CaptureSession};
pub use config::BorghiConfig;
pub use error::{BorghiError, EventBusError, Result, UploadError};
pub use events::{BorghiEvent, EventBus, EventFilter, EventReceiver};
pub use gate::{
    BatteryProbe, MockBatteryProbe, MockNetworkProbe, NetworkProbe, NetworkState,
    SyncConditionGate, SyncConditions,
};
pub use geo::{angular_difference, bearing_degrees, distance_km, to_cardinal, Cardinal, Position};
pub use heading::{
    select_source, CompassReading, HeadingSmoother, HeadingSource, HeadingSourceKind,
    HeadingTracker, MagnetometerDerived, MagnetometerReading, NativeCompass,
};
pub use monitor::{DrainAttempt, MonitorHandle, QueueSyncMonitor, SkipReason};
pub use queue::{
    CaptureQueueStore, CaptureRecord, CaptureRequest, CaptureStatus, DrainReport, QueueStats,
};
pub use registry::{RegistryImporter, Village, VillageRegistry};
pub use signals::{PollerHandle, SignalPoller, SysfsBatteryProbe, TcpReachabilityProbe};
pub use targeting::{TargetMatch, TargetMode, TargetOptions, VillageTargeter};
pub use upload::{MockUploader, OutboxUploader, Uploader};
pub use visits::VisitLog;
