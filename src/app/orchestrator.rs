use super::runtime::ShutdownTrigger;
use super::types::{ComponentState, ShutdownReason};
use crate::capture::CaptureSession;
use crate::config::BorghiConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::gate::{BatteryProbe, NetworkProbe, SyncConditionGate};
use crate::geo::Position;
use crate::heading::{select_source, HeadingTracker, MagnetometerDerived, NativeCompass};
use crate::monitor::{MonitorHandle, QueueSyncMonitor};
use crate::queue::CaptureQueueStore;
use crate::registry::VillageRegistry;
use crate::signals::{PollerHandle, SysfsBatteryProbe, TcpReachabilityProbe};
use crate::targeting::VillageTargeter;
use crate::upload::{OutboxUploader, Uploader};
use crate::visits::VisitLog;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wires the capture and sync pipeline together and owns its background tasks
pub struct BorghiOrchestrator {
    pub(super) config: BorghiConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) targeter: Arc<VillageTargeter>,
    pub(super) store: Arc<CaptureQueueStore>,
    pub(super) visits: Arc<VisitLog>,
    pub(super) monitor: Arc<QueueSyncMonitor>,
    pub(super) network: Arc<dyn NetworkProbe>,
    pub(super) battery: Arc<dyn BatteryProbe>,

    // Running tasks
    pub(super) monitor_handle: Option<MonitorHandle>,
    pub(super) poller_handle: Option<PollerHandle>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_trigger: ShutdownTrigger,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl BorghiOrchestrator {
    /// Build with the Linux probes and the outbox uploader
    pub async fn new(config: BorghiConfig) -> Result<Self> {
        let network: Arc<dyn NetworkProbe> =
            Arc::new(TcpReachabilityProbe::from_config(&config.sync));
        let battery: Arc<dyn BatteryProbe> = Arc::new(SysfsBatteryProbe::from_config(&config.sync));
        let uploader: Arc<dyn Uploader> = Arc::new(OutboxUploader::new(&config.sync.outbox_dir));
        Self::with_components(config, network, battery, uploader).await
    }

    /// Build with caller-supplied probes and uploader
    pub async fn with_components(
        config: BorghiConfig,
        network: Arc<dyn NetworkProbe>,
        battery: Arc<dyn BatteryProbe>,
        uploader: Arc<dyn Uploader>,
    ) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));

        let registry = match VillageRegistry::load_from_file(&config.registry.path).await {
            Ok(registry) => registry,
            Err(e) => {
                warn!(
                    "Village registry {} unavailable, targeting disabled: {}",
                    config.registry.path, e
                );
                VillageRegistry::from_villages(Vec::new())
            }
        };
        let targeter = Arc::new(VillageTargeter::from_config(
            Arc::new(registry),
            &config.targeting,
        ));

        let gate = Arc::new(SyncConditionGate::from_config(
            Arc::clone(&network),
            Arc::clone(&battery),
            &config.sync,
        ));
        let store = Arc::new(CaptureQueueStore::open(&config.queue, gate).await);
        let visits = Arc::new(VisitLog::new(config.visits_path()));
        let monitor =
            QueueSyncMonitor::new(Arc::clone(&store), uploader, Arc::clone(&event_bus));

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        info!(
            "Orchestrator ready: {} villages, queue at {}",
            targeter.registry().len(),
            store.document_path().display()
        );

        Ok(Self {
            config,
            event_bus,
            targeter,
            store,
            visits,
            monitor,
            network,
            battery,
            monitor_handle: None,
            poller_handle: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_trigger: ShutdownTrigger::new(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &BorghiConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn store(&self) -> Arc<CaptureQueueStore> {
        Arc::clone(&self.store)
    }

    pub fn monitor(&self) -> Arc<QueueSyncMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn visits(&self) -> Arc<VisitLog> {
        Arc::clone(&self.visits)
    }

    /// Handle that ends `run()` from elsewhere in the process
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.shutdown_trigger.clone()
    }

    /// Smoothed heading from the compass, or the magnetometer when the
    /// compass is unavailable
    pub fn spawn_heading_tracker(
        &self,
        native: Option<NativeCompass>,
        fallback: MagnetometerDerived,
    ) -> HeadingTracker {
        HeadingTracker::spawn(
            select_source(native, fallback),
            self.config.heading.smoothing_window,
        )
    }

    /// Capture flow fed by the given location and heading feeds
    pub fn capture_session(
        &self,
        position: watch::Receiver<Option<Position>>,
        heading: watch::Receiver<Option<f64>>,
    ) -> CaptureSession {
        CaptureSession::new(
            Arc::clone(&self.targeter),
            Arc::clone(&self.store),
            Arc::clone(&self.visits),
            Arc::clone(&self.event_bus),
            position,
            heading,
        )
    }
}
