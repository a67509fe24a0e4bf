use crate::error::EventBusError;
use crate::events::{BorghiEvent, EventBus, EventFilter, EventReceiver};
use crate::queue::{CaptureQueueStore, DrainReport};
use crate::upload::Uploader;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Why a drain attempt did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyRunning,
    ConditionsNotMet,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyRunning => write!(f, "drain already running"),
            SkipReason::ConditionsNotMet => write!(f, "sync conditions not met"),
        }
    }
}

/// Result of one trigger
#[derive(Debug, Clone, PartialEq)]
pub enum DrainAttempt {
    Completed(DrainReport),
    Skipped(SkipReason),
    Failed(String),
}

/// Runs queue drains when sync conditions allow, at most one at a time.
///
/// Triggers that arrive while a drain is in flight are dropped, not queued.
pub struct QueueSyncMonitor {
    store: Arc<CaptureQueueStore>,
    uploader: Arc<dyn Uploader>,
    event_bus: Arc<EventBus>,
    running: AtomicBool,
    /// Spawned attempts not yet finished
    in_flight: AtomicUsize,
    idle: Notify,
    last_report: RwLock<Option<DrainReport>>,
}

/// Clears the running flag however the drain ends, including panics and
/// dropped futures
struct RunningGuard<'a> {
    monitor: &'a QueueSyncMonitor,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.monitor.running.store(false, Ordering::SeqCst);
        self.monitor.idle.notify_waiters();
    }
}

/// Counts a spawned attempt until its task ends
struct InFlightGuard {
    monitor: Arc<QueueSyncMonitor>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.monitor.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.monitor.idle.notify_waiters();
    }
}

/// Owned subscription of a started monitor
pub struct MonitorHandle {
    token: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl QueueSyncMonitor {
    pub fn new(
        store: Arc<CaptureQueueStore>,
        uploader: Arc<dyn Uploader>,
        event_bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            uploader,
            event_bus,
            running: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
            last_report: RwLock::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_idle(&self) -> bool {
        !self.is_running() && self.in_flight.load(Ordering::SeqCst) == 0
    }

    /// Resolve once no drain is running and no spawned attempt is pending
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn last_report(&self) -> Option<DrainReport> {
        self.last_report.read().clone()
    }

    /// One gated drain, unless another is already in flight
    pub async fn try_drain(&self) -> DrainAttempt {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Drain trigger dropped, one is already running");
            return DrainAttempt::Skipped(SkipReason::AlreadyRunning);
        }

        let guard = RunningGuard { monitor: self };
        let attempt = self.drain_gated().await;
        drop(guard);

        if let DrainAttempt::Completed(report) = &attempt {
            *self.last_report.write() = Some(report.clone());
            self.event_bus
                .publish_lossy(BorghiEvent::DrainCompleted {
                    report: report.clone(),
                })
                .await;
        }
        attempt
    }

    async fn drain_gated(&self) -> DrainAttempt {
        if !self.store.can_sync().await {
            debug!("Sync conditions not met, skipping drain");
            return DrainAttempt::Skipped(SkipReason::ConditionsNotMet);
        }

        match self.store.drain(self.uploader.as_ref()).await {
            Ok(report) => DrainAttempt::Completed(report),
            Err(e) => {
                error!("Queue drain failed: {}", e);
                DrainAttempt::Failed(e.to_string())
            }
        }
    }

    /// Drain once now, then again on every network, battery or low-power change
    pub async fn start(self: &Arc<Self>) -> MonitorHandle {
        let token = CancellationToken::new();
        // Subscribe before the first attempt so no change slips through
        let mut receiver = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::SyncConditions,
            "queue_sync_monitor",
        );

        self.spawn_attempt();

        let monitor = Arc::clone(self);
        let task_token = token.clone();
        let listener = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    event = receiver.recv() => match event {
                        Ok(event) => {
                            debug!("Drain triggered by {}", event.event_type());
                            monitor.spawn_attempt();
                        }
                        // Missed events may have included a condition change
                        Err(EventBusError::Lagged(_)) => monitor.spawn_attempt(),
                        Err(e) => {
                            warn!("Sync monitor stopped listening: {}", e);
                            break;
                        }
                    },
                }
            }
            debug!("Sync monitor listener exited");
        });

        info!("Queue sync monitor started");
        MonitorHandle {
            token,
            listener: Some(listener),
        }
    }

    /// Detached so `MonitorHandle::stop` never cancels an in-flight drain;
    /// `wait_idle` covers it
    fn spawn_attempt(self: &Arc<Self>) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard {
            monitor: Arc::clone(self),
        };
        tokio::spawn(async move {
            let monitor = Arc::clone(&guard.monitor);
            monitor.log_attempt(monitor.try_drain().await);
            drop(guard);
        });
    }

    fn log_attempt(&self, attempt: DrainAttempt) {
        match attempt {
            DrainAttempt::Completed(report) if report.changed() => {
                info!("Sync pass: {} uploaded", report.uploaded)
            }
            DrainAttempt::Completed(_) => debug!("Sync pass: nothing to do"),
            DrainAttempt::Skipped(reason) => debug!("Sync pass skipped: {}", reason),
            DrainAttempt::Failed(message) => warn!("Sync pass failed: {}", message),
        }
    }
}

impl MonitorHandle {
    /// Stop listening for triggers. Safe to call repeatedly; a drain already
    /// running is left to finish.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.await {
                if !e.is_cancelled() {
                    warn!("Sync monitor listener ended abnormally: {}", e);
                }
            }
            info!("Queue sync monitor stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
