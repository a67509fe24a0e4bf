use super::{HeadingSmoother, HeadingSource, HeadingSourceKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Drives a [`HeadingSource`] in the background and publishes the smoothed
/// heading on a watch channel.
pub struct HeadingTracker {
    kind: HeadingSourceKind,
    heading_rx: watch::Receiver<Option<f64>>,
    cancellation_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl HeadingTracker {
    pub fn spawn(mut source: Box<dyn HeadingSource>, window: usize) -> Self {
        let kind = source.kind();
        let (heading_tx, heading_rx) = watch::channel(None);
        let cancellation_token = CancellationToken::new();
        let token = cancellation_token.clone();

        info!("Starting heading tracker on {} (window {})", kind, window);

        let handle = tokio::spawn(async move {
            let mut smoother = HeadingSmoother::new(window);
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => break,
                    next = source.next_heading() => next,
                };
                let Some(raw) = next else {
                    debug!("Heading feed {} closed", kind);
                    break;
                };
                let smoothed = smoother.push(raw);
                if heading_tx.send(Some(smoothed)).is_err() {
                    break;
                }
            }
        });

        Self {
            kind,
            heading_rx,
            cancellation_token,
            handle,
        }
    }

    pub fn kind(&self) -> HeadingSourceKind {
        self.kind
    }

    /// Latest smoothed heading, if any sample has arrived
    pub fn current(&self) -> Option<f64> {
        *self.heading_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<f64>> {
        self.heading_rx.clone()
    }

    pub async fn stop(self) {
        self.cancellation_token.cancel();
        let _ = self.handle.await;
        info!("Heading tracker on {} stopped", self.kind);
    }
}
