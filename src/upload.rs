use crate::error::UploadError;
use crate::queue::CaptureRecord;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Sends one queued shot somewhere off the device.
///
/// Implementations must not touch the queue; the store records the outcome.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, record: &CaptureRecord) -> std::result::Result<(), UploadError>;
}

/// Uploader with a scripted outcome, for tests and `drain --mock`
#[derive(Debug, Default)]
pub struct MockUploader {
    delay: Duration,
    failure: Mutex<Option<UploadError>>,
    calls: AtomicUsize,
    uploaded: Mutex<Vec<String>>,
}

impl MockUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing<S: Into<String>>(message: S) -> Self {
        let uploader = Self::default();
        uploader.set_failure(Some(UploadError::rejected(message)));
        uploader
    }

    pub fn set_failure(&self, failure: Option<UploadError>) {
        *self.failure.lock() = failure;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Ids accepted so far, in call order
    pub fn uploaded_ids(&self) -> Vec<String> {
        self.uploaded.lock().clone()
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn upload(&self, record: &CaptureRecord) -> std::result::Result<(), UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failure = self.failure.lock().clone();
        match failure {
            Some(err) => {
                debug!("Mock upload of {} failed: {}", record.id, err);
                Err(err)
            }
            None => {
                debug!("Mock upload of {} accepted", record.id);
                self.uploaded.lock().push(record.id.clone());
                Ok(())
            }
        }
    }
}

/// Hands shots to a local outbox directory: the asset plus a JSON sidecar
/// with the record, named after the record id.
///
/// A separate transfer agent picks the outbox up; from the queue's point of
/// view a shot is done once both files are in place.
#[derive(Debug)]
pub struct OutboxUploader {
    dir: PathBuf,
    offline: AtomicBool,
}

impl OutboxUploader {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            offline: AtomicBool::new(false),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Refuse every upload with a network error, as when the link drops mid-drain
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn asset_target(&self, record: &CaptureRecord) -> PathBuf {
        let ext = record
            .asset_uri
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg");
        self.dir.join(format!("{}.{}", record.id, ext))
    }
}

#[async_trait]
impl Uploader for OutboxUploader {
    async fn upload(&self, record: &CaptureRecord) -> std::result::Result<(), UploadError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(UploadError::Network("outbox offline".to_string()));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| UploadError::rejected(format!("outbox unavailable: {}", e)))?;

        let target = self.asset_target(record);
        tokio::fs::copy(&record.asset_uri, &target)
            .await
            .map_err(|e| UploadError::Asset(format!("{}: {}", record.asset_uri.display(), e)))?;

        let sidecar = serde_json::to_vec_pretty(record)
            .map_err(|e| UploadError::rejected(format!("metadata encoding failed: {}", e)))?;
        tokio::fs::write(self.dir.join(format!("{}.json", record.id)), sidecar)
            .await
            .map_err(|e| UploadError::rejected(format!("metadata write failed: {}", e)))?;

        info!("Shot {} handed to outbox {}", record.id, self.dir.display());
        Ok(())
    }
}
