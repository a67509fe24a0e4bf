use super::record::{CaptureRecord, CaptureRequest, CaptureStatus};
use super::schema::{QueueDocument, SchemaLoad};
use crate::config::QueueConfig;
use crate::error::{BorghiError, Result};
use crate::gate::SyncConditionGate;
use crate::upload::Uploader;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Outcome of one pass over the pending records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Pending records looked at
    pub examined: usize,
    /// Accepted by the uploader, now `done`
    pub uploaded: usize,
    /// Upload failed below the ceiling, still `pending`
    pub retried: usize,
    /// Hit the retry ceiling, now `failed`
    pub exhausted: usize,
}

impl DrainReport {
    pub fn changed(&self) -> bool {
        self.uploaded + self.retried + self.exhausted > 0
    }
}

/// Record counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub done: usize,
    pub failed: usize,
}

enum UploadOutcome {
    Uploaded,
    Retry(String),
    Exhausted,
}

/// File-backed queue of captured shots.
///
/// The queue document and the permanent asset directory are owned by this
/// type alone. Every read-modify-write of the document happens under one
/// async mutex, and every write goes through a temp file plus rename.
pub struct CaptureQueueStore {
    asset_dir: PathBuf,
    document_path: PathBuf,
    max_tries: u32,
    gate: Arc<SyncConditionGate>,
    lock: Mutex<()>,
}

impl CaptureQueueStore {
    /// Create a store from config and run setup
    pub async fn open(config: &QueueConfig, gate: Arc<SyncConditionGate>) -> Self {
        let store = Self::with_paths(config.asset_dir_path(), config.document_path(), gate)
            .with_max_tries(config.max_tries);
        store.ensure_setup().await;
        store
    }

    /// Create a store without touching the filesystem; setup runs on first use
    pub fn with_paths<P: AsRef<Path>, Q: AsRef<Path>>(
        asset_dir: P,
        document_path: Q,
        gate: Arc<SyncConditionGate>,
    ) -> Self {
        Self {
            asset_dir: asset_dir.as_ref().to_path_buf(),
            document_path: document_path.as_ref().to_path_buf(),
            max_tries: 5,
            gate,
            lock: Mutex::new(()),
        }
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Create directories and a valid document, migrating or resetting as
    /// needed. Failures are logged, never returned.
    pub async fn ensure_setup(&self) {
        let _guard = self.lock.lock().await;
        if let Err(e) = self.setup_locked().await {
            warn!("Queue setup incomplete: {}", e);
        }
    }

    /// Persist a new pending shot and move its photo into permanent storage
    pub async fn enqueue(&self, request: CaptureRequest) -> Result<String> {
        let _guard = self.lock.lock().await;
        let mut document = self.load_locked().await?;

        match fs::metadata(&request.temp_asset_path).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    "Capture source {} is gone, nothing queued",
                    request.temp_asset_path.display()
                );
                return Err(BorghiError::SourceMissing {
                    path: request.temp_asset_path.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let captured_at = Utc::now();
        let id = next_id(&document, captured_at.timestamp_millis());
        let ext = request
            .temp_asset_path
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .unwrap_or("jpg");
        let destination = self.asset_dir.join(format!("{}.{}", id, ext));

        fs::create_dir_all(&self.asset_dir).await?;
        transfer_asset(&request.temp_asset_path, &destination).await?;

        info!("Queueing shot {} for village {}", id, request.village_name);
        document.items.push(CaptureRecord {
            id: id.clone(),
            asset_uri: destination,
            village_id: request.village_id,
            village_name: request.village_name,
            lat: request.lat,
            lng: request.lng,
            heading: request.heading,
            captured_at,
            status: CaptureStatus::Pending,
            tries: 0,
            last_error: None,
        });
        self.write_locked(&mut document).await?;
        Ok(id)
    }

    /// All records, oldest first
    pub async fn list(&self) -> Result<Vec<CaptureRecord>> {
        let _guard = self.lock.lock().await;
        let mut document = self.load_locked().await?;
        document.sort_by_id();
        Ok(document.items)
    }

    pub async fn get(&self, id: &str) -> Result<Option<CaptureRecord>> {
        let _guard = self.lock.lock().await;
        let document = self.load_locked().await?;
        Ok(document.items.into_iter().find(|r| r.id == id))
    }

    /// Drop a record and its asset. Returns `false` for an unknown id.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut document = self.load_locked().await?;

        let Some(index) = document.items.iter().position(|r| r.id == id) else {
            debug!("Remove of unknown shot {} ignored", id);
            return Ok(false);
        };
        let record = document.items.remove(index);
        self.write_locked(&mut document).await?;

        match fs::remove_file(&record.asset_uri).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to delete asset {} of removed shot {}: {}",
                record.asset_uri.display(),
                id,
                e
            ),
        }

        info!("Removed shot {}", id);
        Ok(true)
    }

    pub async fn can_sync(&self) -> bool {
        self.gate.can_sync().await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let _guard = self.lock.lock().await;
        let document = self.load_locked().await?;
        let mut stats = QueueStats {
            total: document.items.len(),
            ..Default::default()
        };
        for record in &document.items {
            match record.status {
                CaptureStatus::Pending => stats.pending += 1,
                CaptureStatus::Done => stats.done += 1,
                CaptureStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    /// Upload every pending record once.
    ///
    /// Records at the retry ceiling are marked `failed` without an upload.
    /// Uploads run outside the lock against a snapshot; outcomes are applied
    /// to the records still pending when the lock is retaken, and the
    /// document is written once if anything changed.
    pub async fn drain(&self, uploader: &dyn Uploader) -> Result<DrainReport> {
        let pending: Vec<CaptureRecord> = {
            let _guard = self.lock.lock().await;
            let document = self.load_locked().await?;
            let mut pending: Vec<CaptureRecord> =
                document.items.into_iter().filter(|r| r.is_pending()).collect();
            pending.sort_by(|a, b| a.id_order().cmp(&b.id_order()));
            pending
        };

        if pending.is_empty() {
            debug!("Drain found nothing pending");
            return Ok(DrainReport::default());
        }

        let mut outcomes = HashMap::with_capacity(pending.len());
        for record in &pending {
            let outcome = if record.tries >= self.max_tries {
                UploadOutcome::Exhausted
            } else {
                match uploader.upload(record).await {
                    Ok(()) => UploadOutcome::Uploaded,
                    Err(e) => {
                        debug!("Upload of shot {} failed: {}", record.id, e);
                        UploadOutcome::Retry(e.to_string())
                    }
                }
            };
            outcomes.insert(record.id.clone(), outcome);
        }

        let _guard = self.lock.lock().await;
        let mut document = self.load_locked().await?;
        let mut report = DrainReport {
            examined: pending.len(),
            ..Default::default()
        };

        for record in document.items.iter_mut().filter(|r| r.is_pending()) {
            match outcomes.remove(&record.id) {
                Some(UploadOutcome::Uploaded) => {
                    record.status = CaptureStatus::Done;
                    record.last_error = None;
                    report.uploaded += 1;
                }
                Some(UploadOutcome::Retry(message)) => {
                    record.tries += 1;
                    record.last_error = Some(message);
                    report.retried += 1;
                }
                Some(UploadOutcome::Exhausted) => {
                    record.status = CaptureStatus::Failed;
                    report.exhausted += 1;
                    warn!(
                        "Shot {} gave up after {} tries: {}",
                        record.id,
                        record.tries,
                        record.last_error.as_deref().unwrap_or("unknown error")
                    );
                }
                None => {}
            }
        }

        if report.changed() {
            self.write_locked(&mut document).await?;
        }

        info!(
            "Drain finished: {} examined, {} uploaded, {} to retry, {} failed",
            report.examined, report.uploaded, report.retried, report.exhausted
        );
        Ok(report)
    }

    async fn setup_locked(&self) -> Result<()> {
        fs::create_dir_all(&self.asset_dir).await?;
        if let Some(parent) = self.document_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let raw = match fs::read_to_string(&self.document_path).await {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(
                    "Queue document {} unreadable, resetting: {}",
                    self.document_path.display(),
                    e
                );
                None
            }
        };

        let load = match raw {
            Some(raw) => QueueDocument::decode(&raw),
            None => SchemaLoad::Reset {
                reason: "no queue document".to_string(),
            },
        };
        self.settle(load).await.map(|_| ())
    }

    /// Read the document, persisting any schema migration. A missing
    /// document is created. An unparseable document is left on disk as is
    /// and reported; only setup may reset it.
    async fn load_locked(&self) -> Result<QueueDocument> {
        match fs::read_to_string(&self.document_path).await {
            Ok(raw) => match QueueDocument::decode(&raw) {
                SchemaLoad::Reset { reason } => {
                    error!(
                        "Queue document {} unreadable, leaving it untouched: {}",
                        self.document_path.display(),
                        reason
                    );
                    Err(BorghiError::persistence(format!(
                        "cannot parse {}: {}",
                        self.document_path.display(),
                        reason
                    )))
                }
                load => self.settle(load).await,
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = self.document_path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                self.settle(SchemaLoad::Reset {
                    reason: "no queue document".to_string(),
                })
                .await
            }
            Err(e) => Err(BorghiError::persistence(format!(
                "cannot read {}: {}",
                self.document_path.display(),
                e
            ))),
        }
    }

    async fn settle(&self, load: SchemaLoad) -> Result<QueueDocument> {
        match &load {
            SchemaLoad::Current(_) => {}
            SchemaLoad::Upgraded { from, .. } => {
                info!("Migrating queue document from {:?} schema", from)
            }
            SchemaLoad::Reset { reason } => {
                warn!("Resetting queue document: {}", reason)
            }
        }

        let needs_write = load.needs_write();
        let mut document = load.into_document();
        if needs_write {
            self.write_locked(&mut document).await?;
        }
        Ok(document)
    }

    async fn write_locked(&self, document: &mut QueueDocument) -> Result<()> {
        document.sort_by_id();
        let encoded = document.encode()?;

        let mut tmp_name = self.document_path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, encoded.as_bytes()).await.map_err(|e| {
            error!("Failed to write queue document: {}", e);
            BorghiError::persistence(format!("cannot write {}: {}", tmp_path.display(), e))
        })?;
        fs::rename(&tmp_path, &self.document_path).await.map_err(|e| {
            error!("Failed to replace queue document: {}", e);
            BorghiError::persistence(format!(
                "cannot replace {}: {}",
                self.document_path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

/// Millisecond id, bumped past the newest existing id when the clock has
/// not moved or went backwards
fn next_id(document: &QueueDocument, now_millis: i64) -> String {
    let candidate = u64::try_from(now_millis).unwrap_or(0);
    let newest = document
        .items
        .iter()
        .filter_map(|r| r.id.parse::<u64>().ok())
        .max();
    match newest {
        Some(newest) if candidate <= newest => (newest + 1).to_string(),
        _ => candidate.to_string(),
    }
}

/// Copy then delete the source; fall back to a rename when the copy fails
async fn transfer_asset(source: &Path, destination: &Path) -> Result<()> {
    match fs::copy(source, destination).await {
        Ok(_) => {
            if let Err(e) = fs::remove_file(source).await {
                debug!("Leaving capture source {} in place: {}", source.display(), e);
            }
        }
        Err(copy_err) => {
            debug!(
                "Copy of {} failed ({}), trying rename",
                source.display(),
                copy_err
            );
            if let Err(e) = fs::rename(source, destination).await {
                if e.kind() == ErrorKind::NotFound {
                    return Err(BorghiError::SourceMissing {
                        path: source.to_path_buf(),
                    });
                }
                return Err(e.into());
            }
        }
    }

    if fs::metadata(destination).await.is_err() {
        return Err(BorghiError::persistence(format!(
            "asset {} missing after transfer",
            destination.display()
        )));
    }
    Ok(())
}
