use crate::error::{BorghiError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct VisitDocument {
    #[serde(default)]
    saved: Vec<String>,
    #[serde(default)]
    visited: Vec<String>,
}

/// Saved ("want to go") and visited village ids, persisted as one JSON
/// document. Ids keep insertion order and never repeat.
pub struct VisitLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl VisitLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn saved(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.saved)
    }

    pub async fn visited(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.visited)
    }

    pub async fn is_saved(&self, id: &str) -> Result<bool> {
        Ok(self.saved().await?.iter().any(|x| x == id))
    }

    pub async fn is_visited(&self, id: &str) -> Result<bool> {
        Ok(self.visited().await?.iter().any(|x| x == id))
    }

    pub async fn save(&self, id: &str) -> Result<()> {
        self.update(|doc| push_unique(&mut doc.saved, id)).await
    }

    pub async fn unsave(&self, id: &str) -> Result<()> {
        self.update(|doc| remove_id(&mut doc.saved, id)).await
    }

    /// Flip the saved flag; returns the new state
    pub async fn toggle_saved(&self, id: &str) -> Result<bool> {
        let mut now_saved = false;
        self.update(|doc| {
            if doc.saved.iter().any(|x| x == id) {
                remove_id(&mut doc.saved, id)
            } else {
                now_saved = true;
                push_unique(&mut doc.saved, id)
            }
        })
        .await?;
        Ok(now_saved)
    }

    /// Record a visit. A visited village is no longer just saved.
    pub async fn mark_visited(&self, id: &str) -> Result<()> {
        self.update(|doc| {
            let added = push_unique(&mut doc.visited, id);
            let unsaved = remove_id(&mut doc.saved, id);
            added || unsaved
        })
        .await?;
        info!("Village {} marked visited", id);
        Ok(())
    }

    pub async fn remove_visited(&self, id: &str) -> Result<()> {
        self.update(|doc| remove_id(&mut doc.visited, id)).await
    }

    /// Apply `change` and write only if it reports a modification
    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut VisitDocument) -> bool,
    {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        if change(&mut doc) {
            self.write(&doc).await?;
        }
        Ok(())
    }

    /// Unparseable content reads as empty
    async fn load(&self) -> Result<VisitDocument> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(VisitDocument::default())
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(doc) => Ok(doc),
            Err(e) => {
                warn!("Visit log {} unreadable, starting empty: {}", self.path.display(), e);
                Ok(VisitDocument::default())
            }
        }
    }

    async fn write(&self, doc: &VisitDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, serde_json::to_vec(doc)?).await?;
        fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            BorghiError::persistence(format!("cannot replace {}: {}", self.path.display(), e))
        })?;
        debug!("Visit log written to {}", self.path.display());
        Ok(())
    }
}

fn push_unique(list: &mut Vec<String>, id: &str) -> bool {
    if list.iter().any(|x| x == id) {
        return false;
    }
    list.push(id.to_string());
    true
}

fn remove_id(list: &mut Vec<String>, id: &str) -> bool {
    let before = list.len();
    list.retain(|x| x != id);
    list.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_empty_when_missing() {
        let temp = TempDir::new().unwrap();
        let log = VisitLog::new(temp.path().join("visits.json"));
        assert!(log.saved().await.unwrap().is_empty());
        assert!(log.visited().await.unwrap().is_empty());
        assert!(!log.path().exists());
    }

    #[tokio::test]
    async fn test_visit_removes_from_saved() {
        let temp = TempDir::new().unwrap();
        let log = VisitLog::new(temp.path().join("visits.json"));

        log.save("v1").await.unwrap();
        log.save("v2").await.unwrap();
        log.save("v1").await.unwrap();
        assert_eq!(log.saved().await.unwrap(), vec!["v1", "v2"]);

        log.mark_visited("v1").await.unwrap();
        log.mark_visited("v1").await.unwrap();
        assert_eq!(log.saved().await.unwrap(), vec!["v2"]);
        assert_eq!(log.visited().await.unwrap(), vec!["v1"]);
        assert!(log.is_visited("v1").await.unwrap());
        assert!(!log.is_saved("v1").await.unwrap());

        // Persisted
        let reopened = VisitLog::new(temp.path().join("visits.json"));
        assert_eq!(reopened.visited().await.unwrap(), vec!["v1"]);
    }

    #[tokio::test]
    async fn test_toggle_and_remove() {
        let temp = TempDir::new().unwrap();
        let log = VisitLog::new(temp.path().join("nested").join("visits.json"));

        assert!(log.toggle_saved("v3").await.unwrap());
        assert!(log.is_saved("v3").await.unwrap());
        assert!(!log.toggle_saved("v3").await.unwrap());
        assert!(!log.is_saved("v3").await.unwrap());

        log.mark_visited("v4").await.unwrap();
        log.remove_visited("v4").await.unwrap();
        log.remove_visited("unknown").await.unwrap();
        assert!(log.visited().await.unwrap().is_empty());

        log.unsave("never-saved").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_log_reads_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("visits.json");
        std::fs::write(&path, "[oops").unwrap();

        let log = VisitLog::new(&path);
        assert!(log.visited().await.unwrap().is_empty());
        log.mark_visited("v1").await.unwrap();
        assert_eq!(log.visited().await.unwrap(), vec!["v1"]);
    }
}
