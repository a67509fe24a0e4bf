use super::*;
use crate::error::BorghiError;
use crate::gate::{MockBatteryProbe, MockNetworkProbe, SyncConditionGate};
use crate::geo::Position;
use crate::registry::{Village, VillageRegistry};
use crate::targeting::{TargetMode, VillageTargeter};
use crate::upload::MockUploader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn online_gate() -> Arc<SyncConditionGate> {
    Arc::new(SyncConditionGate::new(
        Arc::new(MockNetworkProbe::online()),
        Arc::new(MockBatteryProbe::charged()),
    ))
}

fn store_in(dir: &Path) -> CaptureQueueStore {
    CaptureQueueStore::with_paths(
        dir.join("scatti"),
        dir.join("scattiQueue.json"),
        online_gate(),
    )
}

fn temp_shot(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"fake jpeg bytes").unwrap();
    path
}

fn request(path: PathBuf, village_id: &str) -> CaptureRequest {
    CaptureRequest {
        temp_asset_path: path,
        village_id: village_id.to_string(),
        village_name: format!("Borgo {}", village_id),
        lat: 44.0,
        lng: 9.05,
        heading: 270.0,
    }
}

fn read_document(dir: &Path) -> serde_json::Value {
    let raw = std::fs::read_to_string(dir.join("scattiQueue.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn test_setup_creates_empty_document() {
    let temp = TempDir::new().unwrap();
    let store = store_in(temp.path());
    store.ensure_setup().await;

    assert!(temp.path().join("scatti").is_dir());
    assert_eq!(read_document(temp.path()), serde_json::json!({ "items": [] }));
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_enqueue_persists_record_and_moves_asset() {
    let temp = TempDir::new().unwrap();
    let store = store_in(temp.path());
    let shot = temp_shot(temp.path(), "camera-tmp.jpg");

    let id = store.enqueue(request(shot.clone(), "v1")).await.unwrap();
    assert!(id.len() >= 13);
    assert!(id.chars().all(|c| c.is_ascii_digit()));

    let permanent = temp.path().join("scatti").join(format!("{}.jpg", id));
    assert!(permanent.exists());
    assert!(!shot.exists());

    // A fresh store over the same files sees the record
    let reopened = store_in(temp.path());
    let records = reopened.list().await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, id);
    assert_eq!(record.asset_uri, permanent);
    assert_eq!(record.status, CaptureStatus::Pending);
    assert_eq!(record.tries, 0);
    assert!(record.last_error.is_none());

    let doc = read_document(temp.path());
    let item = &doc["items"][0];
    assert_eq!(item["villageId"], "v1");
    assert_eq!(item["status"], "pending");
    assert!(item["uri"].is_string());
    assert!(item["takenAt"].as_str().unwrap().ends_with('Z'));
    assert!(item.get("lastError").is_none());
}

#[tokio::test]
async fn test_enqueue_keeps_source_extension() {
    let temp = TempDir::new().unwrap();
    let store = store_in(temp.path());

    let id = store
        .enqueue(request(temp_shot(temp.path(), "shot.png"), "v1"))
        .await
        .unwrap();
    assert!(temp.path().join("scatti").join(format!("{}.png", id)).exists());

    let id = store
        .enqueue(request(temp_shot(temp.path(), "noext"), "v1"))
        .await
        .unwrap();
    assert!(temp.path().join("scatti").join(format!("{}.jpg", id)).exists());
}

#[tokio::test]
async fn test_enqueue_missing_source_adds_nothing() {
    let temp = TempDir::new().unwrap();
    let store = store_in(temp.path());

    let err = store
        .enqueue(request(temp.path().join("vanished.jpg"), "v1"))
        .await
        .unwrap_err();
    assert!(err.is_source_missing());
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ids_are_unique_and_ordered() {
    let temp = TempDir::new().unwrap();
    let store = store_in(temp.path());

    let mut ids = Vec::new();
    for i in 0..5 {
        let shot = temp_shot(temp.path(), &format!("s{}.jpg", i));
        ids.push(store.enqueue(request(shot, "v1")).await.unwrap());
    }

    let listed: Vec<String> = store.list().await.unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(listed, ids);
    for pair in ids.windows(2) {
        assert!(pair[1].parse::<u64>().unwrap() > pair[0].parse::<u64>().unwrap());
    }
}

#[tokio::test]
async fn test_drain_marks_done() {
    let temp = TempDir::new().unwrap();
    let store = store_in(temp.path());
    let id = store
        .enqueue(request(temp_shot(temp.path(), "a.jpg"), "v1"))
        .await
        .unwrap();

    let uploader = MockUploader::new();
    let report = store.drain(&uploader).await.unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.uploaded, 1);
    assert_eq!(uploader.uploaded_ids(), vec![id.clone()]);

    let record = store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, CaptureStatus::Done);
    assert!(record.last_error.is_none());

    // Done is terminal
    let report = store.drain(&uploader).await.unwrap();
    assert_eq!(report, DrainReport::default());
    assert_eq!(uploader.call_count(), 1);
}

#[tokio::test]
async fn test_retry_ceiling() {
    let temp = TempDir::new().unwrap();
    let store = store_in(temp.path());
    let id = store
        .enqueue(request(temp_shot(temp.path(), "a.jpg"), "v1"))
        .await
        .unwrap();

    let uploader = MockUploader::failing("server said no");
    for attempt in 1..=5 {
        let report = store.drain(&uploader).await.unwrap();
        assert_eq!(report.retried, 1);
        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, CaptureStatus::Pending);
        assert_eq!(record.tries, attempt);
        assert_eq!(record.last_error.as_deref(), Some("server said no"));
    }
    assert_eq!(uploader.call_count(), 5);

    let report = store.drain(&uploader).await.unwrap();
    assert_eq!(report.exhausted, 1);
    assert_eq!(uploader.call_count(), 5);

    let record = store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, CaptureStatus::Failed);
    assert_eq!(record.tries, 5);

    // Failed is terminal even once the server recovers
    uploader.set_failure(None);
    let report = store.drain(&uploader).await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(uploader.call_count(), 5);
}

#[tokio::test]
async fn test_success_after_failure_clears_error() {
    let temp = TempDir::new().unwrap();
    let store = store_in(temp.path());
    let id = store
        .enqueue(request(temp_shot(temp.path(), "a.jpg"), "v1"))
        .await
        .unwrap();

    let uploader = MockUploader::failing("timeout");
    store.drain(&uploader).await.unwrap();
    uploader.set_failure(None);
    store.drain(&uploader).await.unwrap();

    let record = store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, CaptureStatus::Done);
    assert_eq!(record.tries, 1);
    assert!(record.last_error.is_none());
}

#[tokio::test]
async fn test_remove() {
    let temp = TempDir::new().unwrap();
    let store = store_in(temp.path());
    let id = store
        .enqueue(request(temp_shot(temp.path(), "a.jpg"), "v1"))
        .await
        .unwrap();
    let asset = store.get(&id).await.unwrap().unwrap().asset_uri;
    assert!(asset.exists());

    assert!(store.remove(&id).await.unwrap());
    assert!(!asset.exists());
    assert!(store.list().await.unwrap().is_empty());

    assert!(!store.remove(&id).await.unwrap());
    assert!(!store.remove("0000000000000").await.unwrap());
}

#[tokio::test]
async fn test_remove_tolerates_missing_asset() {
    let temp = TempDir::new().unwrap();
    let store = store_in(temp.path());
    let id = store
        .enqueue(request(temp_shot(temp.path(), "a.jpg"), "v1"))
        .await
        .unwrap();
    let asset = store.get(&id).await.unwrap().unwrap().asset_uri;
    std::fs::remove_file(&asset).unwrap();

    assert!(store.remove(&id).await.unwrap());
}

#[tokio::test]
async fn test_legacy_array_is_migrated() {
    let temp = TempDir::new().unwrap();
    let legacy = r#"[
        {"id":"1700000000002","uri":"/a/2.jpg","villageId":"v2","villageName":"Due",
         "lat":44.0,"lng":9.0,"heading":10.0,"takenAt":"2023-11-14T22:13:20.002Z"},
        {"id":"1700000000001","uri":"/a/1.jpg","villageId":"v1","villageName":"Uno",
         "lat":44.0,"lng":9.0,"heading":10.0,"takenAt":"2023-11-14T22:13:20.001Z",
         "status":"done","tries":1}
    ]"#;
    std::fs::write(temp.path().join("scattiQueue.json"), legacy).unwrap();

    let store = store_in(temp.path());
    store.ensure_setup().await;

    let doc = read_document(temp.path());
    let items = doc["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], "1700000000001");

    let records = store.list().await.unwrap();
    assert_eq!(records[1].status, CaptureStatus::Pending);
    assert_eq!(records[1].tries, 0);
    assert_eq!(records[0].status, CaptureStatus::Done);
}

#[tokio::test]
async fn test_setup_resets_corrupt_document() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("scattiQueue.json"), "{ not json").unwrap();

    let store = store_in(temp.path());
    store.ensure_setup().await;
    assert_eq!(read_document(temp.path()), serde_json::json!({ "items": [] }));
    assert!(store.list().await.unwrap().is_empty());

    // Still usable afterwards
    store
        .enqueue(request(temp_shot(temp.path(), "a.jpg"), "v1"))
        .await
        .unwrap();
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_corrupt_document_fails_operations_untouched() {
    let temp = TempDir::new().unwrap();
    let store = store_in(temp.path());
    store.ensure_setup().await;

    // One good pending record next to one with a date-only timestamp
    let corrupt = r#"{"items":[
        {"id":"1700000000001","uri":"/a/1.jpg","villageId":"v1","villageName":"Uno",
         "lat":44.0,"lng":9.0,"heading":10.0,"takenAt":"2023-11-14T22:13:20.001Z",
         "status":"pending","tries":2},
        {"id":"1700000000002","uri":"/a/2.jpg","villageId":"v2","villageName":"Due",
         "lat":44.0,"lng":9.0,"heading":10.0,"takenAt":"2023-11-14"}
    ]}"#;
    let doc_path = temp.path().join("scattiQueue.json");
    std::fs::write(&doc_path, corrupt).unwrap();

    let uploader = MockUploader::new();
    let err = store.drain(&uploader).await.unwrap_err();
    assert!(matches!(err, BorghiError::Persistence { .. }));
    assert_eq!(uploader.call_count(), 0);

    let shot = temp_shot(temp.path(), "b.jpg");
    assert!(store.enqueue(request(shot.clone(), "v1")).await.is_err());
    assert!(shot.exists());

    assert!(store.list().await.is_err());
    assert!(store.remove("1700000000001").await.is_err());
    assert_eq!(std::fs::read_to_string(&doc_path).unwrap(), corrupt);
}

#[tokio::test]
async fn test_stats() {
    let temp = TempDir::new().unwrap();
    let store = store_in(temp.path()).with_max_tries(1);
    store
        .enqueue(request(temp_shot(temp.path(), "a.jpg"), "v1"))
        .await
        .unwrap();

    let uploader = MockUploader::failing("nope");
    store.drain(&uploader).await.unwrap();
    store.drain(&uploader).await.unwrap();

    uploader.set_failure(None);
    store
        .enqueue(request(temp_shot(temp.path(), "b.jpg"), "v2"))
        .await
        .unwrap();
    store
        .enqueue(request(temp_shot(temp.path(), "c.jpg"), "v3"))
        .await
        .unwrap();
    let ids = store.list().await.unwrap();
    store.drain(&uploader).await.unwrap();
    store.remove(&ids[2].id).await.unwrap();
    store
        .enqueue(request(temp_shot(temp.path(), "d.jpg"), "v4"))
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(
        stats,
        QueueStats {
            total: 3,
            pending: 1,
            done: 1,
            failed: 1,
        }
    );
}

#[tokio::test]
async fn test_no_temp_file_left_behind() {
    let temp = TempDir::new().unwrap();
    let store = store_in(temp.path());
    store
        .enqueue(request(temp_shot(temp.path(), "a.jpg"), "v1"))
        .await
        .unwrap();
    assert!(!temp.path().join("scattiQueue.json.tmp").exists());
}

#[tokio::test]
async fn test_capture_then_sync_end_to_end() {
    let temp = TempDir::new().unwrap();
    let registry = VillageRegistry::from_villages(vec![Village {
        id: "v1".to_string(),
        name: "Borgo Uno".to_string(),
        lat: 44.0,
        lng: 9.0,
        province_code: None,
        region_id: "liguria".to_string(),
    }]);
    let targeter = VillageTargeter::new(Arc::new(registry));

    let here = Position::new(44.0, 9.05);
    let target = targeter.resolve(here, Some(270.0)).unwrap();
    assert_eq!(target.mode, TargetMode::Heading);
    assert_eq!(target.village.id, "v1");
    assert!((target.distance_km - 4.0).abs() < 0.2);

    let store = store_in(temp.path());
    let shot = temp_shot(temp.path(), "camera.jpg");
    let id = store
        .enqueue(CaptureRequest {
            temp_asset_path: shot,
            village_id: target.village.id.clone(),
            village_name: target.village.name.clone(),
            lat: here.lat,
            lng: here.lng,
            heading: 270.0,
        })
        .await
        .unwrap();

    let uploader = MockUploader::new();
    assert!(store.can_sync().await);
    store.drain(&uploader).await.unwrap();

    let record = store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, CaptureStatus::Done);
    assert_eq!(record.village_id, "v1");
}
