use super::*;
use crate::config::BorghiConfig;
use crate::gate::{MockBatteryProbe, MockNetworkProbe, NetworkState};
use crate::geo::Position;
use crate::queue::CaptureStatus;
use crate::registry::{Village, VillageRegistry};
use crate::upload::MockUploader;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

struct Harness {
    temp: TempDir,
    orchestrator: BorghiOrchestrator,
    uploader: Arc<MockUploader>,
    network: Arc<MockNetworkProbe>,
}

async fn harness(online: bool) -> Harness {
    harness_with(online, MockUploader::new()).await
}

async fn harness_with(online: bool, uploader: MockUploader) -> Harness {
    let temp = TempDir::new().unwrap();

    let registry_path = temp.path().join("borghi_min.json");
    let villages = vec![Village {
        id: "v1".to_string(),
        name: "Borgo Uno".to_string(),
        lat: 44.0,
        lng: 9.0,
        province_code: None,
        region_id: "liguria".to_string(),
    }];
    std::fs::write(&registry_path, serde_json::to_string(&villages).unwrap()).unwrap();
    assert_eq!(VillageRegistry::from_villages(villages).len(), 1);

    let mut config = BorghiConfig::default();
    config.queue.root = temp.path().join("data").to_string_lossy().into_owned();
    config.registry.path = registry_path.to_string_lossy().into_owned();
    config.sync.poll_interval_seconds = 1;

    let network = Arc::new(if online {
        MockNetworkProbe::online()
    } else {
        MockNetworkProbe::offline()
    });
    let uploader = Arc::new(uploader);
    let orchestrator = BorghiOrchestrator::with_components(
        config,
        network.clone(),
        Arc::new(MockBatteryProbe::charged()),
        uploader.clone(),
    )
    .await
    .unwrap();

    Harness {
        temp,
        orchestrator,
        uploader,
        network,
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_orchestrator_creation() {
    let h = harness(true).await;
    let states = h.orchestrator.get_all_component_states().await;
    assert!(states.is_empty());
    assert!(h.orchestrator.store().document_path().exists());
}

#[tokio::test]
async fn test_component_state_management() {
    let mut h = harness(true).await;
    h.orchestrator.initialize().await.unwrap();

    let states = h.orchestrator.get_all_component_states().await;
    assert_eq!(states.len(), 3);
    assert_eq!(
        h.orchestrator.get_component_state("monitor").await,
        Some(ComponentState::Stopped)
    );

    h.orchestrator
        .set_component_state("monitor", ComponentState::Failed)
        .await;
    assert_eq!(
        h.orchestrator.get_component_state("monitor").await,
        Some(ComponentState::Failed)
    );
    assert_eq!(h.orchestrator.get_component_state("unknown").await, None);
}

#[tokio::test]
async fn test_missing_registry_is_not_fatal() {
    let temp = TempDir::new().unwrap();
    let mut config = BorghiConfig::default();
    config.queue.root = temp.path().to_string_lossy().into_owned();
    config.registry.path = temp.path().join("absent.json").to_string_lossy().into_owned();

    let orchestrator = BorghiOrchestrator::with_components(
        config,
        Arc::new(MockNetworkProbe::online()),
        Arc::new(MockBatteryProbe::charged()),
        Arc::new(MockUploader::new()),
    )
    .await
    .unwrap();

    let (_pos_tx, pos_rx) = watch::channel(Some(Position::new(44.0, 9.05)));
    let (_head_tx, head_rx) = watch::channel(Some(270.0));
    let session = orchestrator.capture_session(pos_rx, head_rx);
    assert!(session.suggestion().is_none());
}

#[tokio::test]
async fn test_capture_then_daemon_sync() {
    let mut h = harness(false).await;

    let (_pos_tx, pos_rx) = watch::channel(Some(Position::new(44.0, 9.05)));
    let (_head_tx, head_rx) = watch::channel(Some(270.0));
    let session = h.orchestrator.capture_session(pos_rx, head_rx);

    let photo = h.temp.path().join("camera.jpg");
    std::fs::write(&photo, b"jpeg").unwrap();
    let outcome = session.capture(&photo).await.unwrap();

    h.orchestrator.initialize().await.unwrap();
    h.orchestrator.start().await.unwrap();
    assert_eq!(
        h.orchestrator.get_component_state("signals").await,
        Some(ComponentState::Running)
    );

    // Offline: nothing leaves the device
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.uploader.call_count(), 0);

    // The poller notices the link coming up and the monitor drains
    h.network.set_state(NetworkState::online());
    let uploader = h.uploader.clone();
    wait_for(move || uploader.call_count() == 1).await;

    let store = h.orchestrator.store();
    let monitor = h.orchestrator.monitor();
    wait_for(move || !monitor.is_running()).await;
    let record = store.get(&outcome.capture_id).await.unwrap().unwrap();
    assert_eq!(record.status, CaptureStatus::Done);

    let exit_code = h.orchestrator.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);
    assert_eq!(
        h.orchestrator.get_component_state("monitor").await,
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn test_run_ends_on_trigger() {
    let mut h = harness(true).await;
    h.orchestrator.initialize().await.unwrap();
    h.orchestrator.start().await.unwrap();

    let trigger = h.orchestrator.shutdown_trigger();
    let mut events = h.orchestrator.event_bus().subscribe();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(trigger.trigger(ShutdownReason::UserRequest).await);
        assert!(!trigger.trigger(ShutdownReason::UserRequest).await);
    });

    let exit_code = tokio::time::timeout(Duration::from_secs(5), h.orchestrator.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);

    let mut saw_shutdown = false;
    while let Ok(event) = events.try_recv() {
        if event.event_type() == "shutdown_requested" {
            saw_shutdown = true;
        }
    }
    assert!(saw_shutdown);
}

#[tokio::test]
async fn test_heading_tracker_feeds_capture_session() {
    use crate::heading::{HeadingSourceKind, MagnetometerDerived, MagnetometerReading};
    use crate::targeting::TargetMode;
    use tokio::sync::mpsc;

    let h = harness(true).await;
    let (mag_tx, mag_rx) = mpsc::channel(8);
    let tracker = h
        .orchestrator
        .spawn_heading_tracker(None, MagnetometerDerived::new(mag_rx));
    assert_eq!(tracker.kind(), HeadingSourceKind::MagnetometerDerived);

    // Field along -x reads as due west
    mag_tx
        .send(MagnetometerReading {
            x: -1.0,
            y: 0.0,
            z: 0.0,
        })
        .await
        .unwrap();
    let mut heading_rx = tracker.subscribe();
    while heading_rx.borrow().is_none() {
        heading_rx.changed().await.unwrap();
    }

    let (_pos_tx, pos_rx) = watch::channel(Some(Position::new(44.0, 9.05)));
    let session = h.orchestrator.capture_session(pos_rx, tracker.subscribe());
    let suggestion = session.suggestion().unwrap();
    assert_eq!(suggestion.mode, TargetMode::Heading);
    assert_eq!(suggestion.village.id, "v1");

    tracker.stop().await;
}

#[tokio::test]
async fn test_shutdown_waits_for_running_drain() {
    let mut h = harness_with(
        true,
        MockUploader::new().with_delay(Duration::from_millis(300)),
    )
    .await;

    let (_pos_tx, pos_rx) = watch::channel(Some(Position::new(44.0, 9.05)));
    let (_head_tx, head_rx) = watch::channel(Some(270.0));
    let session = h.orchestrator.capture_session(pos_rx, head_rx);
    let photo = h.temp.path().join("camera.jpg");
    std::fs::write(&photo, b"jpeg").unwrap();
    let outcome = session.capture(&photo).await.unwrap();

    h.orchestrator.initialize().await.unwrap();
    h.orchestrator.start().await.unwrap();
    let uploader = h.uploader.clone();
    wait_for(move || uploader.call_count() == 1).await;

    let exit_code = h.orchestrator.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);
    assert!(!h.orchestrator.monitor().is_running());

    let record = h
        .orchestrator
        .store()
        .get(&outcome.capture_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, CaptureStatus::Done);
}
