use crate::error::{BorghiError, Result};
use crate::events::{BorghiEvent, EventBus};
use crate::geo::{bearing_degrees, Position};
use crate::queue::{CaptureQueueStore, CaptureRequest};
use crate::targeting::{TargetMatch, VillageTargeter};
use crate::visits::VisitLog;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// What a successful capture produced
#[derive(Debug, Clone, Serialize)]
pub struct CaptureOutcome {
    pub capture_id: String,
    pub target: TargetMatch,
    /// Heading stored with the shot
    pub heading: f64,
}

/// The shoot-a-village flow: latest fix and heading in, queued shot out.
///
/// Position and heading arrive on watch channels so the session always
/// sees the freshest value without polling sensors itself.
pub struct CaptureSession {
    targeter: Arc<VillageTargeter>,
    store: Arc<CaptureQueueStore>,
    visits: Arc<VisitLog>,
    event_bus: Arc<EventBus>,
    position: watch::Receiver<Option<Position>>,
    heading: watch::Receiver<Option<f64>>,
}

impl CaptureSession {
    pub fn new(
        targeter: Arc<VillageTargeter>,
        store: Arc<CaptureQueueStore>,
        visits: Arc<VisitLog>,
        event_bus: Arc<EventBus>,
        position: watch::Receiver<Option<Position>>,
        heading: watch::Receiver<Option<f64>>,
    ) -> Self {
        Self {
            targeter,
            store,
            visits,
            event_bus,
            position,
            heading,
        }
    }

    pub fn position(&self) -> Option<Position> {
        *self.position.borrow()
    }

    pub fn heading(&self) -> Option<f64> {
        *self.heading.borrow()
    }

    /// Village the camera would be credited with right now
    pub fn suggestion(&self) -> Option<TargetMatch> {
        let position = self.position()?;
        self.targeter.resolve(position, self.heading())
    }

    /// Queue the photo at `temp_asset` for the suggested village
    pub async fn capture(&self, temp_asset: &Path) -> Result<CaptureOutcome> {
        let position = self
            .position()
            .ok_or_else(|| BorghiError::capture_rejected("no position fix yet"))?;
        self.capture_at(temp_asset, position, self.heading()).await
    }

    /// Queue a photo taken at an explicit position and optional heading.
    ///
    /// Without a heading the nearest village is used and the shot is stored
    /// with the bearing toward it.
    pub async fn capture_at(
        &self,
        temp_asset: &Path,
        position: Position,
        heading: Option<f64>,
    ) -> Result<CaptureOutcome> {
        let target = self
            .targeter
            .resolve(position, heading)
            .ok_or_else(|| BorghiError::capture_rejected("no village within range"))?;

        let heading =
            heading.unwrap_or_else(|| bearing_degrees(position, target.village.position()));

        let village = &target.village;
        let capture_id = self
            .store
            .enqueue(CaptureRequest {
                temp_asset_path: temp_asset.to_path_buf(),
                village_id: village.id.clone(),
                village_name: village.name.clone(),
                lat: position.lat,
                lng: position.lng,
                heading,
            })
            .await?;

        // The shot is safe in the queue; bookkeeping failures stay local
        if let Err(e) = self.visits.mark_visited(&village.id).await {
            warn!("Could not record visit to {}: {}", village.id, e);
        }

        self.event_bus
            .publish_lossy(BorghiEvent::CaptureQueued {
                capture_id: capture_id.clone(),
                village_id: village.id.clone(),
            })
            .await;
        self.event_bus
            .publish_lossy(BorghiEvent::VillageVisited {
                region_id: village.region_id.clone(),
                village_id: village.id.clone(),
                village_name: village.name.clone(),
                province_code: village.province_code.clone(),
            })
            .await;

        info!(
            "Captured {} ({} mode, {:.1} km)",
            village.name, target.mode, target.distance_km
        );
        Ok(CaptureOutcome {
            capture_id,
            target,
            heading,
        })
    }
}
