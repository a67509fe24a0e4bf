//! Decides which village the user is pointing the camera at.
//!
//! A village is "aimed at" when it lies within `max_km` and its bearing from
//! the user is within `angle_tolerance_deg` of the heading (the cone of
//! sight). Among those, the lowest `angle_weight * diff + distance_weight * km`
//! wins. When no heading is available, or nothing falls inside the cone, the
//! composite policy falls back to the nearest village.

use crate::config::TargetingConfig;
use crate::geo::{angular_difference, bearing_degrees, distance_km, Position};
use crate::registry::{Village, VillageRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Tuning knobs for [`VillageTargeter::pick_by_heading`]
#[derive(Debug, Clone, PartialEq)]
pub struct TargetOptions {
    pub max_km: f64,
    pub angle_tolerance_deg: f64,
    pub angle_weight: f64,
    pub distance_weight: f64,
    pub region_filter: Option<String>,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            max_km: 25.0,
            angle_tolerance_deg: 12.0,
            angle_weight: 1.0,
            distance_weight: 0.15,
            region_filter: None,
        }
    }
}

impl From<&TargetingConfig> for TargetOptions {
    fn from(config: &TargetingConfig) -> Self {
        Self {
            max_km: config.max_km,
            angle_tolerance_deg: config.angle_tolerance_deg,
            angle_weight: config.angle_weight,
            distance_weight: config.distance_weight,
            region_filter: config.region_filter.clone(),
        }
    }
}

/// Best directional match
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPick {
    pub village: Village,
    pub distance_km: f64,
    pub bearing_to_village: f64,
    pub heading_diff: f64,
    pub score: f64,
}

/// Closest village regardless of heading
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearestPick {
    pub village: Village,
    pub distance_km: f64,
}

/// Which rule produced a [`TargetMatch`]. A heading pick is the higher
/// confidence of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    Heading,
    Nearest,
}

impl fmt::Display for TargetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetMode::Heading => write!(f, "heading"),
            TargetMode::Nearest => write!(f, "nearest"),
        }
    }
}

/// Result of the composite policy, tagged with the mode that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetMatch {
    pub mode: TargetMode,
    pub village: Village,
    pub distance_km: f64,
    /// Only set for heading picks
    pub bearing_to_village: Option<f64>,
    /// Only set for heading picks
    pub heading_diff: Option<f64>,
}

impl From<TargetPick> for TargetMatch {
    fn from(pick: TargetPick) -> Self {
        Self {
            mode: TargetMode::Heading,
            village: pick.village,
            distance_km: pick.distance_km,
            bearing_to_village: Some(pick.bearing_to_village),
            heading_diff: Some(pick.heading_diff),
        }
    }
}

impl From<NearestPick> for TargetMatch {
    fn from(pick: NearestPick) -> Self {
        Self {
            mode: TargetMode::Nearest,
            village: pick.village,
            distance_km: pick.distance_km,
            bearing_to_village: None,
            heading_diff: None,
        }
    }
}

/// Village targeting over a shared, immutable registry
#[derive(Debug, Clone)]
pub struct VillageTargeter {
    registry: Arc<VillageRegistry>,
    options: TargetOptions,
    nearest_max_km: f64,
}

impl VillageTargeter {
    pub fn new(registry: Arc<VillageRegistry>) -> Self {
        Self {
            registry,
            options: TargetOptions::default(),
            nearest_max_km: 30.0,
        }
    }

    pub fn from_config(registry: Arc<VillageRegistry>, config: &TargetingConfig) -> Self {
        Self {
            registry,
            options: TargetOptions::from(config),
            nearest_max_km: config.nearest_max_km,
        }
    }

    pub fn with_options(mut self, options: TargetOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_nearest_max_km(mut self, max_km: f64) -> Self {
        self.nearest_max_km = max_km;
        self
    }

    pub fn options(&self) -> &TargetOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<VillageRegistry> {
        &self.registry
    }

    /// Village inside the cone of sight with the lowest composite score
    pub fn pick_by_heading(
        &self,
        position: Position,
        heading_deg: f64,
        options: &TargetOptions,
    ) -> Option<TargetPick> {
        let mut best: Option<TargetPick> = None;

        let candidates = self.registry.iter().filter(|v| {
            options
                .region_filter
                .as_deref()
                .map_or(true, |region| v.region_id == region)
        });

        for village in candidates {
            let target = village.position();
            let d = distance_km(position, target);
            if d > options.max_km {
                continue;
            }

            let bearing = bearing_degrees(position, target);
            let diff = angular_difference(heading_deg, bearing);
            if diff > options.angle_tolerance_deg {
                continue;
            }

            let score = options.angle_weight * diff + options.distance_weight * d;
            if best.as_ref().map_or(true, |b| score < b.score) {
                best = Some(TargetPick {
                    village: village.clone(),
                    distance_km: d,
                    bearing_to_village: bearing,
                    heading_diff: diff,
                    score,
                });
            }
        }

        best
    }

    /// Closest village within `max_km`, ignoring heading
    pub fn nearest_village(&self, position: Position, max_km: f64) -> Option<NearestPick> {
        let mut best: Option<(&Village, f64)> = None;

        for village in self.registry.iter() {
            let d = distance_km(position, village.position());
            if d <= max_km && best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((village, d));
            }
        }

        best.map(|(village, distance_km)| NearestPick {
            village: village.clone(),
            distance_km,
        })
    }

    /// Heading pick when a heading is known and hits something, else nearest
    pub fn resolve(&self, position: Position, heading_deg: Option<f64>) -> Option<TargetMatch> {
        if let Some(heading) = heading_deg {
            if let Some(pick) = self.pick_by_heading(position, heading, &self.options) {
                debug!(
                    "Heading pick {} at {:.2} km (diff {:.1}°)",
                    pick.village.id, pick.distance_km, pick.heading_diff
                );
                return Some(pick.into());
            }
        }

        let nearest = self.nearest_village(position, self.nearest_max_km)?;
        debug!(
            "Nearest pick {} at {:.2} km",
            nearest.village.id, nearest.distance_km
        );
        Some(nearest.into())
    }
}
