use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

/// Upload lifecycle of a queued shot.
///
/// `Pending -> Done` and `Pending -> Failed` are terminal; a failed upload
/// below the retry ceiling leaves the record `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    #[default]
    Pending,
    Done,
    Failed,
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureStatus::Pending => write!(f, "pending"),
            CaptureStatus::Done => write!(f, "done"),
            CaptureStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One queued photo plus the sensor snapshot taken with it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub id: String,
    #[serde(rename = "uri")]
    pub asset_uri: PathBuf,
    pub village_id: String,
    pub village_name: String,
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
    #[serde(
        rename = "takenAt",
        serialize_with = "serialize_millis",
        deserialize_with = "deserialize_rfc3339"
    )]
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub status: CaptureStatus,
    #[serde(default)]
    pub tries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl CaptureRecord {
    pub fn is_pending(&self) -> bool {
        self.status == CaptureStatus::Pending
    }

    /// Ids are decimal millisecond timestamps, so shorter ids sort first
    pub(crate) fn id_order(&self) -> (usize, &str) {
        (self.id.len(), self.id.as_str())
    }
}

/// What the capture flow hands to [`super::CaptureQueueStore::enqueue`]
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    /// Camera output; moved into permanent storage on success
    pub temp_asset_path: PathBuf,
    pub village_id: String,
    pub village_name: String,
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
}

fn serialize_millis<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn deserialize_rfc3339<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}
