use super::record::CaptureRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Current on-disk shape of the queue: `{"items": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueDocument {
    pub items: Vec<CaptureRecord>,
}

/// Known document shapes, newest last
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Bare array of records
    LegacyArray,
    /// `{"items": [...]}` wrapper
    Items,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion::Items;

    /// Older shapes to try, in order, when the current one does not parse
    const PRIOR: [SchemaVersion; 1] = [SchemaVersion::LegacyArray];

    fn parse(self, raw: &str) -> Option<Vec<CaptureRecord>> {
        match self {
            SchemaVersion::Items => serde_json::from_str::<QueueDocument>(raw)
                .ok()
                .map(|doc| doc.items),
            SchemaVersion::LegacyArray => serde_json::from_str::<Vec<CaptureRecord>>(raw).ok(),
        }
    }
}

/// Outcome of decoding a queue document
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaLoad {
    /// Parsed as the current schema with nothing to fix
    Current(QueueDocument),
    /// Parsed but needs rewriting in the current schema
    Upgraded {
        document: QueueDocument,
        from: SchemaVersion,
    },
    /// Nothing parsed; the caller should persist an empty document
    Reset { reason: String },
}

impl SchemaLoad {
    pub fn needs_write(&self) -> bool {
        !matches!(self, SchemaLoad::Current(_))
    }

    pub fn into_document(self) -> QueueDocument {
        match self {
            SchemaLoad::Current(document) | SchemaLoad::Upgraded { document, .. } => document,
            SchemaLoad::Reset { .. } => QueueDocument::default(),
        }
    }
}

impl QueueDocument {
    /// Strict parse of the current schema, then each prior schema in order.
    /// Duplicate ids are dropped (first wins), which also forces a rewrite.
    pub fn decode(raw: &str) -> SchemaLoad {
        if let Some(items) = SchemaVersion::CURRENT.parse(raw) {
            let (items, dropped) = dedup_by_id(items);
            let document = QueueDocument { items };
            return if dropped == 0 {
                SchemaLoad::Current(document)
            } else {
                warn!("Dropped {} duplicate queue records", dropped);
                SchemaLoad::Upgraded {
                    document,
                    from: SchemaVersion::CURRENT,
                }
            };
        }

        for version in SchemaVersion::PRIOR {
            if let Some(items) = version.parse(raw) {
                let (items, _) = dedup_by_id(items);
                return SchemaLoad::Upgraded {
                    document: QueueDocument { items },
                    from: version,
                };
            }
        }

        SchemaLoad::Reset {
            reason: "queue document matches no known schema".to_string(),
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn sort_by_id(&mut self) {
        self.items.sort_by(|a, b| a.id_order().cmp(&b.id_order()));
    }
}

fn dedup_by_id(items: Vec<CaptureRecord>) -> (Vec<CaptureRecord>, usize) {
    let before = items.len();
    let mut seen = HashSet::new();
    let kept: Vec<CaptureRecord> = items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}
