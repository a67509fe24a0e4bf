use crate::error::{BorghiError, Result};
use crate::geo::Position;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

/// A heritage village from the bundled reference data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Village {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province_code: Option<String>,
    pub region_id: String,
}

impl Village {
    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lng)
    }
}

/// Immutable, ordered list of villages loaded once at startup.
///
/// Iteration order is the load order and is what targeting uses to break ties.
#[derive(Debug, Clone, Default)]
pub struct VillageRegistry {
    villages: Vec<Village>,
}

impl VillageRegistry {
    pub fn from_villages(villages: Vec<Village>) -> Self {
        let villages = villages
            .into_iter()
            .map(|mut v| {
                // The converter writes "" for unknown provinces
                if v.province_code.as_deref().is_some_and(str::is_empty) {
                    v.province_code = None;
                }
                v
            })
            .collect();
        Self { villages }
    }

    /// Load the normalized JSON array written by [`RegistryImporter`]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).await.map_err(|e| {
            BorghiError::registry(format!(
                "Failed to read registry {}: {}",
                path.display(),
                e
            ))
        })?;

        let villages: Vec<Village> = serde_json::from_str(&raw).map_err(|e| {
            BorghiError::registry(format!(
                "Failed to parse registry {}: {}",
                path.display(),
                e
            ))
        })?;

        info!(
            "Loaded village registry with {} entries from {}",
            villages.len(),
            path.display()
        );
        Ok(Self::from_villages(villages))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Village> {
        self.villages.iter()
    }

    pub fn len(&self) -> usize {
        self.villages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.villages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Village> {
        self.villages.iter().find(|v| v.id == id)
    }

    /// Distinct region ids in first-seen order
    pub fn regions(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.villages
            .iter()
            .filter(|v| seen.insert(v.region_id.as_str()))
            .map(|v| v.region_id.as_str())
            .collect()
    }

    /// Distinct province codes of one region, in first-seen order
    pub fn provinces_of(&self, region_id: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.villages
            .iter()
            .filter(|v| v.region_id == region_id)
            .filter_map(|v| v.province_code.as_deref())
            .filter(|code| seen.insert(*code))
            .collect()
    }
}

/// Converts raw regional datasets into the normalized registry.
///
/// Accepted inputs, one file per region named `borghi_<region>.json`:
/// Overpass results (`{"elements": [...]}`), bare arrays of Overpass nodes,
/// and tabular arrays using Italian or English column names.
pub struct RegistryImporter;

const PROVINCE_CODES: &[(&str, &str)] = &[
    // Liguria
    ("GENOVA", "GE"),
    ("IMPERIA", "IM"),
    ("LA SPEZIA", "SP"),
    ("SAVONA", "SV"),
    // Toscana
    ("FIRENZE", "FI"),
    ("PISA", "PI"),
    ("LIVORNO", "LI"),
    ("LUCCA", "LU"),
    ("MASSA-CARRARA", "MS"),
    ("PRATO", "PO"),
    ("PISTOIA", "PT"),
    ("SIENA", "SI"),
    ("AREZZO", "AR"),
    ("GROSSETO", "GR"),
    // Piemonte
    ("TORINO", "TO"),
    ("CUNEO", "CN"),
    ("ALESSANDRIA", "AL"),
    ("ASTI", "AT"),
    ("NOVARA", "NO"),
    ("VERCELLI", "VC"),
    ("VERBANO-CUSIO-OSSOLA", "VB"),
    ("BIELLA", "BI"),
];

const PROVINCE_TAGS: &[&str] = &[
    "addr:province",
    "is_in:province",
    "addr:state_district",
    "addr:county",
];

impl RegistryImporter {
    /// Read every `*.json` file in `raw_dir` (sorted by name) and merge them
    pub async fn import_dir<P: AsRef<Path>>(raw_dir: P) -> Result<Vec<Village>> {
        let raw_dir = raw_dir.as_ref();
        let mut entries = fs::read_dir(raw_dir).await.map_err(|e| {
            BorghiError::registry(format!(
                "Failed to read raw directory {}: {}",
                raw_dir.display(),
                e
            ))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(BorghiError::registry(format!(
                "No .json files in {}",
                raw_dir.display()
            )));
        }

        let mut all = Vec::new();
        for file in files {
            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let region_id = Self::region_from_filename(&file_name);
            let content = fs::read_to_string(&file).await?;
            let value: Value = serde_json::from_str(&content)?;
            let villages = Self::parse_raw(&value, &region_id);
            info!("{}: {} villages", file_name, villages.len());
            all.extend(villages);
        }

        let merged = Self::dedup(all);
        info!("Imported {} villages in total", merged.len());
        Ok(merged)
    }

    /// Write the normalized registry as pretty JSON
    pub async fn write_registry<P: AsRef<Path>>(path: P, villages: &[Village]) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(villages)?;
        fs::write(path, json).await?;
        info!("Wrote {} villages to {}", villages.len(), path.display());
        Ok(())
    }

    /// `borghi_toscana.json` -> `toscana`
    pub fn region_from_filename(file_name: &str) -> String {
        let base = file_name.to_lowercase();
        let stem = base.strip_suffix(".json").unwrap_or(&base);
        for prefix in ["borghi_", "borghi-"] {
            if let Some(region) = stem.strip_prefix(prefix) {
                if !region.is_empty() {
                    return region.to_string();
                }
            }
        }
        stem.to_string()
    }

    /// Parse one raw document for `region_id`. Unknown shapes yield nothing.
    pub fn parse_raw(value: &Value, region_id: &str) -> Vec<Village> {
        if let Some(elements) = value.get("elements").and_then(Value::as_array) {
            return elements
                .iter()
                .filter(|e| e.get("type").and_then(Value::as_str) == Some("node"))
                .filter_map(|e| Self::parse_node(e, region_id))
                .collect();
        }

        if let Some(rows) = value.as_array() {
            return rows
                .iter()
                .filter_map(|row| {
                    if row.get("tags").is_some() {
                        Self::parse_node(row, region_id)
                    } else {
                        Self::parse_row(row, region_id)
                    }
                })
                .collect();
        }

        warn!("Unrecognized raw format for region {}", region_id);
        Vec::new()
    }

    fn parse_node(node: &Value, region_id: &str) -> Option<Village> {
        let tags = node.get("tags")?;
        let name = tags.get("name").and_then(Value::as_str)?;
        let lat = node.get("lat").and_then(to_number)?;
        let lng = node.get("lon").and_then(to_number)?;

        let province = PROVINCE_TAGS
            .iter()
            .find_map(|key| tags.get(*key).and_then(Value::as_str))
            .and_then(to_province_code);

        Some(Village {
            id: format!("{}-{}", region_id, slugify(name)),
            name: name.to_string(),
            lat,
            lng,
            province_code: province,
            region_id: region_id.to_string(),
        })
    }

    fn parse_row(row: &Value, region_id: &str) -> Option<Village> {
        let name = pick(row, &["nome", "name", "comune"]).and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })?;
        let lat = pick(row, &["lat", "latitudine"]).and_then(to_number)?;
        let lng = pick(row, &["lng", "lon", "longitudine"]).and_then(to_number)?;
        let province = pick(row, &["prov", "provincia"])
            .and_then(Value::as_str)
            .and_then(to_province_code);

        Some(Village {
            id: format!("{}-{}", region_id, slugify(&name)),
            name,
            lat,
            lng,
            province_code: province,
            region_id: region_id.to_string(),
        })
    }

    /// Keep the first village per (region, case-insensitive name)
    pub fn dedup(villages: Vec<Village>) -> Vec<Village> {
        let mut seen = HashSet::new();
        let before = villages.len();
        let kept: Vec<Village> = villages
            .into_iter()
            .filter(|v| seen.insert(format!("{}::{}", v.region_id, v.name.to_lowercase())))
            .collect();
        debug!("Dedup dropped {} duplicate villages", before - kept.len());
        kept
    }
}

fn pick<'a>(row: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| match row.get(*key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(v) => Some(v),
    })
}

/// Accepts numbers and numeric strings, including comma decimals ("44,1")
fn to_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn to_province_code(raw: &str) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    if upper.len() == 2 && upper.chars().all(|c| c.is_ascii_uppercase()) {
        return Some(upper);
    }
    PROVINCE_CODES
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|(_, code)| code.to_string())
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ä' | 'ã' => 'a',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ò' | 'ó' | 'ô' | 'ö' | 'õ' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// "Castelnuovo Magra" -> "castelnuovo-magra", "Pitigliano (GR)" -> "pitigliano-gr"
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.to_lowercase().chars().map(fold_accent) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}
