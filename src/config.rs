use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BorghiConfig {
    pub targeting: TargetingConfig,
    pub heading: HeadingConfig,
    pub queue: QueueConfig,
    pub sync: SyncConfig,
    pub registry: RegistryConfig,
    pub visits: VisitsConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TargetingConfig {
    /// Maximum distance in km for a village to be considered in the cone
    #[serde(default = "default_max_km")]
    pub max_km: f64,

    /// Half-width of the cone of sight in degrees
    #[serde(default = "default_angle_tolerance")]
    pub angle_tolerance_deg: f64,

    /// Weight of the angular error in the composite score
    #[serde(default = "default_angle_weight")]
    pub angle_weight: f64,

    /// Weight of the distance in the composite score
    #[serde(default = "default_distance_weight")]
    pub distance_weight: f64,

    /// Search radius in km for the nearest-village fallback
    #[serde(default = "default_nearest_max_km")]
    pub nearest_max_km: f64,

    /// Restrict targeting to one region (e.g. "liguria")
    #[serde(default)]
    pub region_filter: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HeadingConfig {
    /// Number of samples in the circular-mean smoothing window
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueueConfig {
    /// Base directory holding the queue document and the asset directory
    #[serde(default = "default_queue_root")]
    pub root: String,

    /// Permanent asset directory name, relative to `root`
    #[serde(default = "default_asset_dir")]
    pub asset_dir: String,

    /// Queue document file name, relative to `root`
    #[serde(default = "default_queue_document")]
    pub document: String,

    /// Upload attempts before a record is marked failed
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Minimum battery level (0.0..=1.0) required to sync
    #[serde(default = "default_min_battery_level")]
    pub min_battery_level: f32,

    /// How often the signal poller samples network and battery state
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// Host used to test internet reachability
    #[serde(default = "default_reachability_host")]
    pub reachability_host: String,

    /// Port used to test internet reachability
    #[serde(default = "default_reachability_port")]
    pub reachability_port: u16,

    /// Connect timeout for the reachability check
    #[serde(default = "default_reachability_timeout")]
    pub reachability_timeout_ms: u64,

    /// sysfs file reporting battery capacity in percent
    #[serde(default = "default_battery_path")]
    pub battery_path: String,

    /// sysfs file reporting the platform power profile
    #[serde(default = "default_platform_profile_path")]
    pub platform_profile_path: String,

    /// Spool directory used by the outbox uploader
    #[serde(default = "default_outbox_dir")]
    pub outbox_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RegistryConfig {
    /// Normalized village list (JSON array)
    #[serde(default = "default_registry_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VisitsConfig {
    /// Saved/visited village document, relative to the queue root
    #[serde(default = "default_visits_document")]
    pub document: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl QueueConfig {
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(&self.root)
    }

    pub fn asset_dir_path(&self) -> PathBuf {
        self.root_path().join(&self.asset_dir)
    }

    pub fn document_path(&self) -> PathBuf {
        self.root_path().join(&self.document)
    }
}

impl BorghiConfig {
    /// Visit log document, resolved against the queue root
    pub fn visits_path(&self) -> PathBuf {
        self.queue.root_path().join(&self.visits.document)
    }

    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("borghi.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("targeting.max_km", default_max_km())?
            .set_default("targeting.angle_tolerance_deg", default_angle_tolerance())?
            .set_default("targeting.angle_weight", default_angle_weight())?
            .set_default("targeting.distance_weight", default_distance_weight())?
            .set_default("targeting.nearest_max_km", default_nearest_max_km())?
            .set_default(
                "heading.smoothing_window",
                default_smoothing_window() as i64,
            )?
            .set_default("queue.root", default_queue_root())?
            .set_default("queue.asset_dir", default_asset_dir())?
            .set_default("queue.document", default_queue_document())?
            .set_default("queue.max_tries", default_max_tries() as i64)?
            .set_default(
                "sync.min_battery_level",
                default_min_battery_level() as f64,
            )?
            .set_default("sync.poll_interval_seconds", default_poll_interval() as i64)?
            .set_default("sync.reachability_host", default_reachability_host())?
            .set_default("sync.reachability_port", default_reachability_port() as i64)?
            .set_default(
                "sync.reachability_timeout_ms",
                default_reachability_timeout() as i64,
            )?
            .set_default("sync.battery_path", default_battery_path())?
            .set_default(
                "sync.platform_profile_path",
                default_platform_profile_path(),
            )?
            .set_default("sync.outbox_dir", default_outbox_dir())?
            .set_default("registry.path", default_registry_path())?
            .set_default("visits.document", default_visits_document())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // BORGHI_QUEUE__ROOT, BORGHI_SYNC__MIN_BATTERY_LEVEL, ...
            .add_source(
                Environment::with_prefix("BORGHI")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: BorghiConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.targeting.max_km > 0.0) {
            return Err(ConfigError::Message(
                "Targeting max_km must be greater than 0".to_string(),
            ));
        }

        if !(self.targeting.nearest_max_km > 0.0) {
            return Err(ConfigError::Message(
                "Targeting nearest_max_km must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=180.0).contains(&self.targeting.angle_tolerance_deg) {
            return Err(ConfigError::Message(
                "Targeting angle_tolerance_deg must be within 0..=180".to_string(),
            ));
        }

        if self.targeting.angle_weight < 0.0 || self.targeting.distance_weight < 0.0 {
            return Err(ConfigError::Message(
                "Targeting weights must not be negative".to_string(),
            ));
        }

        if self.heading.smoothing_window == 0 {
            return Err(ConfigError::Message(
                "Heading smoothing_window must be greater than 0".to_string(),
            ));
        }

        if self.queue.max_tries == 0 {
            return Err(ConfigError::Message(
                "Queue max_tries must be greater than 0".to_string(),
            ));
        }

        if self.queue.asset_dir.is_empty() || self.queue.document.is_empty() {
            return Err(ConfigError::Message(
                "Queue asset_dir and document must not be empty".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.sync.min_battery_level) {
            return Err(ConfigError::Message(
                "Sync min_battery_level must be within 0.0..=1.0".to_string(),
            ));
        }

        if self.sync.poll_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Sync poll_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for BorghiConfig {
    fn default() -> Self {
        Self {
            targeting: TargetingConfig {
                max_km: default_max_km(),
                angle_tolerance_deg: default_angle_tolerance(),
                angle_weight: default_angle_weight(),
                distance_weight: default_distance_weight(),
                nearest_max_km: default_nearest_max_km(),
                region_filter: None,
            },
            heading: HeadingConfig {
                smoothing_window: default_smoothing_window(),
            },
            queue: QueueConfig {
                root: default_queue_root(),
                asset_dir: default_asset_dir(),
                document: default_queue_document(),
                max_tries: default_max_tries(),
            },
            sync: SyncConfig {
                min_battery_level: default_min_battery_level(),
                poll_interval_seconds: default_poll_interval(),
                reachability_host: default_reachability_host(),
                reachability_port: default_reachability_port(),
                reachability_timeout_ms: default_reachability_timeout(),
                battery_path: default_battery_path(),
                platform_profile_path: default_platform_profile_path(),
                outbox_dir: default_outbox_dir(),
            },
            registry: RegistryConfig {
                path: default_registry_path(),
            },
            visits: VisitsConfig {
                document: default_visits_document(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_max_km() -> f64 {
    25.0
}
fn default_angle_tolerance() -> f64 {
    12.0
}
fn default_angle_weight() -> f64 {
    1.0
}
fn default_distance_weight() -> f64 {
    0.15
}
fn default_nearest_max_km() -> f64 {
    30.0
}

fn default_smoothing_window() -> usize {
    12
}

fn default_queue_root() -> String {
    "./borghi-data".to_string()
}
fn default_asset_dir() -> String {
    "scatti".to_string()
}
fn default_queue_document() -> String {
    "scattiQueue.json".to_string()
}
fn default_max_tries() -> u32 {
    5
}

fn default_min_battery_level() -> f32 {
    0.15
}
fn default_poll_interval() -> u64 {
    15
}
fn default_reachability_host() -> String {
    "1.1.1.1".to_string()
}
fn default_reachability_port() -> u16 {
    443
}
fn default_reachability_timeout() -> u64 {
    3000
}
fn default_battery_path() -> String {
    "/sys/class/power_supply/BAT0/capacity".to_string()
}
fn default_platform_profile_path() -> String {
    "/sys/firmware/acpi/platform_profile".to_string()
}
fn default_outbox_dir() -> String {
    "./borghi-data/outbox".to_string()
}

fn default_registry_path() -> String {
    "./borghi_min.json".to_string()
}
fn default_visits_document() -> String {
    "visits.json".to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}
