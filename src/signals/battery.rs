use crate::config::SyncConfig;
use crate::error::{BorghiError, Result};
use crate::gate::BatteryProbe;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Battery state from the Linux power-supply class and the ACPI platform
/// profile
#[derive(Debug, Clone)]
pub struct SysfsBatteryProbe {
    capacity_path: PathBuf,
    profile_path: PathBuf,
}

impl SysfsBatteryProbe {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(capacity_path: P, profile_path: Q) -> Self {
        Self {
            capacity_path: capacity_path.as_ref().to_path_buf(),
            profile_path: profile_path.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(&config.battery_path, &config.platform_profile_path)
    }

    async fn read_trimmed(path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map(|raw| raw.trim().to_string())
            .map_err(|e| BorghiError::probe("sysfs_battery", format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl BatteryProbe for SysfsBatteryProbe {
    async fn battery_level(&self) -> Result<f32> {
        let raw = Self::read_trimmed(&self.capacity_path).await?;
        let percent: f32 = raw.parse().map_err(|_| {
            BorghiError::probe("sysfs_battery", format!("unexpected capacity {:?}", raw))
        })?;
        Ok((percent / 100.0).clamp(0.0, 1.0))
    }

    async fn low_power_mode(&self) -> Result<bool> {
        let profile = Self::read_trimmed(&self.profile_path).await?;
        Ok(matches!(profile.as_str(), "low-power" | "quiet"))
    }
}
