use crate::config::SyncConfig;
use crate::error::{BorghiError, Result};
use crate::gate::{NetworkProbe, NetworkState};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

const DEFAULT_INTERFACES_DIR: &str = "/sys/class/net";

/// Network state from interface link status plus a TCP connect to a
/// well-known host.
///
/// `connected` means some non-loopback interface is up; `internet_reachable`
/// means the connect finished inside the timeout.
#[derive(Debug, Clone)]
pub struct TcpReachabilityProbe {
    target: String,
    timeout: Duration,
    interfaces_dir: PathBuf,
}

impl TcpReachabilityProbe {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            target: format!("{}:{}", host, port),
            timeout,
            interfaces_dir: PathBuf::from(DEFAULT_INTERFACES_DIR),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            &config.reachability_host,
            config.reachability_port,
            Duration::from_millis(config.reachability_timeout_ms),
        )
    }

    pub fn with_interfaces_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.interfaces_dir = dir.as_ref().to_path_buf();
        self
    }

    async fn link_up(&self) -> Result<bool> {
        let mut entries = tokio::fs::read_dir(&self.interfaces_dir).await.map_err(|e| {
            BorghiError::probe(
                "tcp_reachability",
                format!("{}: {}", self.interfaces_dir.display(), e),
            )
        })?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name() == "lo" {
                continue;
            }
            let state = tokio::fs::read_to_string(entry.path().join("operstate"))
                .await
                .unwrap_or_default();
            if state.trim() == "up" {
                debug!("Interface {:?} is up", entry.file_name());
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn reachable(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("Reachability check to {} failed: {}", self.target, e);
                false
            }
            Err(_) => {
                debug!("Reachability check to {} timed out", self.target);
                false
            }
        }
    }
}

#[async_trait]
impl NetworkProbe for TcpReachabilityProbe {
    async fn network_state(&self) -> Result<NetworkState> {
        let connected = self.link_up().await?;
        let internet_reachable = connected && self.reachable().await;
        Ok(NetworkState {
            connected,
            internet_reachable,
        })
    }
}
