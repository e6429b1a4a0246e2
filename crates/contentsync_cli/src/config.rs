use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use contentsync_destination::{SyncAccount, DEFAULT_MAX_BODY_BYTES};
use contentsync_media::DEFAULT_DOWNLOAD_TIMEOUT;
use contentsync_source::{DeliveryTarget, DEFAULT_DELIVERY_TIMEOUT};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Source,
    Destination,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub mode: SyncMode,
    pub storage: StorageSection,
    pub source: Option<SourceSection>,
    pub destination: Option<DestinationSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    pub sqlite_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    pub destination_url: String,
    pub username: String,
    pub app_secret: String,
    #[serde(default = "default_delivery_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DestinationSection {
    pub bind: String,
    pub uploads_dir: String,
    pub uploads_base_url: String,
    #[serde(default)]
    pub allow_local_sync: bool,
    #[serde(default)]
    pub trusted_hosts: Vec<String>,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub accounts: Vec<SyncAccount>,
}

fn default_delivery_timeout_secs() -> u64 {
    DEFAULT_DELIVERY_TIMEOUT.as_secs()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT.as_secs()
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&source).with_context(|| format!("invalid config TOML at {}", path.display()))
    }

    pub fn parse(source: &str) -> Result<Self> {
        let config: RuntimeConfig = toml::from_str(source)?;
        match config.mode {
            SyncMode::Source if config.source.is_none() => {
                Err(anyhow!("mode = \"source\" requires a [source] section"))
            }
            SyncMode::Destination if config.destination.is_none() => {
                Err(anyhow!("mode = \"destination\" requires a [destination] section"))
            }
            _ => Ok(config),
        }
    }
}

impl SourceSection {
    pub fn target(&self) -> DeliveryTarget {
        DeliveryTarget {
            destination_url: self.destination_url.clone(),
            username: self.username.clone(),
            app_secret: self.app_secret.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DestinationSection {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::{RuntimeConfig, SyncMode};

    const DESTINATION: &str = r#"
mode = "destination"

[storage]
sqlite_path = "data/contentsync.db"

[destination]
bind = "127.0.0.1:8080"
uploads_dir = "data/uploads"
uploads_base_url = "https://dest.example/uploads"
trusted_hosts = ["dest.example"]

[[destination.accounts]]
username = "admin"
app_secret = "abcd efgh"
administrator = true
"#;

    #[test]
    fn destination_defaults_apply() {
        let config = RuntimeConfig::parse(DESTINATION).expect("config");
        assert_eq!(config.mode, SyncMode::Destination);

        let destination = config.destination.expect("destination");
        assert!(!destination.allow_local_sync);
        assert_eq!(destination.download_timeout_secs, 30);
        assert_eq!(destination.max_body_bytes, 32 * 1024 * 1024);
        assert_eq!(destination.accounts.len(), 1);
        assert!(destination.accounts[0].administrator);
    }

    #[test]
    fn source_section_builds_target() {
        let config = RuntimeConfig::parse(
            r#"
mode = "source"
[storage]
sqlite_path = "data/source.db"
[source]
destination_url = "https://dest.example/wp-json/"
username = "admin"
app_secret = "abcd efgh"
timeout_secs = 10
"#,
        )
        .expect("config");

        let source = config.source.expect("source");
        assert_eq!(
            source.target().endpoint(),
            "https://dest.example/wp-json/content-sync/v1/sync"
        );
        assert_eq!(source.timeout().as_secs(), 10);
    }

    #[test]
    fn mode_without_section_is_rejected() {
        let err = RuntimeConfig::parse(
            r#"
mode = "source"
[storage]
sqlite_path = "data/source.db"
"#,
        )
        .expect_err("missing section");
        assert!(err.to_string().contains("[source]"));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(RuntimeConfig::parse(
            r#"
mode = "mirror"
[storage]
sqlite_path = "x.db"
"#
        )
        .is_err());
    }
}
