use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use contentsync_destination::{AppState, Importer};
use contentsync_media::{AttachmentSyncer, HttpAssetFetcher, OutboundPolicy, UploadStore};
use contentsync_source::Exporter;
use contentsync_storage::{ContentRepository, ContentSyncStorage, StorageConfig};
use tracing::{info, warn};

use crate::config::{RuntimeConfig, SyncMode};

/// The one role this process plays, chosen from `mode` at startup.
pub enum SyncRole {
    Source(Exporter),
    Destination(DestinationRole),
}

pub struct DestinationRole {
    pub bind: SocketAddr,
    pub state: AppState,
}

impl SyncRole {
    pub async fn build(config: &RuntimeConfig) -> Result<Self> {
        let storage = ContentSyncStorage::connect(&StorageConfig {
            sqlite_path: config.storage.sqlite_path.clone(),
        })
        .await?;
        let repository: Arc<dyn ContentRepository> = Arc::new(storage);

        match config.mode {
            SyncMode::Source => {
                let source = config
                    .source
                    .as_ref()
                    .ok_or_else(|| anyhow!("missing [source] section"))?;
                let exporter = Exporter::new(repository, source.target(), source.timeout())?;
                info!(endpoint = %exporter.target().endpoint(), "source role ready");
                Ok(SyncRole::Source(exporter))
            }
            SyncMode::Destination => {
                let destination = config
                    .destination
                    .as_ref()
                    .ok_or_else(|| anyhow!("missing [destination] section"))?;

                let mut policy = OutboundPolicy::new(destination.allow_local_sync);
                for host in &destination.trusted_hosts {
                    policy = policy.with_trusted_host(host);
                }
                let fetcher = HttpAssetFetcher::new(policy, destination.download_timeout())
                    .context("failed to build attachment client")?;
                let uploads =
                    UploadStore::new(&destination.uploads_dir, &destination.uploads_base_url);
                let syncer = AttachmentSyncer::new(repository.clone(), Arc::new(fetcher), uploads);

                if !destination.accounts.iter().any(|account| account.administrator) {
                    warn!("no administrator account configured: every sync request will be refused");
                }

                let bind: SocketAddr = destination
                    .bind
                    .parse()
                    .with_context(|| format!("invalid socket address {}", destination.bind))?;
                if !bind.ip().is_loopback() {
                    warn!(bind = %bind, "non-loopback bind: terminate TLS in front of this listener");
                }

                let state = AppState::new(
                    Importer::new(repository, syncer),
                    destination.accounts.clone(),
                )
                .with_max_body_bytes(destination.max_body_bytes);
                Ok(SyncRole::Destination(DestinationRole { bind, state }))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SyncRole::Source(_) => "source",
            SyncRole::Destination(_) => "destination",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SyncRole;
    use crate::config::RuntimeConfig;

    #[tokio::test]
    async fn destination_mode_builds_destination_role() {
        let uploads = tempfile::TempDir::new().expect("tempdir");
        let config = RuntimeConfig::parse(&format!(
            r#"
mode = "destination"
[storage]
sqlite_path = "sqlite::memory:"
[destination]
bind = "127.0.0.1:0"
uploads_dir = "{}"
uploads_base_url = "https://dest.example/uploads"
max_body_bytes = 1024
"#,
            uploads.path().display()
        ))
        .expect("config");

        let role = SyncRole::build(&config).await.expect("role");
        assert_eq!(role.name(), "destination");
        let SyncRole::Destination(destination) = role else {
            panic!("expected destination role");
        };
        assert_eq!(destination.state.max_body_bytes, 1024);
        assert!(destination.bind.ip().is_loopback());
    }

    #[tokio::test]
    async fn source_mode_builds_exporter() {
        let config = RuntimeConfig::parse(
            r#"
mode = "source"
[storage]
sqlite_path = "sqlite::memory:"
[source]
destination_url = "https://dest.example/wp-json"
username = "admin"
app_secret = "abcd efgh"
"#,
        )
        .expect("config");

        let role = SyncRole::build(&config).await.expect("role");
        let SyncRole::Source(exporter) = role else {
            panic!("expected source role");
        };
        assert_eq!(exporter.target().username, "admin");
    }
}
