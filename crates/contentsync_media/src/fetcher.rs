use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::MediaError;
use crate::policy::OutboundPolicy;

pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 5;

/// A downloaded asset parked in a temporary file. The file is removed when
/// the value is dropped, whether or not it was persisted.
#[derive(Debug)]
pub struct FetchedAsset {
    pub file: NamedTempFile,
    pub content_type: Option<String>,
    pub size: u64,
}

impl FetchedAsset {
    pub fn mime_type(&self) -> mime::Mime {
        self.content_type
            .as_deref()
            .and_then(|raw| raw.parse::<mime::Mime>().ok())
            .unwrap_or(mime::APPLICATION_OCTET_STREAM)
    }
}

/// Fetches a remote asset into a temporary file.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset, MediaError>;
}

#[derive(Debug, Clone)]
pub struct HttpAssetFetcher {
    client: reqwest::Client,
    policy: OutboundPolicy,
}

impl HttpAssetFetcher {
    pub fn new(policy: OutboundPolicy, timeout: Duration) -> Result<Self, MediaError> {
        let redirect_policy = policy.clone();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::custom(move |attempt| {
                if attempt.previous().len() >= MAX_REDIRECTS {
                    attempt.error("too many redirects")
                } else if redirect_policy.check_url(attempt.url()).is_err() {
                    attempt.stop()
                } else {
                    attempt.follow()
                }
            }))
            .build()
            .map_err(MediaError::Client)?;

        Ok(Self { client, policy })
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset, MediaError> {
        let parsed = self.policy.check(url)?;
        let transport = |source| MediaError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(parsed).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let temp = NamedTempFile::new()?;
        let mut file = tokio::fs::File::from_std(temp.reopen()?);
        let mut size = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport)?;
            size += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(url = %url, bytes = size, "asset downloaded to temporary file");
        Ok(FetchedAsset {
            file: temp,
            content_type,
            size,
        })
    }
}

/// Serves assets from memory. Unknown URLs answer with a 404.
#[derive(Debug, Default)]
pub struct StaticAssetFetcher {
    assets: HashMap<String, (Vec<u8>, String)>,
    fetches: AtomicUsize,
}

impl StaticAssetFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(
        mut self,
        url: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        content_type: impl Into<String>,
    ) -> Self {
        self.assets
            .insert(url.into(), (bytes.into(), content_type.into()));
        self
    }

    /// Number of successful fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetFetcher for StaticAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset, MediaError> {
        let (bytes, content_type) = self.assets.get(url).ok_or_else(|| MediaError::HttpStatus {
            url: url.to_string(),
            status: 404,
        })?;

        let temp = NamedTempFile::new()?;
        let mut file = tokio::fs::File::from_std(temp.reopen()?);
        file.write_all(bytes).await?;
        file.flush().await?;

        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(FetchedAsset {
            file: temp,
            content_type: Some(content_type.clone()),
            size: bytes.len() as u64,
        })
    }
}
