use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use contentsync_contract::{
    encode_batch, sync_endpoint, AttachmentRef, PostMeta, PostStatus, SyncResponse,
    TransferRecord, SUCCESS_MESSAGE,
};
use contentsync_storage::{
    AttachmentRecord, ContentRepository, PostId, PostRecord, Taxonomy, THUMBNAIL_META_KEY,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::outcome::SyncOutcome;

pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);
pub const EXPORTED_POST_TYPES: [&str; 2] = ["post", "page"];

/// Meta keys holding identifiers that only mean something on the source.
const SOURCE_LOCAL_META_KEYS: [&str; 3] = [THUMBNAIL_META_KEY, "_edit_lock", "_edit_last"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Ids(Vec<PostId>),
    /// Every post and page.
    Everything,
}

/// Where and as whom batches are delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTarget {
    /// Destination REST base, e.g. `https://dest.example/wp-json`.
    pub destination_url: String,
    pub username: String,
    pub app_secret: String,
}

impl DeliveryTarget {
    pub fn endpoint(&self) -> String {
        sync_endpoint(&self.destination_url)
    }
}

pub struct Exporter {
    repository: Arc<dyn ContentRepository>,
    client: reqwest::Client,
    target: DeliveryTarget,
}

impl Exporter {
    pub fn new(
        repository: Arc<dyn ContentRepository>,
        target: DeliveryTarget,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build delivery client")?;
        Ok(Self {
            repository,
            client,
            target,
        })
    }

    pub fn target(&self) -> &DeliveryTarget {
        &self.target
    }

    /// Collects and delivers in one step.
    pub async fn sync(&self, selection: &Selection) -> Result<SyncOutcome> {
        let records = self.collect(selection).await?;
        self.deliver(&records).await
    }

    /// Builds one transfer record per selected post, read fresh from the repository.
    pub async fn collect(&self, selection: &Selection) -> Result<Vec<TransferRecord>> {
        let posts = match selection {
            Selection::Everything => self
                .repository
                .list_posts(&EXPORTED_POST_TYPES)
                .await
                .context("list exportable posts")?,
            Selection::Ids(ids) => {
                let mut posts = Vec::with_capacity(ids.len());
                for &post_id in ids {
                    match self.repository.get_post(post_id).await? {
                        Some(post) => posts.push(post),
                        None => warn!(post_id, "selected post not found, skipping"),
                    }
                }
                posts
            }
        };

        let mut records = Vec::with_capacity(posts.len());
        for post in posts {
            let post_id = post.post_id;
            if let Some(record) = self
                .to_record(post)
                .await
                .with_context(|| format!("export post {post_id}"))?
            {
                records.push(record);
            }
        }
        info!(records = records.len(), "content collected");
        Ok(records)
    }

    async fn to_record(&self, post: PostRecord) -> Result<Option<TransferRecord>> {
        let Some(post_status) = PostStatus::parse(&post.post_status) else {
            warn!(post_id = post.post_id, status = %post.post_status, "unknown post status, skipping");
            return Ok(None);
        };

        let mut post_meta = PostMeta::new();
        for entry in self.repository.post_meta(post.post_id).await? {
            if SOURCE_LOCAL_META_KEYS.contains(&entry.meta_key.as_str()) {
                continue;
            }
            post_meta.entry(entry.meta_key).or_default().push(entry.meta_value);
        }

        let featured_image = match self.repository.thumbnail_id(post.post_id).await? {
            Some(attachment_id) => self
                .repository
                .get_attachment(attachment_id)
                .await?
                .map(attachment_ref),
            None => None,
        };

        let attachments = self
            .repository
            .attached_media(post.post_id, "image/")
            .await?
            .into_iter()
            .map(attachment_ref)
            .collect();

        Ok(Some(TransferRecord {
            post_categories: self
                .repository
                .post_term_names(post.post_id, Taxonomy::Category)
                .await?,
            post_tags: self
                .repository
                .post_term_names(post.post_id, Taxonomy::PostTag)
                .await?,
            post_type: post.post_type,
            post_title: post.post_title,
            post_content: post.post_content,
            post_date: post.post_date,
            post_modified: post.post_modified,
            post_status,
            post_excerpt: post.post_excerpt,
            post_meta,
            featured_image,
            attachments,
        }))
    }

    /// Single authenticated POST of the whole batch. Never retries.
    ///
    /// A batch that cannot be encoded is a local error and never reaches the
    /// network; every outcome returned in `Ok` describes an attempted request.
    pub async fn deliver(&self, records: &[TransferRecord]) -> Result<SyncOutcome> {
        let endpoint = self.target.endpoint();
        let payload = encode_batch(records).context("encode sync batch")?;
        debug!(endpoint = %endpoint, payload = %String::from_utf8_lossy(&payload), "sync request payload");

        let response = self
            .client
            .post(&endpoint)
            .basic_auth(&self.target.username, Some(&self.target.app_secret))
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                error!(endpoint = %endpoint, error = %err, "sync request failed");
                return Ok(SyncOutcome::TransportFailure {
                    reason: err.to_string(),
                });
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                error!(endpoint = %endpoint, status = status.as_u16(), error = %err, "sync response unreadable");
                return Ok(SyncOutcome::TransportFailure {
                    reason: err.to_string(),
                });
            }
        };
        info!(status = status.as_u16(), body = %body, "sync response received");

        if status == StatusCode::OK {
            let message = serde_json::from_str::<SyncResponse>(&body)
                .map(|response| response.message)
                .unwrap_or_else(|_| SUCCESS_MESSAGE.to_string());
            Ok(SyncOutcome::Success { message })
        } else {
            warn!(status = status.as_u16(), "sync rejected by destination");
            Ok(SyncOutcome::RemoteRejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn attachment_ref(attachment: AttachmentRecord) -> AttachmentRef {
    AttachmentRef {
        id: Some(attachment.attachment_id),
        url: attachment.url,
        title: attachment.title,
        description: attachment.description,
        caption: attachment.caption,
        alt: attachment.alt.unwrap_or_default(),
    }
}
