use std::path::Path;
use std::sync::Arc;

use contentsync_contract::AttachmentRef;
use contentsync_storage::{ContentRepository, NewAttachment, PostId, ATTACHMENT_ALT_META_KEY};
use tracing::{debug, info};

use crate::error::MediaError;
use crate::fetcher::AssetFetcher;
use crate::uploads::UploadStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentMode {
    /// Body attachment: title, description and caption are stored.
    Normal,
    /// Featured image: title only, and the asset becomes the post's thumbnail.
    Featured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedAttachment {
    pub attachment_id: PostId,
    pub url: String,
    /// True when an existing asset was found by file name and nothing was downloaded.
    pub reused: bool,
}

/// Ensures a single asset exists on this side and returns its identifier.
///
/// Identity is the file name (URL basename) matched against stored file
/// paths. Two different source files with the same basename resolve to the
/// asset stored first.
pub struct AttachmentSyncer {
    repository: Arc<dyn ContentRepository>,
    fetcher: Arc<dyn AssetFetcher>,
    uploads: UploadStore,
}

impl AttachmentSyncer {
    pub fn new(
        repository: Arc<dyn ContentRepository>,
        fetcher: Arc<dyn AssetFetcher>,
        uploads: UploadStore,
    ) -> Self {
        Self {
            repository,
            fetcher,
            uploads,
        }
    }

    pub async fn sync(
        &self,
        post_id: PostId,
        attachment: &AttachmentRef,
        mode: AttachmentMode,
    ) -> Result<SyncedAttachment, MediaError> {
        let file_name = attachment
            .file_name()
            .ok_or_else(|| MediaError::MissingFileName(attachment.url.clone()))?;

        if let Some(existing) = self.repository.find_attachment_by_file_name(&file_name).await? {
            debug!(
                post_id,
                attachment_id = existing.attachment_id,
                file_name = %file_name,
                "reusing existing attachment"
            );
            if mode == AttachmentMode::Featured {
                self.assign_thumbnail(post_id, existing.attachment_id).await?;
            }
            return Ok(SyncedAttachment {
                attachment_id: existing.attachment_id,
                url: existing.url,
                reused: true,
            });
        }

        let asset = self.fetcher.fetch(&attachment.url).await?;
        let mime_type = asset.mime_type().essence_str().to_string();
        let stored = self.uploads.persist(asset, &file_name).await?;

        let title = if attachment.title.is_empty() {
            Path::new(&file_name)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(&file_name)
                .to_string()
        } else {
            attachment.title.clone()
        };
        let (description, caption) = match mode {
            AttachmentMode::Normal => (attachment.description.clone(), attachment.caption.clone()),
            AttachmentMode::Featured => (String::new(), String::new()),
        };

        let record = NewAttachment {
            parent: Some(post_id),
            title,
            description,
            caption,
            file_path: stored.relative_path.clone(),
            url: stored.url.clone(),
            mime_type,
        };

        let attachment_id = match self.repository.insert_attachment(&record).await {
            Ok(id) => id,
            Err(err) => {
                self.uploads.discard(&stored).await;
                return Err(err.into());
            }
        };

        self.repository
            .update_post_meta(attachment_id, ATTACHMENT_ALT_META_KEY, &attachment.alt)
            .await?;

        if mode == AttachmentMode::Featured {
            self.assign_thumbnail(post_id, attachment_id).await?;
        }

        info!(
            post_id,
            attachment_id,
            source_url = %attachment.url,
            url = %stored.url,
            "attachment stored"
        );
        Ok(SyncedAttachment {
            attachment_id,
            url: stored.url,
            reused: false,
        })
    }

    async fn assign_thumbnail(&self, post_id: PostId, attachment_id: PostId) -> Result<(), MediaError> {
        if self.repository.thumbnail_id(post_id).await? != Some(attachment_id) {
            self.repository.set_thumbnail(post_id, attachment_id).await?;
        }
        Ok(())
    }
}
