use anyhow::Result;
use async_trait::async_trait;

use crate::repository::{
    AttachmentRecord, MetaEntry, NewAttachment, NewPost, PostId, PostRecord, Taxonomy, TermId,
};

pub const THUMBNAIL_META_KEY: &str = "_thumbnail_id";
pub const ATTACHED_FILE_META_KEY: &str = "_wp_attached_file";
pub const ATTACHMENT_ALT_META_KEY: &str = "_wp_attachment_image_alt";

/// Content repository of the host CMS: posts, pages, attachments, meta and taxonomy.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn insert_post(&self, post: &NewPost) -> Result<PostId>;

    async fn get_post(&self, post_id: PostId) -> Result<Option<PostRecord>>;

    /// Posts of the given types in id order.
    async fn list_posts(&self, post_types: &[&str]) -> Result<Vec<PostRecord>>;

    /// Replaces the body only; `post_date` and `post_modified` are left as stored.
    async fn update_post_content(&self, post_id: PostId, content: &str) -> Result<()>;

    /// Appends a meta entry. Never replaces existing values for the key.
    async fn add_post_meta(&self, post_id: PostId, key: &str, value: &str) -> Result<()>;

    /// Replaces every value of `key` with a single value.
    async fn update_post_meta(&self, post_id: PostId, key: &str, value: &str) -> Result<()>;

    /// All meta entries of a post in insertion order.
    async fn post_meta(&self, post_id: PostId) -> Result<Vec<MetaEntry>>;

    async fn meta_value(&self, post_id: PostId, key: &str) -> Result<Option<String>>;

    async fn find_term_by_slug(&self, taxonomy: Taxonomy, slug: &str) -> Result<Option<TermId>>;

    async fn find_term_by_name(&self, taxonomy: Taxonomy, name: &str) -> Result<Option<TermId>>;

    async fn insert_term(&self, taxonomy: Taxonomy, name: &str, slug: &str) -> Result<TermId>;

    /// Replaces the post's terms of one taxonomy.
    async fn set_post_terms(
        &self,
        post_id: PostId,
        taxonomy: Taxonomy,
        term_ids: &[TermId],
    ) -> Result<()>;

    async fn post_term_names(&self, post_id: PostId, taxonomy: Taxonomy) -> Result<Vec<String>>;

    async fn insert_attachment(&self, attachment: &NewAttachment) -> Result<PostId>;

    async fn get_attachment(&self, attachment_id: PostId) -> Result<Option<AttachmentRecord>>;

    /// Oldest attachment whose stored file path contains `file_name`.
    async fn find_attachment_by_file_name(
        &self,
        file_name: &str,
    ) -> Result<Option<AttachmentRecord>>;

    /// Attachments parented to `post_id` whose MIME type starts with `mime_prefix`.
    async fn attached_media(
        &self,
        post_id: PostId,
        mime_prefix: &str,
    ) -> Result<Vec<AttachmentRecord>>;

    async fn thumbnail_id(&self, post_id: PostId) -> Result<Option<PostId>> {
        Ok(self
            .meta_value(post_id, THUMBNAIL_META_KEY)
            .await?
            .and_then(|raw| raw.parse().ok()))
    }

    async fn set_thumbnail(&self, post_id: PostId, attachment_id: PostId) -> Result<()> {
        self.update_post_meta(post_id, THUMBNAIL_META_KEY, &attachment_id.to_string())
            .await
    }
}
