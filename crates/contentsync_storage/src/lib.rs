pub mod repository;
pub mod traits;

pub use repository::{
    AttachmentRecord, ContentSyncStorage, MetaEntry, NewAttachment, NewPost, PostId, PostRecord,
    StorageConfig, Taxonomy, TermId, DATE_FORMAT,
};
pub use traits::{
    ContentRepository, ATTACHED_FILE_META_KEY, ATTACHMENT_ALT_META_KEY, THUMBNAIL_META_KEY,
};
