pub mod error;
pub mod fetcher;
pub mod policy;
pub mod sync;
pub mod uploads;

pub use error::MediaError;
pub use fetcher::{
    AssetFetcher, FetchedAsset, HttpAssetFetcher, StaticAssetFetcher, DEFAULT_DOWNLOAD_TIMEOUT,
};
pub use policy::OutboundPolicy;
pub use sync::{AttachmentMode, AttachmentSyncer, SyncedAttachment};
pub use uploads::{StoredFile, UploadStore};
