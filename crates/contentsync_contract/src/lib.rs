pub mod codec;
pub mod record;
pub mod wire;

pub use codec::{decode_batch, encode_batch, validate_batch, CodecError, REQUIRED_FIELDS};
pub use record::{AttachmentRef, PostMeta, PostStatus, TransferRecord};
pub use wire::{
    sync_endpoint, ErrorBody, ErrorData, SyncResponse, FORBIDDEN_CODE, INVALID_DATA_CODE,
    SUCCESS_MESSAGE, SYNC_ROUTE,
};
