use serde_json::Value;
use thiserror::Error;

use crate::record::TransferRecord;

/// Keys every record in a batch must carry. `featuredImage` may be `null` but must be present.
pub const REQUIRED_FIELDS: [&str; 12] = [
    "postType",
    "postTitle",
    "postContent",
    "postDate",
    "postModified",
    "postStatus",
    "postExcerpt",
    "postCategories",
    "postTags",
    "postMeta",
    "featuredImage",
    "attachments",
];

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize batch to JSON: {0}")]
    JsonSerialize(#[source] serde_json::Error),
    #[error("request body is not valid JSON: {0}")]
    JsonParse(#[source] serde_json::Error),
    #[error("batch must be a JSON array of records")]
    NotABatch,
    #[error("record {index} is not a JSON object")]
    NotARecord { index: usize },
    #[error("record {index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },
    #[error("record {index} is malformed: {source}")]
    Malformed {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub fn encode_batch(records: &[TransferRecord]) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(records).map_err(CodecError::JsonSerialize)
}

/// Parses and structurally validates a whole batch. Any bad record rejects the batch.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<TransferRecord>, CodecError> {
    let value: Value = serde_json::from_slice(bytes).map_err(CodecError::JsonParse)?;
    validate_batch(value)
}

pub fn validate_batch(value: Value) -> Result<Vec<TransferRecord>, CodecError> {
    let Value::Array(items) = value else {
        return Err(CodecError::NotABatch);
    };

    for (index, item) in items.iter().enumerate() {
        let object = item
            .as_object()
            .ok_or(CodecError::NotARecord { index })?;
        if let Some(field) = REQUIRED_FIELDS
            .into_iter()
            .find(|field| !object.contains_key(*field))
        {
            return Err(CodecError::MissingField { index, field });
        }
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item).map_err(|source| CodecError::Malformed { index, source })
        })
        .collect()
}
