use serde::{Deserialize, Serialize};

pub const SYNC_ROUTE: &str = "/content-sync/v1/sync";
pub const SUCCESS_MESSAGE: &str = "Content synced successfully";
pub const INVALID_DATA_CODE: &str = "invalid_data";
pub const FORBIDDEN_CODE: &str = "rest_forbidden";

/// Full sync URL for a destination base such as `https://dest.example/wp-json`.
pub fn sync_endpoint(destination_base: &str) -> String {
    format!("{}{}", destination_base.trim_end_matches('/'), SYNC_ROUTE)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncResponse {
    pub message: String,
}

impl SyncResponse {
    pub fn success() -> Self {
        Self {
            message: SUCCESS_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorData {
    pub status: u16,
}

/// REST error object: `{"code": .., "message": .., "data": {"status": ..}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub data: ErrorData,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>, status: u16) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            data: ErrorData { status },
        }
    }

    pub fn invalid_data() -> Self {
        Self::new(INVALID_DATA_CODE, "Invalid data structure.", 400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            sync_endpoint("https://dest.example/wp-json/"),
            "https://dest.example/wp-json/content-sync/v1/sync"
        );
        assert_eq!(
            sync_endpoint("http://127.0.0.1:8080"),
            "http://127.0.0.1:8080/content-sync/v1/sync"
        );
    }

    #[test]
    fn invalid_data_body_shape() {
        let body = serde_json::to_value(ErrorBody::invalid_data()).expect("serialize");
        assert_eq!(body["code"], "invalid_data");
        assert_eq!(body["data"]["status"], 400);
    }
}
