use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use contentsync_contract::{ErrorBody, SyncResponse, FORBIDDEN_CODE, SYNC_ROUTE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::importer::{ImportError, Importer};

pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// An account allowed to authenticate against the sync route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAccount {
    pub username: String,
    pub app_secret: String,
    #[serde(default)]
    pub administrator: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub importer: Arc<Importer>,
    pub accounts: Arc<Vec<SyncAccount>>,
    pub max_body_bytes: usize,
    import_gate: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(importer: Importer, accounts: Vec<SyncAccount>) -> Self {
        Self {
            importer: Arc::new(importer),
            accounts: Arc::new(accounts),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            import_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_body_bytes;
    Router::new()
        .route("/health/live", get(health_live))
        .route(SYNC_ROUTE, post(sync_content))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health_live() -> impl IntoResponse {
    Json(json!({
        "status": "live",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn sync_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorBody>)> {
    let username = authorize(&state, &headers)?;
    info!(user = %username, bytes = body.len(), "sync request received");

    // One import at a time: the file-name lookup and insert are not atomic.
    let _gate = state.import_gate.lock().await;
    match state.importer.import_batch(&body).await {
        Ok(report) => {
            for item in report.items.iter().filter(|item| !item.is_clean()) {
                warn!(
                    batch_id = %report.batch_id,
                    index = item.index,
                    post_id = ?item.post_id,
                    skipped_attachments = item.attachments_skipped.len(),
                    skipped_tags = item.tags_skipped.len(),
                    error = ?item.error,
                    "item synced with omissions"
                );
            }
            info!(batch_id = %report.batch_id, "content synced successfully");
            Ok((StatusCode::OK, Json(SyncResponse::success())))
        }
        Err(ImportError::InvalidData(error)) => {
            warn!(error = %error, "invalid data structure");
            Err((StatusCode::BAD_REQUEST, Json(ErrorBody::invalid_data())))
        }
    }
}

/// Basic credentials of a configured administrator account. Returns the username.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<String, (StatusCode, Json<ErrorBody>)> {
    let credentials = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic);

    let Some((username, secret)) = credentials else {
        return Err(forbidden(StatusCode::UNAUTHORIZED));
    };

    let account = state.accounts.iter().find(|account| {
        account.username == username
            && normalize_secret(&account.app_secret) == normalize_secret(&secret)
    });

    match account {
        Some(account) if account.administrator => Ok(username),
        Some(_) => {
            warn!(user = %username, "sync attempted by non-administrator");
            Err(forbidden(StatusCode::FORBIDDEN))
        }
        None => {
            warn!(user = %username, "sync attempted with invalid credentials");
            Err(forbidden(StatusCode::UNAUTHORIZED))
        }
    }
}

fn parse_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, secret) = decoded.split_once(':')?;
    Some((username.to_string(), secret.to_string()))
}

/// Application secrets are displayed in space-separated groups; spaces are not significant.
fn normalize_secret(secret: &str) -> String {
    secret.chars().filter(|ch| !ch.is_whitespace()).collect()
}

fn forbidden(status: StatusCode) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody::new(
            FORBIDDEN_CODE,
            "Sorry, you are not allowed to do that.",
            status.as_u16(),
        )),
    )
}
