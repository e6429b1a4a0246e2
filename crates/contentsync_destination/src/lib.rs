pub mod app;
pub mod importer;
pub mod rewrite;
pub mod sanitize;

pub use app::{build_router, AppState, SyncAccount, DEFAULT_MAX_BODY_BYTES};
pub use importer::{ImportError, ImportReport, Importer, ItemReport};
pub use rewrite::rewrite_urls;
