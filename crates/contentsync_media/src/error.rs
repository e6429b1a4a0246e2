use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid attachment URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported URL scheme `{0}`")]
    UnsupportedScheme(String),
    #[error("refusing to fetch from non-external host {0}")]
    BlockedHost(String),
    #[error("attachment URL has no usable file name: {0}")]
    MissingFileName(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("download failed for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("upload store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("repository error: {0:#}")]
    Repository(anyhow::Error),
}

impl From<anyhow::Error> for MediaError {
    fn from(error: anyhow::Error) -> Self {
        MediaError::Repository(error)
    }
}
