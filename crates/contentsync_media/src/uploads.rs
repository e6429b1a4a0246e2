use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::warn;

use crate::error::MediaError;
use crate::fetcher::FetchedAsset;

const MAX_NAME_ATTEMPTS: usize = 1000;

/// Bytes escaped when a stored file name becomes a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Permanent upload directory, laid out as `<root>/<YYYY>/<MM>/<file name>`.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    base_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path relative to the upload root, always `/`-separated.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    /// Public URL, with the file name percent-encoded.
    pub url: String,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copies a fetched asset into the upload directory under its original
    /// file name, adding a numeric suffix when the name is taken. The
    /// temporary download is released on every path out of this function.
    pub async fn persist(
        &self,
        asset: FetchedAsset,
        file_name: &str,
    ) -> Result<StoredFile, MediaError> {
        if !is_plain_file_name(file_name) {
            return Err(MediaError::MissingFileName(file_name.to_string()));
        }

        let subdir = Utc::now().format("%Y/%m").to_string();
        let directory = self.root.join(&subdir);
        tokio::fs::create_dir_all(&directory).await?;

        let (final_name, mut target) = claim_unique(&directory, file_name).await?;
        let absolute_path = directory.join(&final_name);

        let copied = async {
            let mut source = tokio::fs::File::open(asset.file.path()).await?;
            tokio::io::copy(&mut source, &mut target).await?;
            target.sync_all().await
        }
        .await;

        if let Err(err) = copied {
            drop(target);
            if let Err(cleanup) = tokio::fs::remove_file(&absolute_path).await {
                warn!(path = %absolute_path.display(), error = %cleanup, "failed to remove partial upload");
            }
            return Err(err.into());
        }

        if let Err(err) = asset.file.close() {
            warn!(error = %err, "failed to remove temporary download");
        }

        Ok(StoredFile {
            relative_path: format!("{subdir}/{final_name}"),
            url: format!(
                "{}/{subdir}/{}",
                self.base_url.trim_end_matches('/'),
                utf8_percent_encode(&final_name, PATH_SEGMENT)
            ),
            absolute_path,
        })
    }

    /// Removes a persisted file, used when its repository row could not be written.
    pub async fn discard(&self, stored: &StoredFile) {
        if let Err(err) = tokio::fs::remove_file(&stored.absolute_path).await {
            warn!(path = %stored.absolute_path.display(), error = %err, "failed to discard upload");
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

async fn claim_unique(
    directory: &Path,
    file_name: &str,
) -> Result<(String, tokio::fs::File), MediaError> {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name);
    let extension = path.extension().and_then(|ext| ext.to_str());

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = match (attempt, extension) {
            (0, _) => file_name.to_string(),
            (n, Some(ext)) => format!("{stem}-{n}.{ext}"),
            (n, None) => format!("{stem}-{n}"),
        };

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(directory.join(&candidate))
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    }

    Err(MediaError::Io(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free upload name for {file_name}"),
    )))
}
