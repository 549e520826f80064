//! Upload storage: filename sanitization, unique naming and the flat uploads directory

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A file persisted in the uploads directory
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Unique storage name (`<hex8>_<sanitized>`)
    pub filename: String,
    /// Sanitized name as sent by the client
    pub original_filename: String,
    /// Full path on disk
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Reduce a client-supplied filename to a safe, flat ASCII name.
///
/// Unicode is decomposed and non-ASCII dropped, path separators become word breaks,
/// whitespace runs become `_`, anything outside `[A-Za-z0-9_.-]` is removed and
/// leading/trailing `.`/`_` are stripped. May return an empty string.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name.nfkd().filter(char::is_ascii).collect();
    let spaced = ascii.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Prefix an already-sanitized name with a short random hex token
pub fn unique_filename(sanitized: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("{}_{}", &token[..8], sanitized)
}

/// Flat directory of uploaded files
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Open the uploads directory, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a stored file. Names are reduced to their final component.
    pub fn path_for(&self, storage_name: &str) -> PathBuf {
        let flat = Path::new(storage_name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        self.dir.join(flat)
    }

    /// Whether a stored file is still present
    pub fn exists(&self, storage_name: &str) -> bool {
        self.path_for(storage_name).is_file()
    }

    /// Sanitize, uniquely name and write an upload
    pub async fn save(&self, client_filename: &str, data: &[u8]) -> Result<StoredUpload> {
        let original_filename = secure_filename(client_filename);
        if original_filename.is_empty() {
            return Err(Error::InvalidUpload("Invalid filename".to_string()));
        }

        let filename = unique_filename(&original_filename);
        let path = self.path_for(&filename);
        if let Err(e) = tokio::fs::write(&path, data).await {
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                tracing::debug!("No partial upload to remove at {}: {}", path.display(), cleanup);
            }
            return Err(e.into());
        }

        tracing::info!(
            "Stored upload '{}' as '{}' ({} bytes)",
            original_filename,
            filename,
            data.len()
        );

        Ok(StoredUpload {
            filename,
            original_filename,
            path,
            size: data.len() as u64,
            created_at: Utc::now(),
        })
    }

    /// Delete a stored file. Returns false if it was already gone.
    pub async fn remove(&self, storage_name: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(storage_name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
