//! Object download trait

use async_trait::async_trait;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::error::Result;

/// A fetched object on local disk
///
/// When the object was copied into a temporary directory, that directory is
/// owned here and removed on drop.
#[derive(Debug)]
pub struct DownloadedObject {
    pub path: PathBuf,
    pub filename: String,
    cleanup: Option<TempDir>,
}

impl DownloadedObject {
    /// An object copied into `dir`, removed when this value drops
    pub fn temporary(dir: TempDir, path: PathBuf, filename: impl Into<String>) -> Self {
        Self {
            path,
            filename: filename.into(),
            cleanup: Some(dir),
        }
    }

    /// An object read in place; nothing is removed on drop
    pub fn in_place(path: PathBuf, filename: impl Into<String>) -> Self {
        Self {
            path,
            filename: filename.into(),
            cleanup: None,
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.cleanup.is_some()
    }
}

/// Fetches one stored object to local disk
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch(&self, bucket: &str, name: &str) -> Result<DownloadedObject>;

    fn name(&self) -> &str;
}

/// Last path segment of an object name, used as the local filename
pub fn object_filename(name: &str) -> String {
    let last = name.rsplit('/').find(|s| !s.is_empty()).unwrap_or("object");
    last.to_string()
}
