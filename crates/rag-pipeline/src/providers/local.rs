//! Filesystem-backed object fetcher

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use super::object_store::{object_filename, DownloadedObject, ObjectFetcher};
use crate::error::{Error, Result};

/// Reads objects from `<root>/<bucket>/<name>` without copying
pub struct LocalObjectFetcher {
    root: PathBuf,
}

impl LocalObjectFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, bucket: &str, name: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(name);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::invalid_input(format!(
                "object path escapes storage root: {}/{}",
                bucket, name
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectFetcher for LocalObjectFetcher {
    async fn fetch(&self, bucket: &str, name: &str) -> Result<DownloadedObject> {
        let path = self.resolve(bucket, name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                tracing::info!("Using local object {}", path.display());
                Ok(DownloadedObject::in_place(path, object_filename(name)))
            }
            Ok(_) => Err(Error::invalid_input(format!(
                "not a file: {}",
                path.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::invalid_input(
                format!("object not found: {}/{}", bucket, name),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "local"
    }
}
