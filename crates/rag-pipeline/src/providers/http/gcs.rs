//! Google Cloud Storage object fetcher (JSON API, `alt=media`)

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Url;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use super::client::HttpClient;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::providers::object_store::{object_filename, DownloadedObject, ObjectFetcher};

/// Downloads objects into a fresh temporary directory per fetch
pub struct GcsObjectFetcher {
    http: HttpClient,
    base_url: String,
    download_dir: Option<PathBuf>,
}

impl GcsObjectFetcher {
    pub fn new(http: HttpClient, config: &PipelineConfig) -> Self {
        Self {
            http,
            base_url: config.endpoints.storage_base_url.clone(),
            download_dir: config.storage.download_dir.clone(),
        }
    }

    /// `<base>/storage/v1/b/<bucket>/o/<name>?alt=media`, with each part
    /// percent-encoded as a single path segment
    pub fn media_url(&self, bucket: &str, name: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::config(format!("invalid storage base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::config("storage base URL cannot be a base"))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o", name]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn temp_dir(&self) -> Result<tempfile::TempDir> {
        let dir = match &self.download_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                tempfile::Builder::new().prefix("rag-download-").tempdir_in(parent)?
            }
            None => tempfile::Builder::new().prefix("rag-download-").tempdir()?,
        };
        Ok(dir)
    }
}

#[async_trait]
impl ObjectFetcher for GcsObjectFetcher {
    async fn fetch(&self, bucket: &str, name: &str) -> Result<DownloadedObject> {
        let url = self.media_url(bucket, name)?;
        let response = self
            .http
            .send("storage", self.http.get(url.as_str()))
            .await?;

        let dir = self.temp_dir()?;
        let filename = object_filename(name);
        let path = dir.path().join(&filename);

        let mut file = tokio::fs::File::create(&path).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let bytes =
                chunk.map_err(|e| Error::remote("storage", format!("download interrupted: {}", e)))?;
            written += bytes.len();
            file.write_all(&bytes).await?;
        }
        file.flush().await?;

        tracing::info!(
            "Downloaded gs://{}/{} -> {} ({} bytes)",
            bucket,
            name,
            path.display(),
            written
        );
        Ok(DownloadedObject::temporary(dir, path, filename))
    }

    fn name(&self) -> &str {
        "gcs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_url_encodes_object_name() {
        let config = PipelineConfig::default();
        let fetcher = GcsObjectFetcher::new(HttpClient::new(&config.endpoints).unwrap(), &config);
        let url = fetcher.media_url("docs", "reports/q1 final.pdf").unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/docs/o/reports%2Fq1%20final.pdf?alt=media"
        );
    }
}
