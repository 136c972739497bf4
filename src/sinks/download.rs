//! Saves found files to disk.
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use reqwest::Client;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use super::Downloader;
use crate::error::{ConfigError, SinkError};
use crate::scanner::prober::target_url;

/// Whole-transfer limit; files can be large.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Streams `base_url + id + ext` into `directory/id+ext`.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    base_url: String,
    directory: PathBuf,
}

impl HttpDownloader {
    /// Creates `directory` if it does not exist yet.
    pub async fn new(
        base_url: impl Into<String>,
        directory: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)
            .await
            .map_err(|source| ConfigError::DownloadDir {
                path: directory.clone(),
                source,
            })?;

        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            directory,
        })
    }

    /// Where files are written.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    async fn write_body(response: reqwest::Response, path: &Path) -> Result<(), SinkError> {
        let mut file = File::create(path)
            .await
            .map_err(|e| SinkError::io(path, e))?;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?)
                .await
                .map_err(|e| SinkError::io(path, e))?;
        }
        file.flush().await.map_err(|e| SinkError::io(path, e))
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch_and_store(&self, id: &str, extension: &str) -> Result<(), SinkError> {
        let url = target_url(&self.base_url, id, extension);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status { url, status });
        }

        let path = self.directory.join(format!("{id}{extension}"));
        if let Err(e) = Self::write_body(response, &path).await {
            // Don't leave half a file behind for the next attempt to trip over.
            let _ = fs::remove_file(&path).await;
            return Err(e);
        }

        debug!("Successfully downloaded: {url}");
        Ok(())
    }
}
