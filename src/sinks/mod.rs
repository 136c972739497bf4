//! What happens to a confirmed hit: it is recorded, announced and fetched.
//!
//! Each concern sits behind a small async trait so the engine can be driven
//! with stand-ins. Every failure comes back as a [`SinkError`] and is only
//! ever logged by the caller.
use async_trait::async_trait;

use crate::error::SinkError;

mod download;
mod sqlite;
mod webhook;

pub use download::HttpDownloader;
pub use sqlite::SqliteStore;
pub use webhook::WebhookNotifier;

/// A file confirmed to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    /// Identifier without extension.
    pub id: String,
    /// Full URL of the file.
    pub url: String,
    /// Extension with its leading dot.
    pub extension: String,
}

/// Where hits are kept.
#[async_trait]
pub trait HitStore: Send + Sync {
    /// Saves `hit`. Saving the same id and extension again is not an error.
    async fn record_hit(&self, hit: &Hit) -> Result<(), SinkError>;
}

/// Announces hits.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `url` to whoever is listening.
    async fn notify(&self, url: &str) -> Result<(), SinkError>;
}

/// Fetches the file behind a hit.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetches `id + extension` and stores it locally.
    async fn fetch_and_store(&self, id: &str, extension: &str) -> Result<(), SinkError>;
}
