//! Error types shared by the engine and its collaborators.
use std::path::PathBuf;

use thiserror::Error;

/// Problems found while assembling the scanner. These abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `workers` is 0.
    #[error("Worker count must be greater than zero")]
    ZeroWorkers,

    /// `retry_limit` is 0.
    #[error("Retry limit must be greater than zero")]
    ZeroRetries,

    /// `timeout` is 0, which would fail every request.
    #[error("Timeout must be greater than zero")]
    ZeroTimeout,

    /// `id_length` is 0.
    #[error("Identifier length must be greater than zero")]
    ZeroIdLength,

    /// The extension list ended up empty.
    #[error("No file extensions configured")]
    NoExtensions,

    /// The configuration file lists extensions that do not parse.
    #[error("Invalid extensions in configuration file: {0}")]
    InvalidExtensions(String),

    /// The base URL is not an absolute http or https URL.
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// The configured value.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// `use_proxies` without `proxy_file`.
    #[error("Proxies are enabled but no proxy file was given")]
    MissingProxyFile,

    /// The proxy file could not be read.
    #[error("Could not read proxy file {}: {source}", path.display())]
    ProxyFile {
        /// Path of the proxy file.
        path: PathBuf,
        /// Underlying read error.
        #[source]
        source: std::io::Error,
    },

    /// The proxy file holds no endpoints.
    #[error("Proxy list is empty")]
    EmptyProxyList,

    /// Not one of `http`, `https`, `socks5` or `socks5h`.
    #[error("Unsupported proxy scheme '{0}'. Expected http, https, socks5 or socks5h")]
    ProxyScheme(String),

    /// reqwest refused a proxy endpoint.
    #[error("Invalid proxy endpoint '{endpoint}': {source}")]
    InvalidProxy {
        /// The endpoint as listed in the proxy file.
        endpoint: String,
        /// Error from building the proxy.
        #[source]
        source: reqwest::Error,
    },

    /// `webhook_enabled` without `webhook_url`.
    #[error("Webhook is enabled but no webhook URL was given")]
    MissingWebhookUrl,

    /// The webhook URL does not parse.
    #[error("Invalid webhook URL '{url}': {reason}")]
    InvalidWebhookUrl {
        /// The configured value.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An HTTP client could not be built (TLS backend, proxy setup).
    #[error("Could not build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// The download directory could not be created.
    #[error("Could not create download directory {}: {source}", path.display())]
    DownloadDir {
        /// Directory that was asked for.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML configuration file is malformed.
    #[error("Found {0} in configuration file")]
    Parse(#[from] toml::de::Error),
}

/// Failures of the persistence, notification and download collaborators.
///
/// None of these are fatal to a running scan; workers log them and move on.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Query or connection failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure while opening the database.
    #[error("database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The request never got a response.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a status that is not a success.
    #[error("{url} returned status {status}")]
    Status {
        /// URL that was requested.
        url: String,
        /// Status it answered with.
        status: reqwest::StatusCode,
    },

    /// Reading or writing a local file failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl SinkError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
