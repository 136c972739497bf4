//! Provides a means to read, parse and hold configuration options for scans.
use clap::Parser;
use serde_derive::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::generator::DEFAULT_ID_LENGTH;

const DEFAULT_BASE_URL: &str = "https://files.catbox.moe/";

/// File extensions, each with a leading dot.
pub type Extensions = Vec<String>;

/// Splits a comma-separated list of extensions, adding the leading dot
/// where it is missing and dropping repeats. Order is preserved.
pub fn parse_extensions(input: &str) -> Result<Extensions, String> {
    let mut extensions: Extensions = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if part.contains(char::is_whitespace) || part.contains('/') {
            return Err(format!("Invalid extension '{part}'"));
        }

        let extension = if part.starts_with('.') {
            part.to_owned()
        } else {
            format!(".{part}")
        };
        if extension == "." {
            return Err(format!("Invalid extension '{part}'"));
        }
        if !extensions.contains(&extension) {
            extensions.push(extension);
        }
    }

    if extensions.is_empty() {
        return Err(String::from("No valid extensions provided"));
    }

    Ok(extensions)
}

fn default_extensions() -> Extensions {
    [".png", ".jpg", ".gif", ".mp4"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "boxprobe",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Probes a file host for random short identifiers.
/// While running, type `pause`, `resume` or `stop` and press enter.
/// Ctrl-C stops after the requests in flight have finished.
pub struct Opts {
    /// Number of concurrent workers. Also the size of the candidate queue.
    #[arg(short, long, default_value = "16")]
    pub workers: u16,

    /// Attempts per request before giving up on it.
    #[arg(short, long, default_value = "3")]
    pub retry_limit: u8,

    /// Pause in milliseconds between attempts.
    #[arg(long, default_value = "0")]
    pub retry_delay: u64,

    /// A comma-delimited list of file extensions to try for every identifier.
    /// Example: png,jpg,.mp4
    #[arg(short, long, value_parser = parse_extensions, default_value = ".png,.jpg,.gif,.mp4")]
    pub extensions: Extensions,

    /// URL the identifier and extension are appended to.
    #[arg(short, long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Length of generated identifiers.
    #[arg(long, default_value_t = DEFAULT_ID_LENGTH)]
    pub id_length: usize,

    /// The timeout in milliseconds before a request is given up on.
    #[arg(short, long, default_value = "10000")]
    pub timeout: u64,

    /// SQLite database the found files are written to.
    #[arg(short, long, default_value = "boxprobe.db")]
    pub database: PathBuf,

    /// Route every probe through the proxies in --proxy-file, round robin.
    #[arg(long)]
    pub use_proxies: bool,

    /// Newline-delimited file of proxy endpoints (host:port).
    #[arg(long)]
    pub proxy_file: Option<PathBuf>,

    /// Scheme used to reach the proxies: http, https, socks5 or socks5h.
    #[arg(long, default_value = "http")]
    pub proxy_scheme: String,

    /// Download every file that is found.
    #[arg(long)]
    pub download: bool,

    /// Directory downloads are written to.
    #[arg(long, default_value = "downloads")]
    pub download_path: PathBuf,

    /// Post every found URL to --webhook-url.
    #[arg(long)]
    pub webhook_enabled: bool,

    /// Discord-style webhook URL.
    #[arg(long)]
    pub webhook_url: Option<String>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Greppable mode. Only output the found URLs.
    #[arg(short, long)]
    pub greppable: bool,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long)]
    pub accessible: bool,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    /// Parses the process arguments.
    pub fn read() -> Self {
        Self::parse()
    }

    /// Reads the command line arguments into an Opts struct and merge
    /// values found within the user configuration file.
    pub fn merge(&mut self, config: &Config) -> Result<(), ConfigError> {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config)?;
        }
        Ok(())
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(
            workers, retry_limit, retry_delay, base_url, id_length, timeout, database,
            use_proxies, proxy_scheme, download, download_path, webhook_enabled, log_level,
            greppable, accessible
        );
    }

    fn merge_optional(&mut self, config: &Config) -> Result<(), ConfigError> {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        // Extensions in the file go through the same normalisation as the CLI.
        if let Some(extensions) = &config.extensions {
            self.extensions =
                parse_extensions(&extensions.join(",")).map_err(ConfigError::InvalidExtensions)?;
        }

        merge_optional!(proxy_file, webhook_url);
        Ok(())
    }

    /// Checks everything that would otherwise only fail once the scan is
    /// already running.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.retry_limit == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if self.timeout == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.id_length == 0 {
            return Err(ConfigError::ZeroIdLength);
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }

        let invalid_base = |reason: &str| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: reason.to_owned(),
        };
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| invalid_base(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid_base("expected an http or https URL"));
        }

        if self.use_proxies {
            if self.proxy_file.is_none() {
                return Err(ConfigError::MissingProxyFile);
            }
            crate::proxy::validate_scheme(&self.proxy_scheme)?;
        }
        if self.webhook_enabled && !matches!(self.webhook_url.as_deref(), Some(url) if !url.is_empty())
        {
            return Err(ConfigError::MissingWebhookUrl);
        }

        Ok(())
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Pause between attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            workers: 16,
            retry_limit: 3,
            retry_delay: 0,
            extensions: default_extensions(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            id_length: DEFAULT_ID_LENGTH,
            timeout: 10_000,
            database: PathBuf::from("boxprobe.db"),
            use_proxies: false,
            proxy_file: None,
            proxy_scheme: String::from("http"),
            download: false,
            download_path: PathBuf::from("downloads"),
            webhook_enabled: false,
            webhook_url: None,
            log_level: String::from("info"),
            greppable: false,
            accessible: false,
            no_config: true,
            config_path: None,
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[cfg(not(tarpaulin_include))]
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    workers: Option<u16>,
    retry_limit: Option<u8>,
    retry_delay: Option<u64>,
    extensions: Option<Vec<String>>,
    base_url: Option<String>,
    id_length: Option<usize>,
    timeout: Option<u64>,
    database: Option<PathBuf>,
    use_proxies: Option<bool>,
    proxy_file: Option<PathBuf>,
    proxy_scheme: Option<String>,
    download: Option<bool>,
    download_path: Option<PathBuf>,
    webhook_enabled: Option<bool>,
    webhook_url: Option<String>,
    log_level: Option<String>,
    greppable: Option<bool>,
    accessible: Option<bool>,
}

#[cfg(not(tarpaulin_include))]
impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing or unreadable file yields an empty config.
    ///
    /// # Format
    ///
    /// workers = 32
    /// retry_limit = 3
    /// extensions = [".png", ".jpg"]
    /// use_proxies = true
    /// proxy_file = "proxies.txt"
    /// proxy_scheme = "socks5"
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = custom_config_path.unwrap_or_else(default_config_path);
        let content = if config_path.exists() {
            fs::read_to_string(config_path).unwrap_or_default()
        } else {
            String::new()
        };

        Self::parse(&content)
    }

    /// Parses TOML text. Unknown keys are an error.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> PathBuf {
    let mut config_path = dirs::home_dir().unwrap_or_default();
    config_path.push(".boxprobe.toml");
    config_path
}
