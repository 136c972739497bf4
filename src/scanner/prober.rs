//! One existence check against the file host.
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, ClientBuilder, Proxy};

use crate::error::ConfigError;
use crate::proxy::{self, ProxyRotator};

/// Upper bound on establishing a connection, proxied or not.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The host answered with a 2xx status.
    Found,
    /// The host answered with anything else.
    NotFound,
    /// No answer: timeout, refused connection, DNS or TLS failure.
    TransportError,
}

/// Something that can tell whether `base_url + id + extension` exists.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Checks one identifier with one extension.
    async fn probe(&self, id: &str, extension: &str) -> ProbeOutcome;
}

/// Full URL of a candidate file.
pub fn target_url(base_url: &str, id: &str, extension: &str) -> String {
    format!("{base_url}{id}{extension}")
}

struct ProxiedClient {
    endpoint: String,
    client: Client,
}

impl fmt::Debug for ProxiedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxiedClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum Route {
    Direct(Client),
    Proxied(ProxyRotator<ProxiedClient>),
}

/// Probes with a `HEAD` request so no file body is transferred.
///
/// With proxies enabled every proxy gets its own client, built once up
/// front, and each probe takes the next one from the rotation.
#[derive(Debug)]
pub struct HttpProber {
    base_url: String,
    route: Route,
}

impl HttpProber {
    /// Connects to the host directly, ignoring proxy environment variables.
    pub fn direct(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let client = client_builder(timeout)
            .no_proxy()
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            base_url: base_url.into(),
            route: Route::Direct(client),
        })
    }

    /// Builds one client per endpoint, reached with `scheme`.
    pub fn proxied(
        base_url: impl Into<String>,
        timeout: Duration,
        endpoints: ProxyRotator<String>,
        scheme: &str,
    ) -> Result<Self, ConfigError> {
        proxy::validate_scheme(scheme)?;

        let clients = endpoints.try_map(|endpoint| -> Result<_, ConfigError> {
            let url = proxy::proxy_url(scheme, &endpoint);
            let proxy = Proxy::all(&url).map_err(|source| ConfigError::InvalidProxy {
                endpoint: endpoint.clone(),
                source,
            })?;
            let client = client_builder(timeout)
                .proxy(proxy)
                .build()
                .map_err(ConfigError::HttpClient)?;
            Ok(ProxiedClient { endpoint, client })
        })?;

        Ok(Self {
            base_url: base_url.into(),
            route: Route::Proxied(clients),
        })
    }

    fn client(&self) -> &Client {
        match &self.route {
            Route::Direct(client) => client,
            Route::Proxied(clients) => {
                let proxied = clients.next_proxy();
                debug!("Using proxy: {}", proxied.endpoint);
                &proxied.client
            }
        }
    }
}

fn client_builder(timeout: Duration) -> ClientBuilder {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(CONNECT_TIMEOUT))
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, id: &str, extension: &str) -> ProbeOutcome {
        let url = target_url(&self.base_url, id, extension);

        match self.client().head(&url).send().await {
            Ok(response) if response.status().is_success() => ProbeOutcome::Found,
            Ok(response) => {
                debug!("File does not exist: {url} ({})", response.status());
                ProbeOutcome::NotFound
            }
            Err(e) => {
                debug!("Error making request for {url}: {e}");
                ProbeOutcome::TransportError
            }
        }
    }
}
