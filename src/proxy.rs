//! Round-robin proxy selection shared by every worker.
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use tokio::fs;

use crate::error::ConfigError;

/// Schemes a proxy endpoint may be reached with.
pub const PROXY_SCHEMES: [&str; 4] = ["http", "https", "socks5", "socks5h"];

/// Cycles through a fixed list of proxies.
///
/// The list never changes after construction. The cursor is advanced with a
/// single compare-and-swap, so concurrent callers each get their own slot
/// and the cursor always points at a valid element.
///
/// ```rust
/// # use boxprobe::proxy::ProxyRotator;
/// let proxies = ProxyRotator::new(vec!["10.0.0.1:8080", "10.0.0.2:8080"]).unwrap();
/// assert_eq!(*proxies.next_proxy(), "10.0.0.1:8080");
/// assert_eq!(*proxies.next_proxy(), "10.0.0.2:8080");
/// assert_eq!(*proxies.next_proxy(), "10.0.0.1:8080");
/// ```
#[derive(Debug)]
pub struct ProxyRotator<T> {
    proxies: Box<[T]>,
    cursor: AtomicUsize,
}

impl<T> ProxyRotator<T> {
    /// Fails with [`ConfigError::EmptyProxyList`] on an empty list.
    pub fn new(proxies: Vec<T>) -> Result<Self, ConfigError> {
        if proxies.is_empty() {
            return Err(ConfigError::EmptyProxyList);
        }

        Ok(Self {
            proxies: proxies.into_boxed_slice(),
            cursor: AtomicUsize::new(0),
        })
    }

    /// Returns the proxy under the cursor and moves the cursor one step,
    /// wrapping at the end of the list.
    pub fn next_proxy(&self) -> &T {
        let len = self.proxies.len();
        let index = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                Some((cur + 1) % len)
            })
            .unwrap_or_else(|cur| cur);
        &self.proxies[index]
    }

    /// Number of proxies in the rotation.
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Always `false`; an empty rotator cannot be built.
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Builds a rotator over something derived from each proxy, keeping the
    /// order. Used to turn endpoint strings into ready HTTP clients.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<ProxyRotator<U>, E> {
        let proxies = self
            .proxies
            .into_vec()
            .into_iter()
            .map(f)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProxyRotator {
            proxies: proxies.into_boxed_slice(),
            cursor: AtomicUsize::new(0),
        })
    }
}

/// Reads proxy endpoints from a newline-delimited file.
///
/// Blank lines and lines starting with `#` are skipped. An empty result is
/// a configuration error.
pub async fn load_endpoints(path: &Path) -> Result<ProxyRotator<String>, ConfigError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::ProxyFile {
            path: path.to_path_buf(),
            source,
        })?;

    let endpoints = parse_endpoints(&content);
    debug!("Loaded {} proxies from {}", endpoints.len(), path.display());
    ProxyRotator::new(endpoints)
}

fn parse_endpoints(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

/// Turns an endpoint such as `1.2.3.4:8080` into a proxy URL. Endpoints that
/// already carry a scheme are left alone.
pub fn proxy_url(scheme: &str, endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_owned()
    } else {
        format!("{scheme}://{endpoint}")
    }
}

/// Checks the configured scheme against [`PROXY_SCHEMES`].
pub fn validate_scheme(scheme: &str) -> Result<(), ConfigError> {
    if PROXY_SCHEMES.contains(&scheme) {
        Ok(())
    } else {
        Err(ConfigError::ProxyScheme(scheme.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Write;
    use std::sync::Arc;

    #[test]
    fn empty_list_is_rejected() {
        let result = ProxyRotator::<String>::new(vec![]);
        assert!(matches!(result, Err(ConfigError::EmptyProxyList)));
    }

    #[test]
    fn cycles_through_every_endpoint() {
        let endpoints = vec!["a", "b", "c", "d"];
        let rotator = ProxyRotator::new(endpoints.clone()).unwrap();

        for _ in 0..3 {
            let round: Vec<&str> = (0..endpoints.len())
                .map(|_| *rotator.next_proxy())
                .collect();
            assert_eq!(round, endpoints);
        }
    }

    #[test]
    fn single_endpoint_repeats() {
        let rotator = ProxyRotator::new(vec![1]).unwrap();
        assert_eq!(*rotator.next_proxy(), 1);
        assert_eq!(*rotator.next_proxy(), 1);
    }

    #[test]
    fn concurrent_callers_share_the_cycle() {
        let rotator = Arc::new(ProxyRotator::new((0..7).collect::<Vec<u32>>()).unwrap());
        let threads: Vec<_> = (0..7)
            .map(|_| {
                let rotator = Arc::clone(&rotator);
                std::thread::spawn(move || (0..100).map(|_| *rotator.next_proxy()).collect::<Vec<_>>())
            })
            .collect();

        let mut counts = [0usize; 7];
        for handle in threads {
            for picked in handle.join().unwrap() {
                counts[picked as usize] += 1;
            }
        }
        // 700 calls over 7 proxies: a lost or doubled update would skew this.
        assert!(counts.iter().all(|&c| c == 100), "{counts:?}");
    }

    #[test]
    fn try_map_keeps_order() {
        let rotator = ProxyRotator::new(vec!["1", "2", "3"]).unwrap();
        let mapped = rotator
            .try_map(|s| s.parse::<u8>())
            .unwrap();
        assert_eq!(*mapped.next_proxy(), 1);
        assert_eq!(*mapped.next_proxy(), 2);
        assert_eq!(*mapped.next_proxy(), 3);
    }

    #[test]
    fn parse_skips_blanks_and_comments() {
        let endpoints = parse_endpoints("1.1.1.1:80\n\n# spare\n  2.2.2.2:3128  \n");
        assert_eq!(endpoints, vec!["1.1.1.1:80", "2.2.2.2:3128"]);
    }

    #[tokio::test]
    async fn load_endpoints_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "10.0.0.1:1080\n10.0.0.2:1080").unwrap();

        let rotator = load_endpoints(file.path()).await.unwrap();
        let seen: HashSet<String> = (0..2).map(|_| rotator.next_proxy().clone()).collect();
        assert_eq!(rotator.len(), 2);
        assert!(seen.contains("10.0.0.1:1080") && seen.contains("10.0.0.2:1080"));
    }

    #[tokio::test]
    async fn load_endpoints_from_empty_file_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = load_endpoints(file.path()).await;
        assert!(matches!(result, Err(ConfigError::EmptyProxyList)));
    }

    #[tokio::test]
    async fn load_endpoints_missing_file_fails() {
        let result = load_endpoints(Path::new("/definitely/not/here.txt")).await;
        assert!(matches!(result, Err(ConfigError::ProxyFile { .. })));
    }

    #[test]
    fn proxy_url_adds_scheme() {
        assert_eq!(proxy_url("socks5", "1.2.3.4:1080"), "socks5://1.2.3.4:1080");
        assert_eq!(proxy_url("http", "https://p.example:8443"), "https://p.example:8443");
    }

    #[test]
    fn schemes_are_checked() {
        assert!(validate_scheme("socks5h").is_ok());
        assert!(matches!(validate_scheme("ftp"), Err(ConfigError::ProxyScheme(_))));
    }
}
