use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::{Host, Url};

use super::{CollaboratorError, CollaboratorResult, SpecFetcher};

/// HTTP(S) fetcher for remote specifications.
///
/// Requests are refused when the target resolves to a non-public address,
/// redirects are not followed, and bodies larger than `max_bytes` are
/// rejected both up front (`Content-Length`) and while streaming.
#[derive(Debug, Clone)]
pub struct HttpSpecFetcher {
    max_bytes: usize,
    timeout: Duration,
}

impl HttpSpecFetcher {
    pub fn new(max_bytes: usize, timeout: Duration) -> Self {
        Self { max_bytes, timeout }
    }

    /// Validate the URL and resolve it to a single public address
    async fn resolve_public(&self, url: &Url) -> CollaboratorResult<(String, SocketAddr)> {
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(CollaboratorError::Network(format!(
                    "unsupported URL scheme: {}",
                    other
                )))
            }
        }

        let port = url
            .port_or_known_default()
            .ok_or_else(|| CollaboratorError::Network("URL has no port".into()))?;

        match url.host() {
            Some(Host::Ipv4(ip)) => {
                let addr = SocketAddr::new(IpAddr::V4(ip), port);
                ensure_public(addr.ip())?;
                Ok((ip.to_string(), addr))
            }
            Some(Host::Ipv6(ip)) => {
                let addr = SocketAddr::new(IpAddr::V6(ip), port);
                ensure_public(addr.ip())?;
                Ok((ip.to_string(), addr))
            }
            Some(Host::Domain(domain)) => {
                let domain = domain.trim_end_matches('.').to_ascii_lowercase();
                if domain == "localhost" || domain.ends_with(".localhost") {
                    return Err(CollaboratorError::Network(format!(
                        "refusing to fetch from {}",
                        domain
                    )));
                }
                let addrs: Vec<SocketAddr> = tokio::net::lookup_host((domain.as_str(), port))
                    .await
                    .map_err(|e| {
                        CollaboratorError::Network(format!("cannot resolve {}: {}", domain, e))
                    })?
                    .collect();
                if addrs.is_empty() {
                    return Err(CollaboratorError::Network(format!(
                        "{} did not resolve to any address",
                        domain
                    )));
                }
                for addr in &addrs {
                    ensure_public(addr.ip())?;
                }
                Ok((domain, addrs[0]))
            }
            None => Err(CollaboratorError::Network("URL has no host".into())),
        }
    }
}

#[async_trait]
impl SpecFetcher for HttpSpecFetcher {
    async fn fetch(&self, url: &str) -> CollaboratorResult<String> {
        let parsed = Url::parse(url)
            .map_err(|e| CollaboratorError::Network(format!("invalid URL {}: {}", url, e)))?;
        let (host, addr) = self.resolve_public(&parsed).await?;
        debug!("Fetching specification from {} via {}", url, addr);

        // Pin the connection to the address that was checked.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(self.timeout)
            .resolve(&host, addr)
            .build()
            .map_err(|e| CollaboratorError::Network(e.to_string()))?;

        let mut response = client
            .get(parsed)
            .send()
            .await
            .map_err(|e| CollaboratorError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Network(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(size_error(self.max_bytes));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| CollaboratorError::Network(e.to_string()))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                warn!("Aborting download of {}: body exceeds {} bytes", url, self.max_bytes);
                return Err(size_error(self.max_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        String::from_utf8(body)
            .map_err(|_| CollaboratorError::Parse(format!("{} is not valid UTF-8", url)))
    }
}

fn size_error(max_bytes: usize) -> CollaboratorError {
    CollaboratorError::Network(format!("specification exceeds {} bytes", max_bytes))
}

fn ensure_public(ip: IpAddr) -> CollaboratorResult<()> {
    if is_public(ip) {
        Ok(())
    } else {
        Err(CollaboratorError::Network(format!(
            "refusing to fetch from non-public address {}",
            ip
        )))
    }
}

fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    let shared = a == 100 && (64..128).contains(&b);
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_documentation()
        || shared
        || a == 0)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    let documentation = first == 0x2001 && ip.segments()[1] == 0x0db8;
    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || unique_local
        || link_local
        || documentation)
}
