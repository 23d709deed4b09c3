//! Proxy identity and pool entries.

use std::fmt;
use std::str::FromStr;

use url::Url;

/// Protocol spoken by a proxy endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
    Http,
    Https,
    Socks,
}

impl ProxyScheme {
    /// URL scheme used when handing the proxy to an HTTP client.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
            ProxyScheme::Socks => "socks5",
        }
    }
}

impl FromStr for ProxyScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyScheme::Http),
            "https" => Ok(ProxyScheme::Https),
            "socks" | "socks5" | "socks5h" => Ok(ProxyScheme::Socks),
            other => Err(format!("unsupported proxy protocol `{other}`")),
        }
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a proxy. Two descriptors with the same scheme, host and port
/// are the same proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyDescriptor {
    scheme: ProxyScheme,
    host: String,
    port: u16,
}

impl ProxyDescriptor {
    pub fn new(scheme: ProxyScheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    pub fn scheme(&self) -> ProxyScheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, the form written into the system proxy server setting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full proxy URL, e.g. `http://127.0.0.1:8080`.
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Convert the descriptor to a reqwest::Proxy routing all traffic through it.
    pub fn to_reqwest_proxy(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        reqwest::Proxy::all(self.url())
    }
}

impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for ProxyDescriptor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s.trim()).map_err(|e| format!("invalid proxy url `{s}`: {e}"))?;
        let scheme = url.scheme().parse::<ProxyScheme>()?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| format!("proxy url `{s}` has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| format!("proxy url `{s}` has no port"))?;
        Ok(Self::new(scheme, host, port))
    }
}

/// Display band of an entry, derived from its score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Score of 30 or below.
    Good,
    /// Between the other two bands.
    Fair,
    /// Score of 60 or above.
    Poor,
}

/// A proxy together with its current score. Lower scores rank first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub descriptor: ProxyDescriptor,
    pub score: u32,
}

impl PoolEntry {
    pub fn new(descriptor: ProxyDescriptor, score: u32) -> Self {
        Self { descriptor, score }
    }

    pub fn health(&self) -> Health {
        match self.score {
            0..=30 => Health::Good,
            60.. => Health::Poor,
            _ => Health::Fair,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_equality_is_structural() {
        let a = ProxyDescriptor::new(ProxyScheme::Http, "1.2.3.4", 8080);
        let b = ProxyDescriptor::new(ProxyScheme::Http, "1.2.3.4", 8080);
        let c = ProxyDescriptor::new(ProxyScheme::Https, "1.2.3.4", 8080);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn parses_proxy_urls() {
        let d: ProxyDescriptor = "HTTP://10.0.0.1:3128".parse().unwrap();
        assert_eq!(d, ProxyDescriptor::new(ProxyScheme::Http, "10.0.0.1", 3128));
        assert_eq!(d.address(), "10.0.0.1:3128");
        assert_eq!(d.url(), "http://10.0.0.1:3128");

        let s: ProxyDescriptor = "socks5://127.0.0.1:1080".parse().unwrap();
        assert_eq!(s.scheme(), ProxyScheme::Socks);
        assert_eq!(s.to_string(), "socks5://127.0.0.1:1080");

        // default port filled in for known schemes
        let p: ProxyDescriptor = "http://example.com".parse().unwrap();
        assert_eq!(p.port(), 80);
    }

    #[test]
    fn rejects_unknown_schemes_and_missing_ports() {
        assert!("ftp://1.2.3.4:21".parse::<ProxyDescriptor>().is_err());
        assert!("socks5://1.2.3.4".parse::<ProxyDescriptor>().is_err());
        assert!("not a url".parse::<ProxyDescriptor>().is_err());
    }

    #[test]
    fn health_bands() {
        let d = ProxyDescriptor::new(ProxyScheme::Http, "h", 1);
        assert_eq!(PoolEntry::new(d.clone(), 0).health(), Health::Good);
        assert_eq!(PoolEntry::new(d.clone(), 30).health(), Health::Good);
        assert_eq!(PoolEntry::new(d.clone(), 50).health(), Health::Fair);
        assert_eq!(PoolEntry::new(d.clone(), 60).health(), Health::Poor);
        assert_eq!(PoolEntry::new(d, 90).health(), Health::Poor);
    }
}
