//! Backend node identity.

use serde::{Deserialize, Serialize};
use url::Url;

/// HTTP protocol major version a node speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTP/1.1: strictly sequential exchanges per connection.
    Http1,
    /// HTTP/2: multiplexed concurrent streams per connection.
    Http2,
}

/// One backend endpoint the pool may connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub secure: bool,
    /// Pre-calculated base URL for redirect resolution and logging.
    base_url: Url,
}

impl Node {
    pub fn new(host: impl Into<String>, port: u16, protocol: Protocol, secure: bool) -> Self {
        let host = host.into();
        let scheme = if secure { "https" } else { "http" };
        // host/port come from validated configuration, so this cannot fail
        // for any address the pool would actually be built with.
        let base_url = Url::parse(&format!("{}://{}:{}/", scheme, host, port))
            .unwrap_or_else(|_| Url::parse("http://invalid/").unwrap());
        Self {
            host,
            port,
            protocol,
            secure,
            base_url,
        }
    }

    /// Base URL of this node ("http(s)://host:port/").
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
