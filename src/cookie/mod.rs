//! Cookie values and the persistent cookie jar.
//!
//! # Data Flow
//! ```text
//! Response with set-cookie (parsed by the codec collaborator)
//!     → jar.rs (store, bounded LRU)
//! Outgoing request
//!     → Cookie::matches (domain suffix, path prefix, secure rule)
//!     → matching entries attached to the request
//! ```
//!
//! # Design Decisions
//! - Cookie header syntax is out of scope; only parsed values cross the seam
//! - Secure cookies attach only to secure requests; non-secure cookies attach
//!   to either scheme (deliberate compatibility choice, matched to common
//!   browser behavior)

pub mod jar;

pub use jar::CookieJar;

use http::Uri;

/// A single cookie value with its matching attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Domain suffix this cookie applies to; empty matches every host.
    pub domain: String,
    /// Path prefix this cookie applies to.
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// Lifetime in seconds; `Some(0)` expires the cookie immediately.
    pub max_age: Option<u64>,
}

impl Cookie {
    /// Create a cookie matching every host and path, non-secure.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            max_age: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Decide whether this cookie is attached to a request for `uri`.
    ///
    /// Domain matches by suffix (empty domain matches everything), path by
    /// prefix ("/" matches everything). A secure cookie is attached only to
    /// secure requests; a non-secure cookie is attached to either scheme.
    pub fn matches(&self, uri: &Uri) -> bool {
        let host = uri.host().unwrap_or("");
        if !self.domain.is_empty() && !host.ends_with(self.domain.as_str()) {
            return false;
        }

        let path = if uri.path().is_empty() { "/" } else { uri.path() };
        if self.path != "/" && !path.starts_with(self.path.as_str()) {
            return false;
        }

        let secure_request = uri.scheme_str() == Some("https");
        if self.secure && !secure_request {
            return false;
        }
        true
    }
}
