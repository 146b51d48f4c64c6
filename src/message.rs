//! Generic HTTP message representation.
//!
//! # Responsibilities
//! - Carry the parts of a request/response the lifecycle layer needs:
//!   method, URI, headers, body bytes, parsed cookies, redirect hop count
//! - Stay codec-agnostic: frame translation to/from these types is an
//!   external collaborator
//!
//! # Design Decisions
//! - Built on the `http` crate types rather than hand-rolled enums
//! - Cookies cross the codec seam already parsed; header syntax is out of scope

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};

use crate::cookie::Cookie;

/// An outgoing request as seen by the lifecycle layer.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Cookies explicitly attached to this request (merged with jar matches
    /// at dispatch time).
    pub cookies: Vec<Cookie>,
    /// Redirect hops already taken by this logical request.
    pub redirect_hops: u32,
}

impl Request {
    /// Create a request with an empty body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            cookies: Vec::new(),
            redirect_hops: 0,
        }
    }

    /// Shorthand for a GET request.
    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Attach a header, replacing any existing value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a body.
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Attach a request-scoped cookie.
    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// True when the request targets a secure scheme.
    pub fn is_secure(&self) -> bool {
        self.uri.scheme_str() == Some("https")
    }
}

/// A completed response as delivered to a waiting exchange.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Cookies the peer set on this response, already parsed by the codec.
    pub cookies: Vec<Cookie>,
}

impl Response {
    /// Create a response with the given status and no headers or body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            cookies: Vec::new(),
        }
    }

    /// Attach a body.
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Attach a header, replacing any existing value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a cookie set by the peer.
    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// The `Location` header as a string, if present and valid UTF-8.
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(http::header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }
}
