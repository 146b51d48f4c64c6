//! Connection lifecycle and exchange correlation for HTTP/1.1 and HTTP/2.
//!
//! The crate is organized leaf to root:
//!
//! - [`pool`]: a bounded, multi-node connection pool
//! - [`transport`]: per-connection transports that assign correlation ids
//!   and route responses back to waiting callers (sequential for HTTP/1.1,
//!   multiplexed for HTTP/2)
//! - [`retry`]: backoff, redirect continuation, and cookie-jar matching
//!   orchestrated over pooled transports
//! - [`server`]: the response sequencer keeping pipelined writes in
//!   request-read order
//!
//! Wire codecs, TLS, DNS, and routing are external collaborators consumed
//! through the narrow seams in [`net`].

pub mod config;
pub mod cookie;
pub mod error;
pub mod message;
pub mod net;
pub mod observability;
pub mod pool;
pub mod retry;
pub mod server;
pub mod transport;

pub use config::ClientConfig;
pub use cookie::{Cookie, CookieJar};
pub use error::{Error, Result};
pub use message::{Request, Response};
pub use net::{Connection, Connector, Node, Protocol};
pub use pool::{ConnectionPool, PooledConnection, SelectionStrategy};
pub use retry::{Backoff, BackoffConfig, BackoffDecision, Orchestrator};
pub use server::ResponseSequencer;
pub use transport::{ExchangeHandle, Transport};
