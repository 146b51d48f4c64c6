//! Error definitions shared across the crate.
//!
//! # Design Decisions
//! - One taxonomy for the whole stack; callers match on variants to decide
//!   whether an error is recoverable (acquisition timeout), local to one
//!   exchange (exchange timeout), or transport-fatal (connection failure)
//! - Errors are `Clone` so a transport-fatal cause can be delivered to every
//!   outstanding waiter
//! - Invalid configuration is rejected at construction, never at use time

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the pool, transports, orchestrator, and sequencer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Eager pool setup could not reach any configured node.
    #[error("pool initialization failed: none of {attempted} node(s) reachable")]
    PoolInitialization { attempted: usize },

    /// No connection became available within the acquisition timeout.
    /// Recoverable; the caller may retry acquisition.
    #[error("connection acquisition timed out after {0:?}")]
    AcquireTimeout(Duration),

    /// The pool has been closed; acquisitions fail fast.
    #[error("connection pool is closed")]
    PoolClosed,

    /// Establishing a connection to a node failed.
    #[error("failed to connect to {node}: {reason}")]
    Connect { node: String, reason: String },

    /// The peer never advertised its settings within the handshake timeout.
    /// Transport-fatal: all pending and future exchanges on the transport fail.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// A single exchange was not fulfilled in time. Local to that exchange;
    /// siblings on the same transport are unaffected.
    #[error("exchange {correlation_id} timed out after {elapsed:?}")]
    ExchangeTimeout { correlation_id: u64, elapsed: Duration },

    /// The underlying connection broke. Transport-fatal: every outstanding
    /// exchange is completed with this error and the connection is discarded
    /// rather than returned to the pool.
    #[error("connection failed: {0}")]
    ConnectionFailure(String),

    /// Redirect following stopped after the configured maximum hop count.
    #[error("redirect limit of {max_hops} exceeded following {uri}")]
    RedirectLoopExceeded { uri: String, max_hops: u32 },

    /// Bad construction-time parameters (backoff shape, pool size, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The server-side pipeline queue is full. Connection-fatal by policy:
    /// the connection is closed rather than buffering unboundedly.
    #[error("pipeline capacity {capacity} exceeded")]
    PipelineOverflow { capacity: usize },

    /// A correlation id was reused before the prior exchange retired.
    #[error("correlation id {0} already has a pending exchange")]
    DuplicateCorrelation(u64),
}

impl Error {
    /// True for failures that invalidate the whole transport, not just one
    /// exchange.
    pub fn is_transport_fatal(&self) -> bool {
        matches!(
            self,
            Error::HandshakeTimeout(_) | Error::ConnectionFailure(_)
        )
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
