//! Request dispatch and response correlation.
//!
//! # Data Flow
//! ```text
//! Caller request
//!     → Transport::execute
//!         → exchange.rs (allocate correlation id, register PendingExchange)
//!         → WireRequest sent on the owned connection
//!     → reader task (per transport) consumes WireEvents:
//!         response  → ExchangeMap::complete → caller's handle resolves
//!         settings  → multiplexed.rs applies without disrupting in-flight
//!         closed    → fail(cause) fans out to every pending exchange
//! ```
//!
//! # Design Decisions
//! - HTTP/1.1 vs HTTP/2 is a tagged union over two concrete transports, not a
//!   class hierarchy; the protocol negotiated for the node picks the variant
//! - One oneshot result channel per exchange replaces callback slots; push
//!   messages ride a separate, explicitly-typed channel
//! - Sequential transports queue while an exchange is in flight (see
//!   `SequentialTransport::execute`); multiplexed transports dispatch freely

pub mod exchange;
pub mod multiplexed;
pub mod sequential;

pub use exchange::{ExchangeHandle, ExchangeMap};
pub use multiplexed::MultiplexedTransport;
pub use sequential::SequentialTransport;

use std::time::Duration;

use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::net::Protocol;
use crate::pool::{ConnectionPool, PooledConnection};

/// A transport owning one pooled connection, selected by the node's
/// negotiated protocol version.
pub enum Transport {
    Sequential(SequentialTransport),
    Multiplexed(MultiplexedTransport),
}

impl Transport {
    /// Acquire a connection from the pool and wrap it in the transport
    /// variant matching the node's protocol. For HTTP/2 the caller must still
    /// open the handshake gate via [`Transport::await_handshake`] before
    /// dispatching requests.
    pub async fn connect(pool: &ConnectionPool) -> Result<Self> {
        let pooled = pool.acquire().await?;
        Ok(Self::from_pooled(pooled))
    }

    /// Wrap an already-acquired connection.
    pub fn from_pooled(pooled: PooledConnection) -> Self {
        match pooled.connection().protocol() {
            Protocol::Http1 => Transport::Sequential(SequentialTransport::new(pooled)),
            Protocol::Http2 => Transport::Multiplexed(MultiplexedTransport::new(pooled)),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Transport::Sequential(_) => Protocol::Http1,
            Transport::Multiplexed(_) => Protocol::Http2,
        }
    }

    /// Block until the peer's settings arrive (multiplexed only; sequential
    /// transports have no handshake gate and return immediately).
    pub async fn await_handshake(&self, limit: Duration) -> Result<()> {
        match self {
            Transport::Sequential(_) => Ok(()),
            Transport::Multiplexed(t) => t.await_handshake(limit).await,
        }
    }

    /// Dispatch a request, returning a handle the caller can wait on.
    pub async fn execute(&self, request: Request) -> Result<ExchangeHandle> {
        match self {
            Transport::Sequential(t) => t.execute(request).await,
            Transport::Multiplexed(t) => t.execute(request).await,
        }
    }

    /// Dispatch and wait, mapping the response before returning it. The
    /// asynchronous entry point with a response mapper.
    pub async fn execute_map<T>(
        &self,
        request: Request,
        limit: Duration,
        mapper: impl FnOnce(Response) -> T,
    ) -> Result<T> {
        let handle = self.execute(request).await?;
        handle.wait(limit).await.map(mapper)
    }

    /// Number of exchanges awaiting completion.
    pub fn pending_count(&self) -> usize {
        match self {
            Transport::Sequential(t) => t.pending_count(),
            Transport::Multiplexed(t) => t.pending_count(),
        }
    }

    pub fn is_failed(&self) -> bool {
        match self {
            Transport::Sequential(t) => t.is_failed(),
            Transport::Multiplexed(t) => t.is_failed(),
        }
    }

    /// True when an exchange was abandoned (timed out) before its answer
    /// arrived. The connection may deliver that answer later, so it is
    /// discarded on close instead of returned to the pool.
    pub fn is_tainted(&self) -> bool {
        match self {
            Transport::Sequential(t) => t.is_tainted(),
            Transport::Multiplexed(t) => t.is_tainted(),
        }
    }

    /// Wait until every outstanding exchange is fulfilled; `false` when the
    /// grace period expires first.
    pub async fn await_all(&self, limit: Duration) -> bool {
        match self {
            Transport::Sequential(t) => t.await_all(limit).await,
            Transport::Multiplexed(t) => t.await_all(limit).await,
        }
    }

    /// Mark the transport failed, completing every outstanding exchange with
    /// `cause`.
    pub fn fail(&self, cause: Error) {
        match self {
            Transport::Sequential(t) => t.fail(cause),
            Transport::Multiplexed(t) => t.fail(cause),
        }
    }

    /// Drain outstanding exchanges (bounded by `grace`), then release the
    /// connection back to its pool; a failed transport discards it instead.
    pub async fn close(self, grace: Duration) {
        match self {
            Transport::Sequential(t) => t.close(grace).await,
            Transport::Multiplexed(t) => t.close(grace).await,
        }
    }
}
