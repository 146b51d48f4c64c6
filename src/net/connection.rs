//! Connection handles and the codec-facing wire seam.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Carry the outbound request channel and the inbound event stream
//! - Track whether the connection is still usable
//!
//! # Design Decisions
//! - The codec collaborator delivers already-correlated messages; this module
//!   never sees raw frames
//! - The inbound event receiver is claimed exactly once, by the transport
//!   that owns the connection

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::net::node::{Node, Protocol};

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient since we only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A correlation-id-tagged request handed to the codec for serialization.
#[derive(Debug)]
pub struct WireRequest {
    pub correlation_id: u64,
    pub request: Request,
}

/// Messages the codec delivers off the wire.
#[derive(Debug)]
pub enum WireEvent {
    /// A response correlated (by the codec) to an outgoing request, or a
    /// peer-initiated push carrying an id no exchange registered.
    Response {
        correlation_id: u64,
        response: Response,
    },
    /// Peer settings; may arrive at any time, not only after connect.
    Settings(PeerSettings),
    /// The peer closed the connection or the underlying channel broke.
    Closed { reason: String },
}

/// Settings advertised by a multiplexing peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSettings {
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 100,
            initial_window_size: 65_535,
        }
    }
}

/// An established connection bound to exactly one node.
///
/// Exclusively owned by one transport while acquired; the pool holds it
/// otherwise. Exactly one of those at any time.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    node: Arc<Node>,
    outbound: mpsc::Sender<WireRequest>,
    inbound: Mutex<Option<mpsc::Receiver<WireEvent>>>,
    closed: AtomicBool,
}

impl Connection {
    /// Wrap the channel pair the connector established.
    pub fn new(
        node: Arc<Node>,
        outbound: mpsc::Sender<WireRequest>,
        inbound: mpsc::Receiver<WireEvent>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            node,
            outbound,
            inbound: Mutex::new(Some(inbound)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn protocol(&self) -> Protocol {
        self.node.protocol
    }

    /// Send a correlated request to the peer.
    ///
    /// A send onto a dead channel marks the connection closed and surfaces a
    /// connection failure.
    pub async fn send(&self, request: WireRequest) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionFailure(format!(
                "{} is closed",
                self.id
            )));
        }
        self.outbound.send(request).await.map_err(|_| {
            self.mark_closed();
            Error::ConnectionFailure(format!("{} peer went away", self.id))
        })
    }

    /// Claim the inbound event stream. Returns `None` on the second call;
    /// only the owning transport's reader task may consume events.
    pub fn take_events(&self) -> Option<mpsc::Receiver<WireEvent>> {
        self.inbound.lock().expect("inbound lock poisoned").take()
    }

    /// Hand the inbound event stream back, making the connection usable by a
    /// future transport. Called by a transport's reader task on graceful
    /// shutdown.
    pub fn restore_events(&self, receiver: mpsc::Receiver<WireEvent>) {
        *self.inbound.lock().expect("inbound lock poisoned") = Some(receiver);
    }

    /// Mark the connection unusable. It will be discarded, not pooled.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.outbound.is_closed()
    }
}
