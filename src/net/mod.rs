//! Networking seam: nodes, connection handles, and the connector trait.
//!
//! # Data Flow
//! ```text
//! ConnectionPool
//!     → connector.rs (dial a Node; TCP + TLS are collaborator concerns)
//!     → connection.rs (Connection handle: outbound WireRequest sender,
//!        inbound WireEvent receiver claimed once by the owning transport)
//! ```
//!
//! # Design Decisions
//! - The codec collaborator is represented by correlation-id-tagged
//!   `WireRequest`/`WireEvent` messages, not raw frames
//! - Per-connection state lives in the Connection handle itself; no ambient
//!   or global connection registry

pub mod connection;
pub mod connector;
pub mod node;

pub use connection::{Connection, ConnectionId, PeerSettings, WireEvent, WireRequest};
pub use connector::Connector;
pub use node::{Node, Protocol};
