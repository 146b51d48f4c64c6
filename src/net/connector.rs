//! Pluggable connection establishment.

use futures_util::future::BoxFuture;
use std::sync::Arc;

use crate::error::Result;
use crate::net::connection::Connection;
use crate::net::node::Node;

/// Dials a node and yields an established connection.
///
/// This is the seam for the TCP/TLS collaborators: implementations are
/// expected to have completed any secure-channel setup before resolving, so
/// the transport can begin its handshake gate immediately. Tests plug in
/// scripted in-memory connectors.
pub trait Connector: Send + Sync {
    fn connect(&self, node: Arc<Node>) -> BoxFuture<'static, Result<Connection>>;
}

impl<F> Connector for F
where
    F: Fn(Arc<Node>) -> BoxFuture<'static, Result<Connection>> + Send + Sync,
{
    fn connect(&self, node: Arc<Node>) -> BoxFuture<'static, Result<Connection>> {
        (self)(node)
    }
}
