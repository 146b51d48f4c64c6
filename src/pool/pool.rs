//! Bounded multi-node connection pool.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::net::{Connection, Connector, Node};
use crate::pool::select::NodeSelector;

/// Shared pool state. Guards hold this, never the outer `ConnectionPool`,
/// so there is no ownership cycle between pool and transports.
struct PoolInner {
    nodes: Vec<Arc<Node>>,
    connector: Arc<dyn Connector>,
    selector: NodeSelector,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: Duration,
    connect_timeout: Duration,
    /// Idle connections per node index. Only multi-writer state besides the
    /// semaphore; held briefly for push/pop only.
    idle: Mutex<Vec<VecDeque<Arc<Connection>>>>,
    closed: AtomicBool,
}

/// Bounded set of reusable connections across one or more backend nodes.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Build a pool over `nodes`. Size and node list are validated eagerly.
    pub fn new(
        nodes: Vec<Node>,
        connector: Arc<dyn Connector>,
        config: &PoolConfig,
    ) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::InvalidConfiguration(
                "pool requires at least one node".to_string(),
            ));
        }
        if config.max_connections == 0 {
            return Err(Error::InvalidConfiguration(
                "pool max_connections must be positive".to_string(),
            ));
        }

        let nodes: Vec<Arc<Node>> = nodes.into_iter().map(Arc::new).collect();
        let idle = Mutex::new(nodes.iter().map(|_| VecDeque::new()).collect());
        Ok(Self {
            inner: Arc::new(PoolInner {
                selector: NodeSelector::new(config.strategy),
                semaphore: Arc::new(Semaphore::new(config.max_connections)),
                capacity: config.max_connections,
                acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
                connect_timeout: Duration::from_millis(config.connect_timeout_ms),
                nodes,
                connector,
                idle,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Eagerly establish up to `count` connections, distributed across the
    /// configured nodes. Fails only when no node is reachable at all.
    pub async fn prepare(&self, count: usize) -> Result<usize> {
        let inner = &self.inner;
        let target = count.min(inner.capacity);
        let mut established = 0usize;

        for i in 0..target {
            let node_index = i % inner.nodes.len();
            let node = inner.nodes[node_index].clone();
            match timeout(inner.connect_timeout, inner.connector.connect(node.clone())).await {
                Ok(Ok(conn)) => {
                    tracing::debug!(connection_id = %conn.id(), node = %node, "Prepared connection");
                    let mut idle = inner.idle.lock().expect("idle lock poisoned");
                    idle[node_index].push_back(Arc::new(conn));
                    established += 1;
                }
                Ok(Err(e)) => {
                    tracing::warn!(node = %node, error = %e, "Prepare connect failed");
                }
                Err(_) => {
                    tracing::warn!(node = %node, timeout = ?inner.connect_timeout, "Prepare connect timed out");
                }
            }
        }

        if established == 0 && target > 0 {
            return Err(Error::PoolInitialization { attempted: target });
        }
        Ok(established)
    }

    /// Acquire a connection, waiting up to the configured acquisition
    /// timeout for a permit. The returned guard owns the connection
    /// exclusively until dropped.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(Error::PoolClosed);
        }

        let permit = match timeout(
            inner.acquire_timeout,
            inner.semaphore.clone().acquire_owned(),
        )
        .await
        {
            // Timed out before a permit was granted; nothing to release.
            Err(_) => return Err(Error::AcquireTimeout(inner.acquire_timeout)),
            // Semaphore closed by `close()`.
            Ok(Err(_)) => return Err(Error::PoolClosed),
            Ok(Ok(permit)) => permit,
        };

        if inner.closed.load(Ordering::SeqCst) {
            return Err(Error::PoolClosed);
        }

        let node_index = inner.selector.next(inner.nodes.len());
        let node = inner.nodes[node_index].clone();

        // Reuse an idle connection for this node, skipping any the peer has
        // closed in the meantime.
        loop {
            let reused = {
                let mut idle = inner.idle.lock().expect("idle lock poisoned");
                idle[node_index].pop_front()
            };
            match reused {
                Some(conn) if conn.is_closed() => {
                    tracing::debug!(connection_id = %conn.id(), "Dropping stale idle connection");
                    continue;
                }
                Some(conn) => {
                    return Ok(PooledConnection::new(conn, node_index, self.inner.clone(), permit));
                }
                None => break,
            }
        }

        match timeout(inner.connect_timeout, inner.connector.connect(node.clone())).await {
            Ok(Ok(conn)) => {
                tracing::debug!(connection_id = %conn.id(), node = %node, "Established connection");
                Ok(PooledConnection::new(
                    Arc::new(conn),
                    node_index,
                    self.inner.clone(),
                    permit,
                ))
            }
            // The permit is dropped here, releasing capacity exactly once.
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Connect {
                node: node.to_string(),
                reason: format!("connect timed out after {:?}", inner.connect_timeout),
            }),
        }
    }

    /// Drain and close every idle connection, release all permits, and make
    /// subsequent `acquire` calls fail fast. Connections still acquired are
    /// discarded when their guards drop.
    pub fn close(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.semaphore.close();
        let mut idle = inner.idle.lock().expect("idle lock poisoned");
        for queue in idle.iter_mut() {
            for conn in queue.drain(..) {
                conn.mark_closed();
            }
        }
        tracing::info!("Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Permits currently available; equals capacity when nothing is acquired.
    pub fn available_permits(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Idle connections currently pooled, across all nodes.
    pub fn idle_count(&self) -> usize {
        let idle = self.inner.idle.lock().expect("idle lock poisoned");
        idle.iter().map(|q| q.len()).sum()
    }
}

/// RAII guard over an acquired connection.
///
/// Dropping the guard returns a usable connection to the idle set, or
/// discards it if it was flagged or the peer closed it. The semaphore permit
/// is released exactly once in either case; a guard cannot be released twice.
pub struct PooledConnection {
    connection: Option<Arc<Connection>>,
    node_index: usize,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
    discard: bool,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("capacity", &self.inner.capacity)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("node_index", &self.node_index)
            .field("discard", &self.discard)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    fn new(
        connection: Arc<Connection>,
        node_index: usize,
        inner: Arc<PoolInner>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            connection: Some(connection),
            node_index,
            inner,
            _permit: permit,
            discard: false,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        self.connection
            .as_ref()
            .expect("connection present until drop")
    }

    pub fn node(&self) -> &Arc<Node> {
        self.connection().node()
    }

    /// Flag the connection for discard instead of reuse; `release(conn,
    /// should_close=true)` in pool terms. Takes effect when the guard drops.
    pub fn mark_discard(&mut self) {
        self.discard = true;
    }

    /// Consume the guard, discarding the connection and freeing its permit.
    pub fn discard(mut self) {
        self.discard = true;
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            let reusable = !self.discard
                && !conn.is_closed()
                && !self.inner.closed.load(Ordering::SeqCst);
            if reusable {
                let mut idle = self.inner.idle.lock().expect("idle lock poisoned");
                idle[self.node_index].push_back(conn);
            } else {
                tracing::debug!(connection_id = %conn.id(), "Discarding connection");
                conn.mark_closed();
            }
        }
        // _permit drops after this, releasing pool capacity exactly once.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Protocol, WireEvent, WireRequest};
    use crate::pool::select::SelectionStrategy;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use tokio::sync::mpsc;

    /// Connector yielding connections whose peer side is immediately dropped.
    struct DummyConnector;

    impl Connector for DummyConnector {
        fn connect(&self, node: Arc<Node>) -> BoxFuture<'static, Result<Connection>> {
            async move {
                let (out_tx, out_rx) = mpsc::channel::<WireRequest>(8);
                let (_in_tx, in_rx) = mpsc::channel::<WireEvent>(8);
                // Keep the outbound receiver alive with the connection's
                // lifetime so sends do not observe a closed channel.
                tokio::spawn(async move {
                    let mut rx = out_rx;
                    while rx.recv().await.is_some() {}
                });
                Ok(Connection::new(node, out_tx, in_rx))
            }
            .boxed()
        }
    }

    fn nodes(n: usize) -> Vec<Node> {
        (0..n)
            .map(|i| Node::new("127.0.0.1", 9000 + i as u16, Protocol::Http1, false))
            .collect()
    }

    fn config(max: usize) -> PoolConfig {
        PoolConfig {
            max_connections: max,
            acquire_timeout_ms: 200,
            connect_timeout_ms: 200,
            strategy: SelectionStrategy::RoundRobin,
        }
    }

    #[test]
    fn rejects_empty_nodes_and_zero_capacity() {
        let err = ConnectionPool::new(vec![], Arc::new(DummyConnector), &config(4)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));

        let err = ConnectionPool::new(nodes(1), Arc::new(DummyConnector), &config(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn acquire_release_reuses_connection() {
        let pool = ConnectionPool::new(nodes(1), Arc::new(DummyConnector), &config(2)).unwrap();

        let guard = pool.acquire().await.unwrap();
        let id = guard.connection().id();
        assert_eq!(pool.available_permits(), 1);
        drop(guard);
        assert_eq!(pool.available_permits(), 2);
        assert_eq!(pool.idle_count(), 1);

        let guard = pool.acquire().await.unwrap();
        assert_eq!(guard.connection().id(), id, "idle connection reused");
    }

    #[tokio::test]
    async fn capacity_blocks_and_times_out() {
        let pool = ConnectionPool::new(nodes(1), Arc::new(DummyConnector), &config(1)).unwrap();
        let _held = pool.acquire().await.unwrap();

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, Error::AcquireTimeout(_)));
        // The timed-out attempt must not have consumed the permit.
        drop(_held);
        assert_eq!(pool.available_permits(), 1);
    }

    #[tokio::test]
    async fn discard_frees_capacity_without_pooling() {
        let pool = ConnectionPool::new(nodes(1), Arc::new(DummyConnector), &config(1)).unwrap();
        let guard = pool.acquire().await.unwrap();
        guard.discard();
        assert_eq!(pool.available_permits(), 1);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn close_fails_fast() {
        let pool = ConnectionPool::new(nodes(1), Arc::new(DummyConnector), &config(1)).unwrap();
        pool.prepare(1).await.unwrap();
        pool.close();

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, Error::PoolClosed));
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn round_robin_distribution_is_fair() {
        let pool = ConnectionPool::new(nodes(2), Arc::new(DummyConnector), &config(1)).unwrap();
        let mut per_node = [0usize; 2];

        for _ in 0..1000 {
            let guard = pool.acquire().await.unwrap();
            let port = guard.node().port;
            per_node[(port - 9000) as usize] += 1;
        }

        // ±50% of M/N tolerance.
        for count in per_node {
            assert!((250..=750).contains(&count), "distribution skewed: {:?}", per_node);
        }
    }
}
