//! HTTP/2 transport: multiplexed concurrent exchanges over one connection.

use arc_swap::ArcSwapOption;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::net::{Connection, PeerSettings, WireEvent, WireRequest};
use crate::pool::PooledConnection;
use crate::transport::exchange::{CorrelationIds, ExchangeHandle, ExchangeMap};

struct Shared {
    connection: Arc<Connection>,
    exchanges: Arc<ExchangeMap>,
    ids: CorrelationIds,
    /// Peer-advertised settings; swapped in place whenever the peer sends an
    /// update, without disturbing in-flight exchanges.
    settings: ArcSwapOption<PeerSettings>,
    /// Handshake gate: flips to true when the first settings arrive.
    handshake: watch::Sender<bool>,
    /// Listener for peer-initiated (pushed) responses.
    push: Mutex<Option<mpsc::Sender<Response>>>,
    failure: Mutex<Option<Error>>,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    fn failure(&self) -> Option<Error> {
        self.failure.lock().expect("failure lock poisoned").clone()
    }

    fn fail(&self, cause: Error) {
        {
            let mut failure = self.failure.lock().expect("failure lock poisoned");
            if failure.is_some() {
                return;
            }
            *failure = Some(cause.clone());
        }
        tracing::warn!(
            connection_id = %self.connection.id(),
            error = %cause,
            "Multiplexed transport failed"
        );
        self.connection.mark_closed();
        self.exchanges.fail_all(&cause);
        let _ = self.shutdown.send(true);
    }

    fn on_response(&self, correlation_id: u64, response: Response) {
        if self.exchanges.complete(correlation_id, Ok(response.clone())) {
            return;
        }
        // No matching exchange: a peer-initiated push (even ids) or a
        // response to an already-retired exchange. Route to the push
        // listener when one is registered.
        let push = self.push.lock().expect("push lock poisoned").clone();
        match push {
            Some(listener) => {
                if listener.try_send(response).is_err() {
                    tracing::warn!(
                        connection_id = %self.connection.id(),
                        correlation_id,
                        "Push listener full or gone; dropping pushed response"
                    );
                }
            }
            None => {
                tracing::debug!(
                    connection_id = %self.connection.id(),
                    correlation_id,
                    "No push listener; dropping unmatched response"
                );
            }
        }
    }

    fn on_settings(&self, settings: PeerSettings) {
        tracing::debug!(
            connection_id = %self.connection.id(),
            max_concurrent_streams = settings.max_concurrent_streams,
            "Applying peer settings"
        );
        self.settings.store(Some(Arc::new(settings)));
        // Idempotent after the first settings frame.
        let _ = self.handshake.send(true);
    }
}

/// Transport for HTTP/2 connections: many exchanges may be outstanding, one
/// per active stream; odd correlation ids are ours, even ids are the peer's.
pub struct MultiplexedTransport {
    shared: Arc<Shared>,
    pooled: Mutex<Option<PooledConnection>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl MultiplexedTransport {
    /// Take ownership of a pooled connection and start the reader task. The
    /// handshake gate stays shut until the peer advertises settings.
    pub fn new(pooled: PooledConnection) -> Self {
        let connection = Arc::clone(pooled.connection());
        let (handshake, _) = watch::channel(false);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            connection: Arc::clone(&connection),
            exchanges: ExchangeMap::new(),
            ids: CorrelationIds::multiplexed(),
            settings: ArcSwapOption::empty(),
            handshake,
            push: Mutex::new(None),
            failure: Mutex::new(None),
            shutdown,
        });

        let reader = connection.take_events().map(|events| {
            let shared = Arc::clone(&shared);
            tokio::spawn(read_loop(shared, events, shutdown_rx))
        });
        if reader.is_none() {
            shared.fail(Error::ConnectionFailure(format!(
                "{} event stream already claimed",
                connection.id()
            )));
        }

        Self {
            shared,
            pooled: Mutex::new(Some(pooled)),
            reader: Mutex::new(reader),
        }
    }

    /// Block until the peer's settings open the handshake gate. A timeout is
    /// transport-fatal: the transport is marked failed but does not panic,
    /// and every pending exchange is notified.
    pub async fn await_handshake(&self, limit: Duration) -> Result<()> {
        if let Some(cause) = self.shared.failure() {
            return Err(cause);
        }
        if self.shared.settings.load().is_some() {
            return Ok(());
        }

        let mut gate = self.shared.handshake.subscribe();
        let opened = timeout(limit, gate.wait_for(|open| *open)).await;
        match opened {
            Ok(Ok(_)) => Ok(()),
            // Gate sender gone means the transport was torn down.
            Ok(Err(_)) => Err(self
                .shared
                .failure()
                .unwrap_or_else(|| Error::ConnectionFailure("transport torn down".to_string()))),
            Err(_) => {
                let cause = Error::HandshakeTimeout(limit);
                self.shared.fail(cause.clone());
                Err(cause)
            }
        }
    }

    /// Peer settings, once the handshake gate has opened.
    pub fn peer_settings(&self) -> Option<Arc<PeerSettings>> {
        self.shared.settings.load_full()
    }

    /// Register the listener for peer-initiated responses. Pushed messages
    /// arriving with no listener are logged and dropped.
    pub fn subscribe_push(&self, capacity: usize) -> mpsc::Receiver<Response> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        *self.shared.push.lock().expect("push lock poisoned") = Some(tx);
        rx
    }

    /// Dispatch a request on a fresh stream. The handshake gate must be open;
    /// callers go through [`MultiplexedTransport::await_handshake`] first.
    pub async fn execute(&self, request: Request) -> Result<ExchangeHandle> {
        if let Some(cause) = self.shared.failure() {
            return Err(cause);
        }
        if self.shared.settings.load().is_none() {
            return Err(Error::ConnectionFailure(
                "handshake gate not open; await_handshake first".to_string(),
            ));
        }

        let correlation_id = self.shared.ids.next(&self.shared.exchanges);
        let handle = self
            .shared
            .exchanges
            .register(correlation_id, request.clone())?;
        // fail_all may have run between the check above and registration,
        // missing this exchange.
        if let Some(cause) = self.shared.failure() {
            self.shared
                .exchanges
                .complete(correlation_id, Err(cause.clone()));
            return Err(cause);
        }

        if let Err(e) = self
            .shared
            .connection
            .send(WireRequest {
                correlation_id,
                request,
            })
            .await
        {
            self.shared.fail(e.clone());
            return Err(e);
        }
        Ok(handle)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.exchanges.len()
    }

    pub fn is_failed(&self) -> bool {
        self.shared.failure().is_some()
    }

    /// True when an exchange was abandoned before its answer arrived. The
    /// late answer may still be in flight, so the connection is out of sync
    /// with any fresh id sequence and must not be reused.
    pub fn is_tainted(&self) -> bool {
        self.shared.exchanges.is_tainted()
    }

    /// Wait until every outstanding exchange completes; `false` when `limit`
    /// expires first.
    pub async fn await_all(&self, limit: Duration) -> bool {
        self.shared.exchanges.wait_idle(limit).await
    }

    /// Mark the transport failed and complete every outstanding exchange
    /// with `cause`.
    pub fn fail(&self, cause: Error) {
        self.shared.fail(cause);
    }

    /// Drain outstanding exchanges bounded by `grace`, stop the reader, and
    /// release the connection to its pool (discarding it if failed).
    pub async fn close(self, grace: Duration) {
        if !self.shared.exchanges.wait_idle(grace).await {
            tracing::warn!(
                connection_id = %self.shared.connection.id(),
                outstanding = self.shared.exchanges.len(),
                "Closing with exchanges still outstanding"
            );
        }
        let _ = self.shared.shutdown.send(true);
        let reader = self.reader.lock().expect("reader lock poisoned").take();
        if let Some(reader) = reader {
            let _ = reader.await;
        }

        let pooled = self.pooled.lock().expect("pooled lock poisoned").take();
        if let Some(mut pooled) = pooled {
            // A tainted connection may still deliver an answer abandoned by
            // a timed-out waiter; pooling it would let that stale response
            // fulfill a later transport's exchange under a reused id.
            if self.is_failed() || self.is_tainted() {
                pooled.mark_discard();
            }
        }
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    mut events: mpsc::Receiver<WireEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            event = events.recv() => match event {
                Some(WireEvent::Response { correlation_id, response }) => {
                    shared.on_response(correlation_id, response);
                }
                Some(WireEvent::Settings(settings)) => {
                    shared.on_settings(settings);
                }
                Some(WireEvent::Closed { reason }) => {
                    shared.fail(Error::ConnectionFailure(reason));
                    return;
                }
                None => {
                    shared.fail(Error::ConnectionFailure(format!(
                        "{} event stream ended",
                        shared.connection.id()
                    )));
                    return;
                }
            }
        }
    }
    shared.connection.restore_events(events);
}
