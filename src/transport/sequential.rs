//! HTTP/1.1 transport: strictly sequential exchanges.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::net::{Connection, WireEvent, WireRequest};
use crate::pool::PooledConnection;
use crate::transport::exchange::{CorrelationIds, ExchangeHandle, ExchangeMap};

#[derive(Debug, Default)]
struct DispatchState {
    /// Correlation id currently on the wire, if any.
    inflight: Option<u64>,
    /// Requests waiting for the wire to free up, oldest first.
    queue: VecDeque<WireRequest>,
}

struct Shared {
    connection: Arc<Connection>,
    exchanges: Arc<ExchangeMap>,
    ids: CorrelationIds,
    state: AsyncMutex<DispatchState>,
    failure: Mutex<Option<Error>>,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    fn failure(&self) -> Option<Error> {
        self.failure.lock().expect("failure lock poisoned").clone()
    }

    /// Fan the cause out to every pending and queued exchange, once.
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
            "Sequential transport failed"
        );
        self.connection.mark_closed();
        self.exchanges.fail_all(&cause);
        let _ = self.shutdown.send(true);
    }

    async fn on_response(self: &Arc<Self>, correlation_id: u64, response: Response) {
        if !self.exchanges.complete(correlation_id, Ok(response)) {
            // The waiter may have timed out and retired the exchange, or no
            // request of ours ever carried this id; HTTP/1.1 has no push
            // concept, so either way the payload is dropped.
            tracing::debug!(
                connection_id = %self.connection.id(),
                correlation_id,
                "Dropping response with no pending exchange"
            );
        }

        // When this answered the in-flight exchange the wire is free again;
        // dispatch the next queued request.
        let next = {
            let mut state = self.state.lock().await;
            if state.inflight == Some(correlation_id) {
                state.inflight = None;
            }
            if state.inflight.is_none() {
                match state.queue.pop_front() {
                    Some(wire) => {
                        state.inflight = Some(wire.correlation_id);
                        Some(wire)
                    }
                    None => None,
                }
            } else {
                None
            }
        };
        if let Some(wire) = next {
            if let Err(e) = self.connection.send(wire).await {
                self.fail(e);
            }
        }
    }
}

/// Transport for HTTP/1.1 connections: at most one exchange is outstanding
/// on the wire at a time, matching the protocol's non-multiplexed nature.
pub struct SequentialTransport {
    shared: Arc<Shared>,
    pooled: Mutex<Option<PooledConnection>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SequentialTransport {
    /// Take ownership of a pooled connection and start the reader task.
    pub fn new(pooled: PooledConnection) -> Self {
        let connection = Arc::clone(pooled.connection());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            connection: Arc::clone(&connection),
            exchanges: ExchangeMap::new(),
            ids: CorrelationIds::sequential(),
            state: AsyncMutex::new(DispatchState::default()),
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

    /// Dispatch a request. If an exchange is already in flight the request is
    /// queued and sent when its predecessor completes; the pending exchange's
    /// identity is never overwritten.
    pub async fn execute(&self, request: Request) -> Result<ExchangeHandle> {
        if let Some(cause) = self.shared.failure() {
            return Err(cause);
        }

        let correlation_id = self.shared.ids.next(&self.shared.exchanges);
        let handle = self
            .shared
            .exchanges
            .register(correlation_id, request.clone())?;
        let wire = WireRequest {
            correlation_id,
            request,
        };

        let to_send = {
            let mut state = self.shared.state.lock().await;
            // fail_all may have run between the check above and this point,
            // missing the exchange registered in between.
            if let Some(cause) = self.shared.failure() {
                self.shared
                    .exchanges
                    .complete(correlation_id, Err(cause.clone()));
                return Err(cause);
            }
            if state.inflight.is_none() {
                state.inflight = Some(correlation_id);
                Some(wire)
            } else {
                tracing::trace!(
                    connection_id = %self.shared.connection.id(),
                    correlation_id,
                    queued = state.queue.len() + 1,
                    "Queueing behind in-flight exchange"
                );
                state.queue.push_back(wire);
                None
            }
        };

        if let Some(wire) = to_send {
            if let Err(e) = self.shared.connection.send(wire).await {
                self.shared.fail(e.clone());
                return Err(e);
            }
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
            // Drop returns or discards the connection and frees the permit.
        }
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    mut events: tokio::sync::mpsc::Receiver<WireEvent>,
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
                    shared.on_response(correlation_id, response).await;
                }
                Some(WireEvent::Settings(_)) => {
                    tracing::debug!(
                        connection_id = %shared.connection.id(),
                        "Ignoring settings on sequential transport"
                    );
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
    // Graceful stop: hand the event stream back for the next owner.
    shared.connection.restore_events(events);
}
