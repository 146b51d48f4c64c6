//! Pending-exchange bookkeeping shared by both transport variants.
//!
//! # Responsibilities
//! - Allocate monotonically increasing correlation ids, with overflow
//!   wraparound that never collides with a still-pending id
//! - Track one PendingExchange per in-flight correlation id
//! - Deliver exactly one terminal result (response, failure, or timeout) to
//!   each waiter

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Notify};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::message::{Request, Response};

/// Ids share the HTTP/2 stream-id space; wrap instead of overflowing it.
const CORRELATION_ID_MAX: u64 = (1 << 31) - 1;

/// One dispatched request awaiting its correlated response.
#[derive(Debug)]
pub struct PendingExchange {
    pub correlation_id: u64,
    /// The originating request, kept for diagnostics.
    pub request: Request,
    pub created_at: Instant,
    completion: oneshot::Sender<Result<Response>>,
}

/// Concurrent map of in-flight exchanges for one transport instance.
#[derive(Debug, Default)]
pub struct ExchangeMap {
    pending: DashMap<u64, PendingExchange>,
    /// Signaled whenever the map drains to empty.
    drained: Notify,
    /// Set when an exchange is retired unfulfilled: the peer may still send
    /// an answer for it, so the underlying connection can no longer be
    /// trusted to stay in sync with a fresh id sequence.
    tainted: AtomicBool,
}

impl ExchangeMap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a fresh exchange under `correlation_id`. Reusing an id before
    /// its exchange retires is a protocol violation.
    pub fn register(
        self: &Arc<Self>,
        correlation_id: u64,
        request: Request,
    ) -> Result<ExchangeHandle> {
        use dashmap::mapref::entry::Entry;

        let (tx, rx) = oneshot::channel();
        match self.pending.entry(correlation_id) {
            Entry::Occupied(_) => Err(Error::DuplicateCorrelation(correlation_id)),
            Entry::Vacant(slot) => {
                slot.insert(PendingExchange {
                    correlation_id,
                    request,
                    created_at: Instant::now(),
                    completion: tx,
                });
                Ok(ExchangeHandle {
                    correlation_id,
                    receiver: rx,
                    map: Arc::clone(self),
                })
            }
        }
    }

    /// Fulfill the exchange registered under `correlation_id`. Returns false
    /// when no such exchange exists (unsolicited message).
    pub fn complete(&self, correlation_id: u64, result: Result<Response>) -> bool {
        match self.pending.remove(&correlation_id) {
            Some((_, exchange)) => {
                // The waiter may have timed out and dropped its receiver;
                // that is its own terminal outcome, not an error here.
                let _ = exchange.completion.send(result);
                self.notify_if_drained();
                true
            }
            None => false,
        }
    }

    /// Remove an exchange without fulfilling it (waiter-side timeout). The
    /// map is marked tainted: the abandoned answer may still arrive.
    fn retire(&self, correlation_id: u64) {
        self.tainted.store(true, Ordering::SeqCst);
        self.pending.remove(&correlation_id);
        self.notify_if_drained();
    }

    /// True when any exchange was abandoned before its answer arrived.
    pub fn is_tainted(&self) -> bool {
        self.tainted.load(Ordering::SeqCst)
    }

    /// Complete every outstanding exchange with `cause`. Used when the
    /// transport fails as a whole.
    pub fn fail_all(&self, cause: &Error) {
        let ids: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.complete(id, Err(cause.clone()));
        }
    }

    pub fn is_pending(&self, correlation_id: u64) -> bool {
        self.pending.contains_key(&correlation_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Wait until no exchange is outstanding; `false` if `limit` expires
    /// first.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        timeout(limit, async {
            loop {
                let notified = self.drained.notified();
                tokio::pin!(notified);
                // Register before checking so a drain notification landing
                // in between is not lost.
                notified.as_mut().enable();
                if self.pending.is_empty() {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    fn notify_if_drained(&self) {
        if self.pending.is_empty() {
            self.drained.notify_waiters();
        }
    }
}

/// Waitable handle for one exchange. Exactly one terminal outcome reaches the
/// holder: the response, the transport's failure cause, or a timeout.
#[derive(Debug)]
pub struct ExchangeHandle {
    correlation_id: u64,
    receiver: oneshot::Receiver<Result<Response>>,
    map: Arc<ExchangeMap>,
}

impl ExchangeHandle {
    pub fn correlation_id(&self) -> u64 {
        self.correlation_id
    }

    /// Wait for the exchange to complete. On timeout the exchange is retired
    /// so its id can be reused; sibling exchanges are unaffected.
    pub async fn wait(mut self, limit: Duration) -> Result<Response> {
        match timeout(limit, &mut self.receiver).await {
            Ok(Ok(result)) => result,
            // Sender dropped without a result; treat as a broken transport.
            Ok(Err(_)) => Err(Error::ConnectionFailure(format!(
                "exchange {} abandoned",
                self.correlation_id
            ))),
            Err(_) => {
                self.map.retire(self.correlation_id);
                tracing::debug!(
                    correlation_id = self.correlation_id,
                    "Exchange timed out"
                );
                Err(Error::ExchangeTimeout {
                    correlation_id: self.correlation_id,
                    elapsed: limit,
                })
            }
        }
    }
}

/// Correlation id allocator for one transport instance.
///
/// Sequential transports step by 1 from base 1; multiplexed transports step
/// by 2 from base 1, keeping ids odd and reserving even ids for
/// peer-initiated streams. Overflow wraps back to the base, skipping any id
/// still pending.
#[derive(Debug)]
pub struct CorrelationIds {
    next: Mutex<u64>,
    base: u64,
    step: u64,
}

impl CorrelationIds {
    pub fn sequential() -> Self {
        Self::with_base(1, 1)
    }

    pub fn multiplexed() -> Self {
        Self::with_base(1, 2)
    }

    fn with_base(base: u64, step: u64) -> Self {
        Self {
            next: Mutex::new(base),
            base,
            step,
        }
    }

    /// Allocate the next id not currently pending in `map`.
    pub fn next(&self, map: &ExchangeMap) -> u64 {
        let mut next = self.next.lock().expect("correlation lock poisoned");
        loop {
            let id = *next;
            *next = if id + self.step > CORRELATION_ID_MAX {
                self.base
            } else {
                id + self.step
            };
            if !map.is_pending(id) {
                return id;
            }
            // Wrapped onto a still-pending id; keep scanning.
        }
    }
}
