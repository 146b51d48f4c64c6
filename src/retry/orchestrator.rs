//! Retry/redirect orchestration over pooled transports.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{RedirectConfig, TransportConfig};
use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::pool::ConnectionPool;
use crate::retry::backoff::{Backoff, BackoffConfig, BackoffDecision};
use crate::retry::redirect;
use crate::transport::Transport;

/// Drives one logical request to completion: cookie merge, dispatch through
/// a transport, redirect continuations, and jittered-backoff retries.
///
/// Transport-fatal failures discard the transport and reconnect through the
/// pool for the next attempt; exchange-local timeouts retry on the same
/// transport. The backoff calculator only computes intervals; the
/// orchestrator sleeps them.
pub struct Orchestrator {
    pool: ConnectionPool,
    jar: Arc<CookieJar>,
    backoff: BackoffConfig,
    redirect: RedirectConfig,
    transport: TransportConfig,
}

impl Orchestrator {
    /// Build an orchestrator. The backoff shape is validated eagerly.
    pub fn new(
        pool: ConnectionPool,
        jar: Arc<CookieJar>,
        backoff: BackoffConfig,
        redirect: RedirectConfig,
        transport: TransportConfig,
    ) -> Result<Self> {
        backoff.validate()?;
        Ok(Self {
            pool,
            jar,
            backoff,
            redirect,
            transport,
        })
    }

    pub fn cookie_jar(&self) -> &Arc<CookieJar> {
        &self.jar
    }

    /// Execute `request`, following redirects and retrying per configuration.
    /// The caller receives exactly one terminal outcome.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let handshake_limit = Duration::from_millis(self.transport.handshake_timeout_ms);
        let exchange_limit = Duration::from_millis(self.transport.exchange_timeout_ms);
        let close_grace = Duration::from_millis(self.transport.close_grace_ms);

        let mut backoff = Backoff::new(self.backoff.clone(), Instant::now())?;
        let mut rng = SmallRng::from_entropy();
        let mut transport: Option<Transport> = None;
        let mut current = request;

        let result = loop {
            let active = match transport.as_ref() {
                // A tainted transport sits on a connection that may still
                // deliver an abandoned answer; retrying on it would wait out
                // the same wedge, so reconnect instead.
                Some(t) if !t.is_failed() && !t.is_tainted() => t,
                _ => {
                    // Fresh transport: discard any failed predecessor first.
                    if let Some(old) = transport.take() {
                        old.close(Duration::ZERO).await;
                    }
                    let fresh = match self.connect(handshake_limit).await {
                        Ok(t) => t,
                        Err(e) => break Err(e),
                    };
                    transport.insert(fresh)
                }
            };

            let outcome = self.dispatch(active, &current, exchange_limit).await;
            match outcome {
                Ok(response) => {
                    self.jar.store_all(response.cookies.iter().cloned());

                    if self.redirect.enabled {
                        match redirect::continuation(&current, &response, self.redirect.max_hops) {
                            Ok(Some(next)) => {
                                current = next;
                                continue;
                            }
                            Ok(None) => break Ok(response),
                            Err(e) => break Err(e),
                        }
                    }
                    break Ok(response);
                }
                Err(e) if is_retryable(&e) => {
                    match backoff.next(Instant::now(), &mut rng) {
                        BackoffDecision::Stop => {
                            tracing::warn!(error = %e, "Backoff budget spent; giving up");
                            break Err(e);
                        }
                        BackoffDecision::Wait(interval) => {
                            tracing::debug!(
                                error = %e,
                                delay = ?interval,
                                "Retrying after backoff"
                            );
                            tokio::time::sleep(interval).await;
                            continue;
                        }
                    }
                }
                Err(e) => break Err(e),
            }
        };

        if let Some(t) = transport.take() {
            t.close(close_grace).await;
        }
        result
    }

    /// Acquire a connection and open the handshake gate where the protocol
    /// has one.
    async fn connect(&self, handshake_limit: Duration) -> Result<Transport> {
        let transport = Transport::connect(&self.pool).await?;
        transport.await_handshake(handshake_limit).await?;
        Ok(transport)
    }

    /// One attempt: merge jar cookies into the request and wait for the
    /// correlated response.
    async fn dispatch(
        &self,
        transport: &Transport,
        request: &Request,
        exchange_limit: Duration,
    ) -> Result<Response> {
        let mut attempt = request.clone();
        for cookie in self.jar.matching(&attempt.uri) {
            // The request's own cookies win over jar entries of the same name.
            if !attempt.cookies.iter().any(|c| c.name == cookie.name) {
                attempt.cookies.push(cookie);
            }
        }

        let handle = transport.execute(attempt).await?;
        handle.wait(exchange_limit).await
    }
}

/// Failures worth reissuing: a broken transport (reconnect) or a single
/// exchange that timed out. Redirect-loop and configuration errors are
/// terminal.
fn is_retryable(error: &Error) -> bool {
    error.is_transport_fatal() || matches!(error, Error::ExchangeTimeout { .. })
}
