//! Shared test harness: scripted in-memory peers behind the connector seam.

// Each test binary uses a different subset of the harness.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::mpsc;

use wirebound::error::{Error, Result};
use wirebound::message::{Request, Response};
use wirebound::net::{Connection, Connector, Node, PeerSettings, WireEvent, WireRequest};
use wirebound::Protocol;

/// What the scripted peer does with one incoming request.
pub enum PeerReply {
    /// Answer immediately.
    Respond(Response),
    /// Answer after a delay (without blocking other exchanges).
    RespondAfter(Duration, Response),
    /// Advertise fresh settings, then answer.
    SettingsThenRespond(PeerSettings, Response),
    /// Send a peer-initiated response under `push_id` first, then answer.
    PushThenRespond { push_id: u64, push: Response, response: Response },
    /// Drop the connection.
    Close(String),
    /// Never answer; the exchange is left to time out.
    Ignore,
}

pub type Script = Arc<dyn Fn(&Node, &Request) -> PeerReply + Send + Sync>;

/// Connector that spawns an in-memory peer task per connection, driven by a
/// programmable script. Connect attempts can be made to fail up front to
/// exercise permit accounting.
#[derive(Clone)]
pub struct MockConnector {
    script: Script,
    /// Advertise settings on connect for HTTP/2 nodes; false simulates a
    /// peer that never completes the handshake.
    advertise_settings: bool,
    pub connect_attempts: Arc<AtomicUsize>,
    connect_failures_left: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            advertise_settings: true,
            connect_attempts: Arc::new(AtomicUsize::new(0)),
            connect_failures_left: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Peer that answers 200 with `"{port}{path}"` as the body.
    pub fn echo() -> Self {
        Self::new(Arc::new(|node: &Node, req: &Request| {
            PeerReply::Respond(
                Response::new(http::StatusCode::OK)
                    .with_body(bytes::Bytes::from(format!("{}{}", node.port, req.uri.path()))),
            )
        }))
    }

    /// HTTP/2 peer that never advertises settings.
    pub fn silent_handshake(mut self) -> Self {
        self.advertise_settings = false;
        self
    }

    /// Fail the next `count` connect attempts before succeeding again.
    pub fn fail_next_connects(self, count: usize) -> Self {
        self.connect_failures_left.store(count, Ordering::SeqCst);
        self
    }
}

impl Connector for MockConnector {
    fn connect(&self, node: Arc<Node>) -> BoxFuture<'static, Result<Connection>> {
        let script = Arc::clone(&self.script);
        let advertise_settings = self.advertise_settings;
        let attempts = Arc::clone(&self.connect_attempts);
        let failures_left = Arc::clone(&self.connect_failures_left);

        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            let should_fail = failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                    left.checked_sub(1)
                })
                .is_ok();
            if should_fail {
                return Err(Error::Connect {
                    node: node.to_string(),
                    reason: "injected connect failure".to_string(),
                });
            }

            let (out_tx, mut out_rx) = mpsc::channel::<WireRequest>(64);
            let (in_tx, in_rx) = mpsc::channel::<WireEvent>(64);

            if node.protocol == Protocol::Http2 && advertise_settings {
                let _ = in_tx.send(WireEvent::Settings(PeerSettings::default())).await;
            }

            let peer_node = Arc::clone(&node);
            tokio::spawn(async move {
                while let Some(wire) = out_rx.recv().await {
                    match script(&peer_node, &wire.request) {
                        PeerReply::Respond(response) => {
                            let _ = in_tx
                                .send(WireEvent::Response {
                                    correlation_id: wire.correlation_id,
                                    response,
                                })
                                .await;
                        }
                        PeerReply::RespondAfter(delay, response) => {
                            let in_tx = in_tx.clone();
                            let correlation_id = wire.correlation_id;
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                let _ = in_tx
                                    .send(WireEvent::Response { correlation_id, response })
                                    .await;
                            });
                        }
                        PeerReply::SettingsThenRespond(settings, response) => {
                            let _ = in_tx.send(WireEvent::Settings(settings)).await;
                            let _ = in_tx
                                .send(WireEvent::Response {
                                    correlation_id: wire.correlation_id,
                                    response,
                                })
                                .await;
                        }
                        PeerReply::PushThenRespond { push_id, push, response } => {
                            let _ = in_tx
                                .send(WireEvent::Response {
                                    correlation_id: push_id,
                                    response: push,
                                })
                                .await;
                            let _ = in_tx
                                .send(WireEvent::Response {
                                    correlation_id: wire.correlation_id,
                                    response,
                                })
                                .await;
                        }
                        PeerReply::Close(reason) => {
                            let _ = in_tx.send(WireEvent::Closed { reason }).await;
                            return;
                        }
                        PeerReply::Ignore => {}
                    }
                }
            });

            Ok(Connection::new(node, out_tx, in_rx))
        }
        .boxed()
    }
}

/// Node list on sequential ports starting at `base_port`.
pub fn test_nodes(count: usize, base_port: u16, protocol: Protocol) -> Vec<Node> {
    (0..count)
        .map(|i| Node::new("127.0.0.1", base_port + i as u16, protocol, false))
        .collect()
}
