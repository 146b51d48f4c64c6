//! Per-connection pipelined serve loop.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::net::{WireEvent, WireRequest};
use crate::server::sequencer::ResponseSequencer;

/// Serve one pipelined connection: read requests, run `handler` concurrently
/// per request, and write responses back in the order the requests were read.
///
/// Handlers may finish in any order; the sequencer holds completed responses
/// until their predecessors are on the wire. Overflowing the bounded hold
/// queue closes the connection with a [`Error::PipelineOverflow`].
pub async fn serve_pipelined<H, F>(
    capacity: usize,
    mut inbound: mpsc::Receiver<WireRequest>,
    outbound: mpsc::Sender<WireEvent>,
    handler: H,
) -> Result<()>
where
    H: Fn(Request) -> F + Clone + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    // Payload pairs each response with the correlation id it answers.
    let sequencer = Arc::new(Mutex::new(ResponseSequencer::<(u64, Response)>::new(
        capacity,
    )));
    let (error_tx, mut error_rx) = mpsc::channel::<Error>(1);

    loop {
        tokio::select! {
            failure = error_rx.recv() => {
                let cause = failure.unwrap_or_else(|| {
                    Error::ConnectionFailure("pipeline error channel closed".to_string())
                });
                tracing::warn!(error = %cause, "Closing pipelined connection");
                let _ = outbound
                    .send(WireEvent::Closed { reason: cause.to_string() })
                    .await;
                return Err(cause);
            }
            wire = inbound.recv() => {
                let wire = match wire {
                    Some(w) => w,
                    // Peer finished sending; in-flight handlers drain on
                    // their own tasks.
                    None => return Ok(()),
                };

                let sequence = sequencer.lock().await.assign_sequence();
                let sequencer = Arc::clone(&sequencer);
                let outbound = outbound.clone();
                let error_tx = error_tx.clone();
                let handler = handler.clone();

                tokio::spawn(async move {
                    let response = handler(wire.request).await;

                    // Complete and write under one lock so released runs hit
                    // the wire in sequence order even across tasks.
                    let mut sequencer = sequencer.lock().await;
                    match sequencer.complete(sequence, (wire.correlation_id, response)) {
                        Ok(writable) => {
                            for slot in writable {
                                let (correlation_id, response) = slot.payload;
                                if outbound
                                    .send(WireEvent::Response { correlation_id, response })
                                    .await
                                    .is_err()
                                {
                                    tracing::debug!("Peer gone; dropping pipelined response");
                                    return;
                                }
                            }
                        }
                        Err(overflow) => {
                            let _ = error_tx.try_send(overflow);
                        }
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use std::time::Duration;

    fn request(path: &str) -> Request {
        Request::get(format!("http://server{}", path).parse().unwrap())
    }

    #[tokio::test]
    async fn responses_written_in_read_order_despite_slow_handler() {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);

        let server = tokio::spawn(serve_pipelined(8, in_rx, out_tx, |req: Request| async move {
            // First request is the slowest; later ones finish first.
            if req.uri.path() == "/slow" {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Response::new(StatusCode::OK).with_body(Bytes::from(req.uri.path().to_string()))
        }));

        for (id, path) in [(1, "/slow"), (2, "/fast"), (3, "/faster")] {
            in_tx
                .send(WireRequest {
                    correlation_id: id,
                    request: request(path),
                })
                .await
                .unwrap();
        }
        drop(in_tx);
        server.await.unwrap().unwrap();

        let mut order = Vec::new();
        while let Some(event) = out_rx.recv().await {
            if let WireEvent::Response { correlation_id, .. } = event {
                order.push(correlation_id);
            }
        }
        assert_eq!(order, vec![1, 2, 3], "wire order must equal read order");
    }

    #[tokio::test]
    async fn overflow_closes_connection() {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);

        // Sequence 0 blocks forever, so completed successors pile up.
        let server = tokio::spawn(serve_pipelined(2, in_rx, out_tx, |req: Request| async move {
            if req.uri.path() == "/stuck" {
                std::future::pending::<()>().await;
            }
            Response::new(StatusCode::OK)
        }));

        in_tx
            .send(WireRequest { correlation_id: 1, request: request("/stuck") })
            .await
            .unwrap();
        for id in 2..=5 {
            in_tx
                .send(WireRequest { correlation_id: id, request: request("/ok") })
                .await
                .unwrap();
        }

        let result = server.await.unwrap();
        assert!(matches!(result, Err(Error::PipelineOverflow { capacity: 2 })));

        let mut closed = false;
        while let Ok(event) = out_rx.try_recv() {
            if matches!(event, WireEvent::Closed { .. }) {
                closed = true;
            }
        }
        assert!(closed, "peer must observe the close");
    }
}
