//! Transport behavior over scripted peers: correlation, ordering, handshake
//! gating, settings updates, push routing, and connection reuse.

mod common;

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;

use common::{MockConnector, PeerReply};
use wirebound::config::PoolConfig;
use wirebound::error::Error;
use wirebound::message::{Request, Response};
use wirebound::net::{Node, PeerSettings};
use wirebound::transport::Transport;
use wirebound::{ConnectionPool, Protocol};

fn request(path: &str) -> Request {
    Request::get(path.parse().unwrap())
}

fn echo_after(delay: Duration) -> MockConnector {
    MockConnector::new(Arc::new(move |_node: &Node, req: &Request| {
        PeerReply::RespondAfter(
            delay,
            Response::new(StatusCode::OK)
                .with_body(bytes::Bytes::from(req.uri.path().to_string())),
        )
    }))
}

fn single_node_pool(connector: MockConnector, port: u16, protocol: Protocol) -> ConnectionPool {
    let config = PoolConfig {
        max_connections: 1,
        acquire_timeout_ms: 1_000,
        connect_timeout_ms: 1_000,
        ..PoolConfig::default()
    };
    ConnectionPool::new(
        common::test_nodes(1, port, protocol),
        Arc::new(connector),
        &config,
    )
    .unwrap()
}

#[tokio::test]
async fn sequential_queues_and_answers_in_order() {
    let pool = single_node_pool(echo_after(Duration::from_millis(20)), 9400, Protocol::Http1);
    let transport = Transport::connect(&pool).await.unwrap();

    let first = transport.execute(request("/one")).await.unwrap();
    let second = transport.execute(request("/two")).await.unwrap();
    let third = transport.execute(request("/three")).await.unwrap();

    // Sequential ids count up by one from the base.
    assert_eq!(first.correlation_id(), 1);
    assert_eq!(second.correlation_id(), 2);
    assert_eq!(third.correlation_id(), 3);
    assert_eq!(transport.pending_count(), 3);

    assert_eq!(
        first.wait(Duration::from_secs(2)).await.unwrap().body,
        bytes::Bytes::from("/one")
    );
    assert_eq!(
        second.wait(Duration::from_secs(2)).await.unwrap().body,
        bytes::Bytes::from("/two")
    );
    assert_eq!(
        third.wait(Duration::from_secs(2)).await.unwrap().body,
        bytes::Bytes::from("/three")
    );
    assert_eq!(transport.pending_count(), 0);

    transport.close(Duration::from_millis(50)).await;
    assert_eq!(pool.idle_count(), 1);
}

#[tokio::test]
async fn multiplexed_resolves_exchanges_out_of_order() {
    let connector = MockConnector::new(Arc::new(|_node: &Node, req: &Request| {
        let delay = if req.uri.path() == "/slow" {
            Duration::from_millis(150)
        } else {
            Duration::from_millis(1)
        };
        PeerReply::RespondAfter(
            delay,
            Response::new(StatusCode::OK)
                .with_body(bytes::Bytes::from(req.uri.path().to_string())),
        )
    }));
    let pool = single_node_pool(connector, 9410, Protocol::Http2);
    let transport = Transport::connect(&pool).await.unwrap();
    transport
        .await_handshake(Duration::from_millis(500))
        .await
        .unwrap();

    let slow = transport.execute(request("/slow")).await.unwrap();
    let fast = transport.execute(request("/fast")).await.unwrap();

    // Multiplexed ids occupy the odd half of the space.
    assert_eq!(slow.correlation_id(), 1);
    assert_eq!(fast.correlation_id(), 3);

    // The later exchange completes first; each waiter still gets its own
    // response.
    assert_eq!(
        fast.wait(Duration::from_secs(2)).await.unwrap().body,
        bytes::Bytes::from("/fast")
    );
    assert_eq!(transport.pending_count(), 1);
    assert_eq!(
        slow.wait(Duration::from_secs(2)).await.unwrap().body,
        bytes::Bytes::from("/slow")
    );

    transport.close(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn handshake_timeout_is_transport_fatal() {
    let pool = single_node_pool(
        MockConnector::echo().silent_handshake(),
        9420,
        Protocol::Http2,
    );
    let transport = Transport::connect(&pool).await.unwrap();

    let err = transport
        .await_handshake(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HandshakeTimeout(_)), "got {err:?}");
    assert!(transport.is_failed());

    // The gate never opened; dispatch is refused outright.
    let err = transport.execute(request("/late")).await.unwrap_err();
    assert!(err.is_transport_fatal(), "got {err:?}");

    transport.close(Duration::from_millis(10)).await;
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.available_permits(), 1);
}

#[tokio::test]
async fn settings_update_applies_without_disrupting_exchanges() {
    let updated = PeerSettings {
        max_concurrent_streams: 7,
        initial_window_size: 1_024,
    };
    let reply_settings = updated.clone();
    let connector = MockConnector::new(Arc::new(move |_node: &Node, _req: &Request| {
        PeerReply::SettingsThenRespond(
            reply_settings.clone(),
            Response::new(StatusCode::OK),
        )
    }));
    let pool = single_node_pool(connector, 9430, Protocol::Http2);
    let transport = Transport::connect(&pool).await.unwrap();
    transport
        .await_handshake(Duration::from_millis(500))
        .await
        .unwrap();

    let handle = transport.execute(request("/update")).await.unwrap();
    let response = handle.wait(Duration::from_secs(2)).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);

    let Transport::Multiplexed(inner) = &transport else {
        panic!("http2 node must yield a multiplexed transport");
    };
    assert_eq!(inner.peer_settings().as_deref(), Some(&updated));

    transport.close(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn push_messages_reach_the_subscriber() {
    let connector = MockConnector::new(Arc::new(|_node: &Node, _req: &Request| {
        PeerReply::PushThenRespond {
            push_id: 2,
            push: Response::new(StatusCode::OK).with_body(bytes::Bytes::from("pushed")),
            response: Response::new(StatusCode::OK).with_body(bytes::Bytes::from("answered")),
        }
    }));
    let pool = single_node_pool(connector, 9440, Protocol::Http2);
    let transport = Transport::connect(&pool).await.unwrap();
    transport
        .await_handshake(Duration::from_millis(500))
        .await
        .unwrap();

    let Transport::Multiplexed(inner) = &transport else {
        panic!("http2 node must yield a multiplexed transport");
    };
    let mut pushes = inner.subscribe_push(8);

    let handle = transport.execute(request("/pull")).await.unwrap();
    let response = handle.wait(Duration::from_secs(2)).await.unwrap();
    assert_eq!(response.body, bytes::Bytes::from("answered"));

    let pushed = pushes.recv().await.unwrap();
    assert_eq!(pushed.body, bytes::Bytes::from("pushed"));

    transport.close(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn late_answer_never_reaches_a_later_transport() {
    // The peer eventually answers "/slow", long after its waiter gave up.
    let connector = MockConnector::new(Arc::new(|_node: &Node, req: &Request| {
        let (delay, body) = if req.uri.path() == "/slow" {
            (Duration::from_millis(200), "stale")
        } else {
            (Duration::from_millis(1), "fresh")
        };
        PeerReply::RespondAfter(
            delay,
            Response::new(StatusCode::OK).with_body(bytes::Bytes::from(body)),
        )
    }));
    let connects = Arc::clone(&connector.connect_attempts);
    let pool = single_node_pool(connector, 9470, Protocol::Http1);

    let transport = Transport::connect(&pool).await.unwrap();
    let slow = transport.execute(request("/slow")).await.unwrap();
    let err = slow.wait(Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, Error::ExchangeTimeout { .. }), "got {err:?}");

    // The abandoned answer is still in flight; the connection must be
    // discarded, not pooled, so no later id sequence can collide with it.
    assert!(transport.is_tainted());
    transport.close(Duration::from_millis(10)).await;
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.available_permits(), 1);

    // A fresh transport dials a fresh connection; its first exchange reuses
    // correlation id 1 and must resolve with its own response.
    let transport = Transport::connect(&pool).await.unwrap();
    assert_eq!(connects.load(std::sync::atomic::Ordering::SeqCst), 2);

    let fresh = transport.execute(request("/fresh")).await.unwrap();
    assert_eq!(fresh.correlation_id(), 1);
    let response = fresh.wait(Duration::from_secs(2)).await.unwrap();
    assert_eq!(response.body, bytes::Bytes::from("fresh"));

    transport.close(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn dispatch_after_failure_is_rejected_cleanly() {
    let pool = single_node_pool(MockConnector::echo(), 9480, Protocol::Http1);
    let transport = Transport::connect(&pool).await.unwrap();

    transport.fail(Error::ConnectionFailure("torn down".to_string()));

    let err = transport.execute(request("/late")).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailure(_)), "got {err:?}");
    // The rejected dispatch leaves nothing behind for close to wait on.
    assert_eq!(transport.pending_count(), 0);

    transport.close(Duration::from_millis(10)).await;
    assert_eq!(pool.available_permits(), 1);
}

#[tokio::test]
async fn execute_map_applies_the_mapper() {
    let pool = single_node_pool(MockConnector::echo(), 9460, Protocol::Http1);
    let transport = Transport::connect(&pool).await.unwrap();

    let status = transport
        .execute_map(request("/mapped"), Duration::from_secs(2), |response| {
            response.status
        })
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);

    transport.close(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn graceful_close_returns_the_same_connection() {
    let pool = single_node_pool(MockConnector::echo(), 9450, Protocol::Http1);

    let pooled = pool.acquire().await.unwrap();
    let first_id = pooled.connection().id();
    let transport = Transport::from_pooled(pooled);

    let handle = transport.execute(request("/once")).await.unwrap();
    handle.wait(Duration::from_secs(2)).await.unwrap();
    transport.close(Duration::from_millis(50)).await;
    assert_eq!(pool.idle_count(), 1);

    let pooled = pool.acquire().await.unwrap();
    assert_eq!(pooled.connection().id(), first_id);
}
