//! Integration tests: full client/server exchange over a real loopback
//! socket, covering correlation, timeouts, signals, and disconnect.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use cumulus_comm::{ClientEvent, CommClient, CommError, CommServer, RequestHandler};
use cumulus_core::proto::{RequestNum, SignalNum};

/// Echoes the request parameters back, optionally after a delay encoded
/// in the payload (`sleep:<ms>:<tag>`), so replies can overtake each
/// other on the wire.
struct EchoHandler;

impl RequestHandler for EchoHandler {
    fn handle(&self, _num: RequestNum, params: &[u8]) -> Bytes {
        if let Some(rest) = params.strip_prefix(b"sleep:".as_slice()) {
            let text = String::from_utf8_lossy(rest);
            if let Some((ms, _tag)) = text.split_once(':') {
                if let Ok(ms) = ms.parse::<u64>() {
                    std::thread::sleep(Duration::from_millis(ms));
                }
            }
        }
        Bytes::copy_from_slice(params)
    }
}

/// Never replies within any reasonable test timeout.
struct BlackHoleHandler;

impl RequestHandler for BlackHoleHandler {
    fn handle(&self, _num: RequestNum, _params: &[u8]) -> Bytes {
        std::thread::sleep(Duration::from_secs(30));
        Bytes::new()
    }
}

#[tokio::test]
async fn execute_round_trips_params() {
    let server = CommServer::bind(Arc::new(EchoHandler)).await.unwrap();
    let (client, _events) = CommClient::connect(server.port(), Duration::from_secs(5))
        .await
        .unwrap();

    let reply = client
        .execute(
            RequestNum::SyncStatus,
            Bytes::from_static(b"{\"syncDbId\":42}"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(reply, Bytes::from_static(b"{\"syncDbId\":42}"));

    client.stop().await;
    server.shutdown().await;
}

#[tokio::test]
async fn concurrent_requests_receive_their_own_replies() {
    // Replies arrive out of order (later requests sleep less), and
    // every caller still gets the payload matching its own id.
    let server = CommServer::bind(Arc::new(EchoHandler)).await.unwrap();
    let client = Arc::new(
        CommClient::connect(server.port(), Duration::from_secs(5))
            .await
            .unwrap()
            .0,
    );

    let mut tasks = Vec::new();
    for i in 0..8u64 {
        let client = client.clone();
        // Earlier requests sleep longest, forcing reply inversion.
        let delay_ms = (8 - i) * 30;
        tasks.push(tokio::spawn(async move {
            let payload = format!("sleep:{delay_ms}:request-{i}");
            let reply = client
                .execute(
                    RequestNum::SyncStatus,
                    Bytes::from(payload.clone()),
                    Duration::from_secs(10),
                )
                .await
                .unwrap();
            assert_eq!(reply, Bytes::from(payload));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    server.shutdown().await;
}

#[tokio::test]
async fn connect_to_port_zero_fails_immediately() {
    // Server not running: no connection attempt is made.
    let start = std::time::Instant::now();
    let result = CommClient::connect(0, Duration::from_secs(10)).await;
    assert!(matches!(result, Err(CommError::InvalidPort)));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn execute_times_out_when_server_never_replies() {
    let server = CommServer::bind(Arc::new(BlackHoleHandler)).await.unwrap();
    let (client, _events) = CommClient::connect(server.port(), Duration::from_secs(5))
        .await
        .unwrap();

    let result = client
        .execute(
            RequestNum::SyncStart,
            Bytes::new(),
            Duration::from_millis(200),
        )
        .await;
    assert!(matches!(result, Err(CommError::Timeout)));

    client.stop().await;
    server.shutdown().await;
}

#[tokio::test]
async fn signals_are_pushed_to_connected_clients() {
    let server = CommServer::bind(Arc::new(EchoHandler)).await.unwrap();
    let (client, mut events) = CommClient::connect(server.port(), Duration::from_secs(5))
        .await
        .unwrap();

    // A request/reply round trip guarantees the connection is fully up
    // before the broadcast.
    client
        .execute(RequestNum::SyncIsRunning, Bytes::new(), Duration::from_secs(5))
        .await
        .unwrap();

    server.broadcast_signal(SignalNum::SyncProgressInfo, Bytes::from_static(b"55"));

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("signal should arrive")
        .expect("event channel open");
    match event {
        ClientEvent::Signal(signal) => {
            assert_eq!(signal.num, SignalNum::SyncProgressInfo);
            assert_eq!(signal.params, Bytes::from_static(b"55"));
        }
        other => panic!("expected signal, got {other:?}"),
    }

    client.stop().await;
    server.shutdown().await;
}

#[tokio::test]
async fn server_shutdown_surfaces_disconnect() {
    let server = CommServer::bind(Arc::new(EchoHandler)).await.unwrap();
    let (client, mut events) = CommClient::connect(server.port(), Duration::from_secs(5))
        .await
        .unwrap();

    client
        .execute(RequestNum::SyncIsRunning, Bytes::new(), Duration::from_secs(5))
        .await
        .unwrap();

    server.shutdown().await;

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(ClientEvent::Disconnected) => break,
                Some(_) => continue,
                None => panic!("event channel closed without disconnect"),
            }
        }
    })
    .await;
    assert!(event.is_ok(), "disconnect event should be delivered");
    assert!(!client.is_connected());

    // Requests after disconnect fail fast.
    let result = client
        .execute(RequestNum::SyncStatus, Bytes::new(), Duration::from_secs(5))
        .await;
    assert!(matches!(result, Err(CommError::NotConnected)));
}
