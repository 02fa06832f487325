// Kept in its own test binary: OPEN_CONNECTIONS is process-wide and other
// client tests hold connections concurrently.

use churn_common::TaskConfig;
use churn_load::engine::client::{TcpClient, OPEN_CONNECTIONS};
use churn_load::metrics;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

fn open() -> usize {
    OPEN_CONNECTIONS.load(Ordering::SeqCst)
}

async fn wait_for_open(expected: usize) {
    timeout(Duration::from_secs(2), async {
        while open() != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("open connection count reached");
}

fn hold_for(secs: u64) -> TaskConfig {
    TaskConfig {
        min_hold_secs: secs,
        max_hold_secs: secs,
        backoff_ms: 10,
        connect_timeout_ms: 0,
    }
}

#[tokio::test]
async fn test_open_connections_tracks_hold_close_and_abort() {
    metrics::register_metrics();
    let baseline = open();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // normal close after the hold
    let mut client = TcpClient::new(addr.to_string(), &hold_for(1));
    let task = tokio::spawn(async move { client.connect_to_server().await });
    let (mut peer, _) = listener.accept().await.unwrap();
    wait_for_open(baseline + 1).await;

    let rendered = metrics::render_metrics();
    assert!(rendered.contains(&format!("churn_open_connections {}", baseline + 1)));

    let mut rest = Vec::new();
    peer.read_to_end(&mut rest).await.unwrap();
    assert!(task.await.unwrap().unwrap().is_success());
    assert_eq!(open(), baseline);

    // aborted mid-hold
    let mut client = TcpClient::new(addr.to_string(), &hold_for(10));
    let task = tokio::spawn(async move { client.connect_to_server().await });
    let (_peer, _) = listener.accept().await.unwrap();
    wait_for_open(baseline + 1).await;

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(open(), baseline);

    // a failed connect never counts
    drop(listener);
    let mut client = TcpClient::new(addr.to_string(), &hold_for(1));
    let outcome = client.connect_to_server().await.unwrap();
    assert!(!outcome.is_success());
    assert_eq!(open(), baseline);
}
