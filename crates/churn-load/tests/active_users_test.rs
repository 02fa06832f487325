// Kept in its own test binary: ACTIVE_USERS is process-wide.

use churn_common::{Config, TaskConfig};
use churn_load::engine::swarm::{Swarm, ACTIVE_USERS};
use churn_load::metrics;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_active_users_rise_and_fall_with_the_swarm() {
    metrics::register_metrics();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut rest = Vec::new();
                let _ = socket.read_to_end(&mut rest).await;
            });
        }
    });

    let mut config = Config::default();
    config.target.address = addr.to_string();
    config.task = TaskConfig {
        min_hold_secs: 1,
        max_hold_secs: 1,
        ..TaskConfig::default()
    };
    config.swarm.users = 3;
    config.swarm.spawn_rate = 100.0;
    config.swarm.report_interval_secs = 0;

    let baseline = ACTIVE_USERS.load(Ordering::SeqCst);
    let token = CancellationToken::new();
    let run = tokio::spawn(Swarm::new(&config).unwrap().run(token.clone()));

    timeout(Duration::from_secs(2), async {
        while ACTIVE_USERS.load(Ordering::SeqCst) != baseline + 3 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("all users running");
    assert!(metrics::render_metrics().contains(&format!("churn_active_users {}", baseline + 3)));

    token.cancel();
    let report = timeout(Duration::from_secs(2), run).await.unwrap().unwrap();
    assert_eq!(report.users_stopped, 3);
    assert_eq!(ACTIVE_USERS.load(Ordering::SeqCst), baseline);
}
