use churn_load::engine::client::TaskOutcome;
use churn_load::engine::stats::Stats;
use churn_load::metrics;
use std::time::Duration;

#[test]
fn test_render_exposes_churn_metrics() {
    metrics::register_metrics();
    // registering twice is harmless
    metrics::register_metrics();

    Stats::new().record(&TaskOutcome::Completed {
        hold: Duration::from_secs(1),
        connect: Duration::from_millis(1),
        elapsed: Duration::from_secs(1),
    });

    let body = metrics::render_metrics();
    for name in [
        "churn_connections_total",
        "churn_connect_failures_total",
        "churn_task_errors_total",
        "churn_active_users",
        "churn_open_connections",
        "churn_connect_seconds",
    ] {
        assert!(body.contains(name), "missing {} in:\n{}", name, body);
    }
}
