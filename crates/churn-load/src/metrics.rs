use crate::engine::client::OPEN_CONNECTIONS;
use crate::engine::swarm::ACTIVE_USERS;
use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::atomic::Ordering;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref CONNECTIONS_TOTAL: IntCounter = IntCounter::new(
        "churn_connections_total",
        "Total number of completed connect/hold/close cycles"
    )
    .expect("metric can be created");
    pub static ref CONNECT_FAILURES: IntCounter = IntCounter::new(
        "churn_connect_failures_total",
        "Total number of failed connect attempts"
    )
    .expect("metric can be created");
    /// Errors a task returned instead of an outcome (socket allocation and the like)
    pub static ref TASK_ERRORS: IntCounter = IntCounter::new(
        "churn_task_errors_total",
        "Total number of task invocations that ended in an error"
    )
    .expect("metric can be created");
    pub static ref ACTIVE_USERS_GAUGE: Gauge = Gauge::new(
        "churn_active_users",
        "Number of currently running simulated users"
    )
    .expect("metric can be created");
    pub static ref OPEN_CONNECTIONS_GAUGE: Gauge = Gauge::new(
        "churn_open_connections",
        "Number of connections currently held open"
    )
    .expect("metric can be created");
    pub static ref CONNECT_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "churn_connect_seconds",
            "Time spent establishing a connection"
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    )
    .expect("metric can be created");
}

pub fn register_metrics() {
    let _ = REGISTRY.register(Box::new(CONNECTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CONNECT_FAILURES.clone()));
    let _ = REGISTRY.register(Box::new(TASK_ERRORS.clone()));
    let _ = REGISTRY.register(Box::new(ACTIVE_USERS_GAUGE.clone()));
    let _ = REGISTRY.register(Box::new(OPEN_CONNECTIONS_GAUGE.clone()));
    let _ = REGISTRY.register(Box::new(CONNECT_SECONDS.clone()));
}

fn update_metrics() {
    ACTIVE_USERS_GAUGE.set(ACTIVE_USERS.load(Ordering::SeqCst) as f64);
    OPEN_CONNECTIONS_GAUGE.set(OPEN_CONNECTIONS.load(Ordering::SeqCst) as f64);
}

pub fn render_metrics() -> String {
    update_metrics();

    let metric_families = REGISTRY.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|_| "# Error: Invalid UTF8".to_string())
}
