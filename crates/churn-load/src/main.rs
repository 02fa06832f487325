use churn_common::Config;
use churn_load::engine::swarm::Swarm;
use churn_load::metrics;
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use std::convert::Infallible;
use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "config/churn_config.yaml";

fn init_production_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true))
        .init();

    info!("Structured logging initialized (JSON)");
}

fn load_config(path: &str) -> Result<Config, Box<dyn std::error::Error>> {
    match fs::read_to_string(path) {
        Ok(data) => Ok(Config::from_yaml_str(&data)?),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path, "Config file not found, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(Box::new(e)),
    }
}

async fn metrics_handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    match req.uri().path() {
        "/health" => Ok(Response::new(Body::from("OK"))),
        "/metrics" => Ok(Response::new(Body::from(metrics::render_metrics()))),
        _ => {
            let mut not_found = Response::new(Body::from("Not Found"));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Ok(not_found)
        }
    }
}

async fn run_metrics_server(port: u16, token: CancellationToken) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let make_svc =
        make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(metrics_handler)) });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder
            .serve(make_svc)
            .with_graceful_shutdown(async move { token.cancelled().await }),
        Err(e) => {
            error!(port = port, error = %e, "Could not bind observability server");
            return;
        }
    };

    info!(port = port, "Observability server online");

    if let Err(e) = server.await {
        error!(error = %e, "Observability server failed");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_production_logging();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&path)?;
    let swarm = Swarm::new(&config)?;

    let master_token = CancellationToken::new();
    metrics::register_metrics();

    let metrics_server = if config.metrics.enabled {
        let port = config.metrics.port;
        let token = master_token.clone();
        Some(tokio::spawn(async move {
            run_metrics_server(port, token).await;
        }))
    } else {
        None
    };

    let signal_token = master_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    info!(
        target_addr = %config.target.address,
        users = config.swarm.users,
        min_hold_secs = config.task.min_hold_secs,
        max_hold_secs = config.task.max_hold_secs,
        "tcp-churn started"
    );

    let report = swarm.run(master_token.clone()).await;

    master_token.cancel();
    if let Some(handle) = metrics_server {
        let _ = handle.await;
    }

    info!(
        completed = report.completed,
        failed = report.failed,
        task_errors = report.task_errors,
        failure_ratio = report.failure_ratio(),
        mean_hold_ms = report.mean_hold.as_millis() as u64,
        mean_connect_us = report.mean_connect.as_micros() as u64,
        "Run finished"
    );
    Ok(())
}
