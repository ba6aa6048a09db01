// src/main.rs
use anyhow::Result;
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

mod config;
mod health;
mod metrics;
mod proxy;
mod server;

use crate::{
    health::HealthChecker,
    metrics::{MetricsCollector, MetricsRegistry},
    proxy::{BackendPool, Forwarder},
    server::{handler::RequestHandler, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());

    // Configuration isn't loaded yet, so honor `log_level` via the env
    // filter's default directive once it's known below; until then fall
    // back to info-level logging for the load itself.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rust_load_balancer=info".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    info!("loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    let pool = BackendPool::new(config.backend_servers.clone());

    if pool.is_empty() {
        error!("no backend servers configured, refusing to start");
        std::process::exit(1);
    }

    let metrics_registry = if config.metrics.enabled {
        Some(MetricsRegistry::new()?)
    } else {
        None
    };
    let metrics: Option<Arc<MetricsCollector>> = metrics_registry.as_ref().map(|r| r.collector());

    let forward_client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let forwarder = Arc::new(Forwarder::new(pool.clone(), forward_client, metrics.clone()));

    let health_checker = Arc::new(HealthChecker::with_metrics(
        config.health_check.clone(),
        pool.clone(),
        metrics.clone(),
    ));
    health_checker.start().await;

    if let Some(registry) = metrics_registry {
        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        start_metrics_server(metrics_addr, registry, config.metrics.path.clone()).await?;
    }

    let handler = RequestHandler::new(forwarder, metrics);

    let addr: SocketAddr = format!("{}:{}", config.lb_host, config.lb_port).parse()?;
    info!("starting load balancer on {}", addr);

    let serve_result = ServerBuilder::new(addr)
        .with_handler(handler)
        .serve_with_graceful_shutdown(shutdown_signal())
        .await;

    health_checker.stop().await;

    if let Err(e) = serve_result {
        error!("listener error: {}", e);
        std::process::exit(1);
    }

    info!("load balancer shut down cleanly");
    Ok(())
}

async fn start_metrics_server(addr: SocketAddr, registry: MetricsRegistry, path: String) -> Result<()> {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    if req.uri().path() == path.as_str() {
                        let metrics = registry.gather();
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(StatusCode::OK)
                                .header("Content-Type", "text/plain; version=0.0.4")
                                .body(Body::from(metrics))
                                .unwrap(),
                        )
                    } else {
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(StatusCode::NOT_FOUND)
                                .body(Body::from("Not Found"))
                                .unwrap(),
                        )
                    }
                }
            }))
        }
    });

    let server = Server::bind(&addr).serve(make_service);

    info!("metrics server listening on http://{}{}", addr, metrics_path.as_str());

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("metrics server error: {}", e);
        }
    });

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
