// demos/test_backend.rs
// Run with: cargo run --example test_backend -- <port>
//
// A minimal origin server for exercising the load balancer by hand: it
// answers `/health` according to a toggleable health flag and otherwise
// echoes back which backend and request number handled the call.

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
struct BackendState {
    port: u16,
    request_count: Arc<AtomicU64>,
    healthy: Arc<AtomicBool>,
}

async fn handle_request(
    req: Request<Body>,
    state: BackendState,
) -> Result<Response<Body>, Infallible> {
    let count = state.request_count.fetch_add(1, Ordering::SeqCst) + 1;
    let path = req.uri().path();

    println!("[backend {}] request #{}: {} {}", state.port, count, req.method(), path);

    if path == "/health" {
        return if state.healthy.load(Ordering::SeqCst) {
            Ok(Response::new(Body::from("OK")))
        } else {
            Ok(Response::builder()
                .status(StatusCode::SERVICE_UNAVAILABLE)
                .body(Body::from("Unhealthy"))
                .unwrap())
        };
    }

    let body = format!(
        "{{\"backend\": {}, \"request_count\": {}, \"path\": \"{}\"}}",
        state.port, count, path
    );

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("X-Backend-Port", state.port.to_string())
        .body(Body::from(body))
        .unwrap())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(9001);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let state = BackendState {
        port,
        request_count: Arc::new(AtomicU64::new(0)),
        healthy: Arc::new(AtomicBool::new(true)),
    };

    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle_request(req, state.clone()))) }
    });

    let server = Server::bind(&addr).serve(make_svc);

    println!("test backend listening on http://{}", addr);
    println!("health endpoint: http://{}/health", addr);

    if let Err(e) = server.await {
        eprintln!("server error: {}", e);
    }

    Ok(())
}
