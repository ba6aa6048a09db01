// src/proxy/forwarder.rs
//
// The request forwarder: per-request backend selection, outbound
// forwarding, retry across the remaining healthy backends on transport
// failure, and error-response synthesis when every attempt fails.
//
// Hop-by-hop headers (`Connection`, `Keep-Alive`, `Transfer-Encoding`, ...)
// are deliberately NOT stripped from either direction. This is a
// transparent proxy.

use hyper::body::Bytes;
use hyper::header::HeaderMap;
use hyper::{Body, Method, Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::pool::BackendPool;
use crate::metrics::MetricsCollector;

/// Errors that escape [`Forwarder::forward`] itself, as opposed to
/// transport errors against a backend (which are caught per attempt and
/// turned into a synthesized response, see [`error_response`]).
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to read request body: {0}")]
    BodyRead(#[from] hyper::Error),
}

/// Per-attempt transport failure, classified for the error-response table.
#[derive(Debug, thiserror::Error)]
enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("could not connect to backend")]
    Connect,
    #[error("transport error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

pub struct Forwarder {
    pool: BackendPool,
    client: reqwest::Client,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Forwarder {
    pub fn new(pool: BackendPool, client: reqwest::Client, metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self {
            pool,
            client,
            metrics,
        }
    }

    /// Forward one inbound request, retrying across the healthy snapshot
    /// taken at entry.
    pub async fn forward(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let snapshot = self.pool.snapshot_healthy();
        if snapshot.is_empty() {
            warn!("no healthy backends available");
            return Ok(service_unavailable());
        }

        let (parts, body) = req.into_parts();
        // Cached once so every retry attempt replays the identical body.
        let body_bytes = hyper::body::to_bytes(body).await?;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_string();

        let mut last_error: Option<TransportError> = None;
        let mut attempted = false;

        for _ in 0..snapshot.len() {
            let Some(backend_url) = self.pool.next_healthy() else {
                break;
            };
            attempted = true;

            let target = format!("{backend_url}{path_and_query}");
            let start = Instant::now();

            info!(backend = %backend_url, method = %parts.method, path = %path_and_query, "forwarding request");

            match self
                .send(&parts.method, &parts.headers, body_bytes.clone(), &target)
                .await
            {
                Ok(response) => {
                    let elapsed = start.elapsed();
                    info!(
                        backend = %backend_url,
                        status = response.status().as_u16(),
                        latency_ms = elapsed.as_millis() as u64,
                        "received backend response"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_backend_request(&backend_url, true, elapsed);
                    }
                    return Ok(response);
                }
                Err(error) => {
                    warn!(backend = %backend_url, %error, "transport error forwarding request, demoting backend");
                    self.pool.mark_unhealthy(&backend_url);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_backend_request(&backend_url, false, start.elapsed());
                    }
                    last_error = Some(error);
                }
            }
        }

        if !attempted {
            return Ok(service_unavailable());
        }

        Ok(error_response(last_error))
    }

    /// Issue one outbound attempt. The original method, inbound headers,
    /// and cached body are forwarded verbatim; redirects are never
    /// followed (the client is built with `redirect::Policy::none()`).
    async fn send(
        &self,
        method: &Method,
        headers: &HeaderMap,
        body: Bytes,
        target: &str,
    ) -> Result<Response<Body>, TransportError> {
        let reqwest_method = Method::as_str(method);
        let reqwest_method = reqwest::Method::from_bytes(reqwest_method.as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut builder = self
            .client
            .request(reqwest_method, target)
            .headers(headers.clone());

        if !body.is_empty() {
            builder = builder.body(body);
        }

        let response = builder.send().await?;

        // Any status the backend returns, including 5xx, is a successful
        // forward. It is relayed to the client verbatim, not retried.
        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let response_headers = response.headers().clone();
        let body_bytes = response.bytes().await?;

        let mut builder = Response::builder().status(status);
        if let Some(header_map) = builder.headers_mut() {
            *header_map = response_headers;
        }
        Ok(builder.body(Body::from(body_bytes)).unwrap())
    }
}

fn service_unavailable() -> Response<Body> {
    Response::builder()
        .status(StatusCode::SERVICE_UNAVAILABLE)
        .body(Body::from(
            "Service Unavailable: No backend servers available",
        ))
        .unwrap()
}

fn error_response(error: Option<TransportError>) -> Response<Body> {
    let (status, message) = match error {
        Some(TransportError::Timeout) => (
            StatusCode::GATEWAY_TIMEOUT,
            "Gateway Timeout: Backend server did not respond in time",
        ),
        Some(TransportError::Connect) => (
            StatusCode::BAD_GATEWAY,
            "Bad Gateway: Cannot connect to backend server",
        ),
        Some(TransportError::Other(_)) => (
            StatusCode::BAD_GATEWAY,
            "Bad Gateway: Error communicating with backend server",
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable: No backend servers available",
        ),
    };

    Response::builder()
        .status(status)
        .body(Body::from(message))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_maps_timeout_to_504() {
        let resp = error_response(Some(TransportError::Timeout));
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn error_response_maps_connect_to_502() {
        let resp = error_response(Some(TransportError::Connect));
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn error_response_maps_no_attempts_to_503() {
        let resp = error_response(None);
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
