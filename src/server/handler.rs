// src/server/handler.rs
use hyper::{Body, Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Instant;
use tower::Service;
use tracing::error;

use crate::metrics::MetricsCollector;
use crate::proxy::Forwarder;

#[derive(Clone)]
pub struct RequestHandler {
    forwarder: Arc<Forwarder>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RequestHandler {
    pub fn new(forwarder: Arc<Forwarder>, metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self { forwarder, metrics }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = std::convert::Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let forwarder = self.forwarder.clone();
        let metrics = self.metrics.clone();
        let method = req.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let response = match forwarder.forward(req).await {
                Ok(response) => response,
                Err(error) => {
                    error!(%error, "unhandled error forwarding request");
                    Response::builder()
                        .status(StatusCode::INTERNAL_SERVER_ERROR)
                        .body(Body::from("Internal Server Error"))
                        .unwrap()
                }
            };

            if let Some(metrics) = &metrics {
                metrics.record_request(&method, response.status().as_u16(), start.elapsed());
            }

            Ok(response)
        })
    }
}
