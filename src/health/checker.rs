// src/health/checker.rs
//
// Background health checker: periodically probes every known backend and
// promotes/demotes it in the pool after consecutive-success and
// consecutive-failure thresholds are met (hysteresis). Per-backend
// counters are owned by this task alone, never exposed to or stored in
// the pool.

use crate::config::HealthCheckConfig;
use crate::metrics::MetricsCollector;
use crate::proxy::BackendPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Per-backend hysteresis counters, local to the checker task.
#[derive(Default, Clone, Copy)]
struct Counters {
    successes: u32,
    failures: u32,
}

pub struct HealthChecker {
    config: HealthCheckConfig,
    pool: BackendPool,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthChecker {
    pub fn new(config: HealthCheckConfig, pool: BackendPool) -> Self {
        Self::with_metrics(config, pool, None)
    }

    pub fn with_metrics(
        config: HealthCheckConfig,
        pool: BackendPool,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            pool,
            metrics,
            shutdown_tx,
            shutdown_rx,
            task: Mutex::new(None),
        }
    }

    /// Start the background probing task. Idempotent: calling `start`
    /// while already running is a no-op.
    pub async fn start(self: &std::sync::Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }

        let _ = self.shutdown_tx.send(false);

        let client = reqwest::Client::builder()
            .timeout(self.config.timeout())
            .build()
            .expect("failed to build health-check HTTP client");

        let checker = self.clone();
        let shutdown_rx = self.shutdown_rx.clone();

        info!(
            interval_secs = self.config.interval_secs,
            path = %self.config.normalized_path(),
            "starting health checker"
        );

        *task = Some(tokio::spawn(async move {
            checker.run(client, shutdown_rx).await;
        }));
    }

    /// Stop the background task and tear down its HTTP client. Idempotent
    /// after a successful stop.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        let Some(handle) = task.take() else {
            return;
        };

        let _ = self.shutdown_tx.send(true);
        let _ = handle.await;
        info!("health checker stopped");
    }

    async fn run(
        self: std::sync::Arc<Self>,
        client: reqwest::Client,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut counters: HashMap<String, Counters> = HashMap::new();
        let mut ticker = interval(self.config.interval());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep(&client, &mut counters).await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("health checker observed shutdown signal");
                        break;
                    }
                }
            }
        }
    }

    async fn sweep(&self, client: &reqwest::Client, counters: &mut HashMap<String, Counters>) {
        let known = self.pool.snapshot_all();
        if known.is_empty() {
            return;
        }

        let mut healthy_count = 0;
        let mut unhealthy_count = 0;

        for url in known.keys() {
            let healthy = self.probe(client, url).await;
            self.update_counters(url, healthy, counters);
            if healthy {
                healthy_count += 1;
            } else {
                unhealthy_count += 1;
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_counts(healthy_count, unhealthy_count + healthy_count);
        }

        debug!(healthy_count, unhealthy_count, "health check sweep complete");
    }

    fn update_counters(&self, url: &str, healthy: bool, counters: &mut HashMap<String, Counters>) {
        let entry = counters.entry(url.to_string()).or_default();

        if healthy {
            entry.failures = 0;
            entry.successes += 1;

            if entry.successes >= self.config.healthy_threshold
                && self.pool.is_healthy(url) != Some(true)
            {
                info!(url, successes = entry.successes, "backend recovered, marking healthy");
                self.pool.mark_healthy(url);
                entry.successes = 0;
                if let Some(metrics) = &self.metrics {
                    metrics.update_backend_health(url, true);
                }
            }
        } else {
            entry.successes = 0;
            entry.failures += 1;

            if entry.failures >= self.config.unhealthy_threshold
                && self.pool.is_healthy(url) == Some(true)
            {
                warn!(url, failures = entry.failures, "backend failed health check, marking unhealthy");
                self.pool.mark_unhealthy(url);
                entry.failures = 0;
                if let Some(metrics) = &self.metrics {
                    metrics.update_backend_health(url, false);
                }
            }
        }
    }

    /// Probe a single backend. A probe is a success iff the response
    /// arrives within the timeout and its status matches
    /// `expected_status`; any transport error, timeout, or status mismatch
    /// is a failure.
    async fn probe(&self, client: &reqwest::Client, url: &str) -> bool {
        let method = reqwest::Method::from_bytes(self.config.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);
        let target = format!("{}{}", url.trim_end_matches('/'), self.config.normalized_path());

        match client.request(method, &target).send().await {
            Ok(response) => {
                let healthy = response.status().as_u16() == self.config.expected_status;
                if !healthy {
                    debug!(
                        url,
                        status = response.status().as_u16(),
                        expected = self.config.expected_status,
                        "health probe returned unexpected status"
                    );
                }
                healthy
            }
            Err(error) => {
                debug!(url, %error, "health probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::BackendPool;
    use std::sync::Arc;

    fn config(healthy_threshold: u32, unhealthy_threshold: u32) -> HealthCheckConfig {
        HealthCheckConfig {
            interval_secs: 0.05,
            timeout_secs: 0.2,
            path: "/health".to_string(),
            method: "GET".to_string(),
            expected_status: 200,
            healthy_threshold,
            unhealthy_threshold,
        }
    }

    #[tokio::test]
    async fn hysteresis_demotes_only_after_threshold() {
        let pool = BackendPool::new(vec!["http://example.invalid".to_string()]);
        let checker = HealthChecker::new(config(2, 2), pool.clone());
        let mut counters = HashMap::new();

        checker.update_counters("http://example.invalid", false, &mut counters);
        assert_eq!(pool.is_healthy("http://example.invalid"), Some(true));

        checker.update_counters("http://example.invalid", false, &mut counters);
        assert_eq!(pool.is_healthy("http://example.invalid"), Some(false));
    }

    #[tokio::test]
    async fn hysteresis_promotes_only_after_threshold() {
        let pool = BackendPool::new(vec!["http://example.invalid".to_string()]);
        pool.mark_unhealthy("http://example.invalid");
        let checker = HealthChecker::new(config(2, 2), pool.clone());
        let mut counters = HashMap::new();

        checker.update_counters("http://example.invalid", true, &mut counters);
        assert_eq!(pool.is_healthy("http://example.invalid"), Some(false));

        checker.update_counters("http://example.invalid", true, &mut counters);
        assert_eq!(pool.is_healthy("http://example.invalid"), Some(true));
    }

    #[tokio::test]
    async fn counters_reset_on_transition_so_single_flip_does_not_reverse() {
        let pool = BackendPool::new(vec!["http://example.invalid".to_string()]);
        let checker = HealthChecker::new(config(2, 2), pool.clone());
        let mut counters = HashMap::new();

        checker.update_counters("http://example.invalid", false, &mut counters);
        checker.update_counters("http://example.invalid", false, &mut counters);
        assert_eq!(pool.is_healthy("http://example.invalid"), Some(false));

        // A single success after demotion must not immediately re-promote.
        checker.update_counters("http://example.invalid", true, &mut counters);
        assert_eq!(pool.is_healthy("http://example.invalid"), Some(false));
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let pool = BackendPool::new(vec!["http://example.invalid".to_string()]);
        let checker = Arc::new(HealthChecker::new(config(1, 1), pool));

        checker.start().await;
        checker.start().await;
        assert!(checker.task.lock().await.is_some());

        checker.stop().await;
        assert!(checker.task.lock().await.is_none());
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop() {
        let pool = BackendPool::new(vec![]);
        let checker = HealthChecker::new(config(1, 1), pool);
        checker.stop().await;
    }
}
