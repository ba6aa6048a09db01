//
// src/proxy/pool.rs
//
// The server pool: a concurrency-safe registry of every known backend's
// health flag, plus the round-robin ring over the currently-healthy subset.
// One exclusive lock guards both structures (invariant I4); no I/O happens
// while it is held.

use super::backend::Backend;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Default)]
struct PoolState {
    /// Every known backend's health flag (invariants I1/I2).
    health: HashMap<String, bool>,
    /// Round-robin rotation of currently-healthy backends (invariant I3).
    ring: VecDeque<String>,
}

/// Concurrency-safe registry of backends plus round-robin selector.
///
/// Cheap to clone: the shared state lives behind an `Arc<Mutex<_>>`, so every
/// clone observes the same pool.
#[derive(Clone)]
pub struct BackendPool {
    inner: Arc<Mutex<PoolState>>,
}

impl BackendPool {
    /// Build a pool from an initial backend list. All entries start healthy;
    /// list order defines the initial ring order.
    pub fn new(urls: Vec<String>) -> Self {
        let mut health = HashMap::with_capacity(urls.len());
        let mut ring = VecDeque::with_capacity(urls.len());

        for url in urls {
            health.insert(url.clone(), true);
            ring.push_back(url);
        }

        Self {
            inner: Arc::new(Mutex::new(PoolState { health, ring })),
        }
    }

    /// Return the next URL in round-robin order, rotating the ring by one
    /// position. Returns `None` iff the ring is empty.
    pub fn next_healthy(&self) -> Option<String> {
        let mut state = self.inner.lock().unwrap();
        let url = state.ring.pop_front()?;
        state.ring.push_back(url.clone());
        Some(url)
    }

    /// Mark a known backend unhealthy and evict it from the ring. No-op if
    /// the URL is unknown or already absent from the ring.
    pub fn mark_unhealthy(&self, url: &str) {
        let mut state = self.inner.lock().unwrap();
        if let Some(flag) = state.health.get_mut(url) {
            *flag = false;
        }
        state.ring.retain(|u| u != url);
    }

    /// Mark a backend healthy, appending it to the tail of the ring if it
    /// isn't already rotating. Tail insertion, not at the cursor, avoids
    /// a thundering herd against a just-recovered host.
    pub fn mark_healthy(&self, url: &str) {
        let mut state = self.inner.lock().unwrap();
        state.health.insert(url.to_string(), true);
        if !state.ring.contains(&url.to_string()) {
            state.ring.push_back(url.to_string());
        }
    }

    /// Health flag for a known backend, or `None` if the URL is unknown.
    pub fn is_healthy(&self, url: &str) -> Option<bool> {
        self.inner.lock().unwrap().health.get(url).copied()
    }

    /// Read-consistent snapshot of the healthy ring, in rotation order.
    pub fn snapshot_healthy(&self) -> Vec<String> {
        self.inner.lock().unwrap().ring.iter().cloned().collect()
    }

    /// Read-consistent snapshot of every known backend's health flag.
    pub fn snapshot_all(&self) -> HashMap<String, bool> {
        self.inner.lock().unwrap().health.clone()
    }

    /// Read-consistent snapshot of every known backend as a `Backend` value.
    pub fn snapshot_backends(&self) -> Vec<Backend> {
        self.inner
            .lock()
            .unwrap()
            .health
            .iter()
            .map(|(url, &healthy)| Backend {
                url: url.clone(),
                healthy,
            })
            .collect()
    }

    /// Administrative add: appends a new healthy entry if `url` is unknown,
    /// else re-marks the existing entry healthy.
    pub fn add(&self, url: String) {
        self.mark_healthy(&url);
        info!(url = %url, "backend added to pool");
    }

    /// Administrative remove: drops `url` from both the mapping and the
    /// ring.
    pub fn remove(&self, url: &str) {
        let mut state = self.inner.lock().unwrap();
        state.health.remove(url);
        state.ring.retain(|u| u != url);
        info!(url = %url, "backend removed from pool");
    }

    /// Number of currently-healthy backends.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool3() -> BackendPool {
        BackendPool::new(vec![
            "http://a".to_string(),
            "http://b".to_string(),
            "http://c".to_string(),
        ])
    }

    #[test]
    fn round_robin_wraps_around() {
        let pool = pool3();
        assert_eq!(pool.next_healthy().as_deref(), Some("http://a"));
        assert_eq!(pool.next_healthy().as_deref(), Some("http://b"));
        assert_eq!(pool.next_healthy().as_deref(), Some("http://c"));
        assert_eq!(pool.next_healthy().as_deref(), Some("http://a"));
    }

    #[test]
    fn empty_pool_returns_none() {
        let pool = BackendPool::new(vec![]);
        assert_eq!(pool.next_healthy(), None);
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn mark_unhealthy_removes_from_ring_but_keeps_in_map() {
        let pool = pool3();
        pool.mark_unhealthy("http://b");

        assert_eq!(pool.is_healthy("http://b"), Some(false));
        assert_eq!(pool.snapshot_healthy(), vec!["http://a", "http://c"]);
        assert!(pool.snapshot_all().contains_key("http://b"));
    }

    #[test]
    fn mark_unhealthy_on_unknown_url_is_a_noop() {
        let pool = pool3();
        pool.mark_unhealthy("http://nowhere");
        assert_eq!(pool.snapshot_healthy().len(), 3);
    }

    #[test]
    fn mark_healthy_appends_to_tail_not_cursor() {
        let pool = pool3();
        pool.next_healthy(); // cursor now sits after "a"
        pool.mark_unhealthy("http://b");
        pool.mark_healthy("http://b");

        assert_eq!(pool.snapshot_healthy(), vec!["http://c", "http://a", "http://b"]);
    }

    #[test]
    fn mark_healthy_is_idempotent_for_already_rotating_backend() {
        let pool = pool3();
        pool.mark_healthy("http://a");
        assert_eq!(pool.snapshot_healthy(), vec!["http://a", "http://b", "http://c"]);
    }

    #[test]
    fn is_healthy_is_none_for_unknown_url() {
        let pool = pool3();
        assert_eq!(pool.is_healthy("http://nowhere"), None);
    }

    #[test]
    fn add_and_remove() {
        let pool = pool3();
        pool.add("http://d".to_string());
        assert_eq!(pool.len(), 4);

        pool.remove("http://a");
        assert_eq!(pool.is_healthy("http://a"), None);
        assert_eq!(pool.snapshot_healthy(), vec!["http://b", "http://c", "http://d"]);
    }

    #[test]
    fn remove_unknown_url_is_a_noop() {
        let pool = pool3();
        pool.remove("http://nowhere");
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn no_url_appears_twice_in_ring() {
        let pool = pool3();
        pool.mark_healthy("http://a");
        pool.mark_healthy("http://a");
        let ring = pool.snapshot_healthy();
        let unique: std::collections::HashSet<_> = ring.iter().collect();
        assert_eq!(ring.len(), unique.len());
    }

    #[test]
    fn round_robin_is_fair_over_many_calls() {
        let pool = pool3();
        let mut counts = HashMap::new();
        for _ in 0..301 {
            let url = pool.next_healthy().unwrap();
            *counts.entry(url).or_insert(0) += 1;
        }
        // 301 calls over 3 backends: each gets 100 or 101.
        for count in counts.values() {
            assert!(*count == 100 || *count == 101);
        }
    }
}
