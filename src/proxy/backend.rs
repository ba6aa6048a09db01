// src/proxy/backend.rs
//
// A `Backend` is just an identity plus the health flag the pool tracks for
// it. Consecutive success/failure counters live in the health checker,
// not here.

/// A point-in-time view of one known backend, as returned by
/// [`BackendPool::snapshot_backends`](super::pool::BackendPool::snapshot_backends).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub url: String,
    pub healthy: bool,
}
