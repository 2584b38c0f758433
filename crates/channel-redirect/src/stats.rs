//! Atomic resolution counters.
//!
//! Display-only: nothing here feeds back into how a channel is resolved.
//! All atomics use `Relaxed` ordering.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::resolver::{RedirectTarget, ResolveError, ResolvedBy};

#[derive(Default)]
struct StatsInner {
    requests: AtomicU64,
    redirects: AtomicU64,
    fast_path: AtomicU64,
    races: AtomicU64,
    not_found: AtomicU64,
    no_valid_sources: AtomicU64,
    all_sources_down: AtomicU64,
}

/// Thread-safe resolution statistics. Cheap to clone (Arc).
#[derive(Clone, Default)]
pub struct ResolveStats {
    inner: Arc<StatsInner>,
}

/// Snapshot of current counter values, serializable to JSON.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub redirects: u64,
    pub fast_path: u64,
    pub races: u64,
    pub not_found: u64,
    pub no_valid_sources: u64,
    pub all_sources_down: u64,
}

impl ResolveStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished resolution.
    pub fn record(&self, result: &Result<RedirectTarget, ResolveError>) {
        let inner = &self.inner;
        inner.requests.fetch_add(1, Ordering::Relaxed);

        let counter = match result {
            Ok(target) => {
                inner.redirects.fetch_add(1, Ordering::Relaxed);
                match target.resolved_by {
                    ResolvedBy::FastPath => &inner.fast_path,
                    ResolvedBy::Race => &inner.races,
                }
            }
            Err(ResolveError::ChannelNotFound(_)) => &inner.not_found,
            Err(ResolveError::NoValidSources(_)) => &inner.no_valid_sources,
            Err(ResolveError::AllSourcesDown { .. }) => {
                inner.races.fetch_add(1, Ordering::Relaxed);
                &inner.all_sources_down
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = &self.inner;
        StatsSnapshot {
            requests: inner.requests.load(Ordering::Relaxed),
            redirects: inner.redirects.load(Ordering::Relaxed),
            fast_path: inner.fast_path.load(Ordering::Relaxed),
            races: inner.races.load(Ordering::Relaxed),
            not_found: inner.not_found.load(Ordering::Relaxed),
            no_valid_sources: inner.no_valid_sources.load(Ordering::Relaxed),
            all_sources_down: inner.all_sources_down.load(Ordering::Relaxed),
        }
    }
}
