//! Shared per-upstream health counters for the /health endpoint.
//! Updated by the upstream adapters on every outbound call. The local store
//! is not an upstream and has no counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::api::latency::UpstreamLatency;
use crate::types::Source;

#[derive(Default)]
struct SourceCounters {
    successes: AtomicU64,
    failures: AtomicU64,
    /// Nanosecond timestamp of the last successful call (0 = none).
    last_success_at_ns: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct SourceHealth {
    pub source: Source,
    pub successes: u64,
    pub failures: u64,
    pub last_success_at_ns: Option<u64>,
}

/// Shared health metrics. Updated by adapters, read by API.
#[derive(Default)]
pub struct HealthState {
    counters: [SourceCounters; 5],
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, source: Source) -> &SourceCounters {
        let idx = Source::ALL.iter().position(|s| *s == source).unwrap_or(0);
        &self.counters[idx]
    }

    pub fn record_success(&self, source: Source) {
        let c = self.slot(source);
        c.successes.fetch_add(1, Ordering::Relaxed);
        c.last_success_at_ns.store(now_ns(), Ordering::Relaxed);
    }

    pub fn record_failure(&self, source: Source) {
        self.slot(source).failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Vec<SourceHealth> {
        Source::ALL
            .iter()
            .filter(|&&source| source != Source::Db)
            .map(|&source| {
                let c = self.slot(source);
                let last = c.last_success_at_ns.load(Ordering::Relaxed);
                SourceHealth {
                    source,
                    successes: c.successes.load(Ordering::Relaxed),
                    failures: c.failures.load(Ordering::Relaxed),
                    last_success_at_ns: (last > 0).then_some(last),
                }
            })
            .collect()
    }
}

/// Health counters plus latency histograms, handed to every adapter.
#[derive(Default)]
pub struct Metrics {
    pub health: HealthState,
    pub latency: UpstreamLatency,
}

impl Metrics {
    pub fn observe(&self, source: Source, elapsed: Duration, ok: bool) {
        self.latency.record(source, elapsed);
        if ok {
            self.health.record_success(source);
        } else {
            self.health.record_failure(source);
        }
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
