//! In-memory latency histograms for outbound upstream calls.
//! Adapters record the wall time of every request, the API reads percentiles.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::types::Source;

/// Shared latency stats. Values stored in microseconds.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl LatencyStats {
    /// Create a new histogram. Tracks 1us to 100s, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 100_000_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record_us(&self, us: u64) {
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(us.clamp(1, 100_000_000));
        }
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().min(u128::from(u64::MAX)) as u64;
        self.record_us(us);
    }

    /// Return (p50_us, p95_us, p99_us). None if no samples.
    pub fn percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        let Ok(h) = self.inner.lock() else {
            return (None, None, None);
        };
        if h.len() == 0 {
            return (None, None, None);
        }
        (
            Some(h.value_at_quantile(0.5)),
            Some(h.value_at_quantile(0.95)),
            Some(h.value_at_quantile(0.99)),
        )
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().map(|h| h.len()).unwrap_or(0)
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct LatencySummary {
    pub source: Source,
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

/// One histogram per upstream source.
#[derive(Default)]
pub struct UpstreamLatency {
    primary: LatencyStats,
    league: LatencyStats,
    live: LatencyStats,
    odds: LatencyStats,
}

impl UpstreamLatency {
    fn slot(&self, source: Source) -> Option<&LatencyStats> {
        match source {
            Source::Primary => Some(&self.primary),
            Source::League => Some(&self.league),
            Source::Live => Some(&self.live),
            Source::Odds => Some(&self.odds),
            Source::Db => None,
        }
    }

    pub fn record(&self, source: Source, d: Duration) {
        if let Some(stats) = self.slot(source) {
            stats.record(d);
        }
    }

    pub fn summary(&self) -> Vec<LatencySummary> {
        let to_ms = |us: Option<u64>| us.map(|v| v as f64 / 1000.0);
        Source::ALL
            .iter()
            .filter_map(|&source| {
                let stats = self.slot(source)?;
                let (p50, p95, p99) = stats.percentiles();
                Some(LatencySummary {
                    source,
                    samples: stats.len(),
                    p50_ms: to_ms(p50),
                    p95_ms: to_ms(p95),
                    p99_ms: to_ms(p99),
                })
            })
            .collect()
    }
}
