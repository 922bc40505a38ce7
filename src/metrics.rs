//! Observability: timing histograms and outcome counters for the capture loop.
//! Timings are kept in fixed-size windows (most recent samples win) and
//! summarized as p50/p95/max; counters are monotonic for the process lifetime.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

const WINDOW: usize = 512;

/// Measures from creation until `finish`, recording into the registry.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    /// Record the elapsed time in milliseconds and return it.
    pub fn finish(self) -> f64 {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.registry.record(self.name, elapsed_ms);
        elapsed_ms
    }
}

#[derive(Default)]
struct Window {
    samples: VecDeque<f64>,
    total: u64,
}

impl Window {
    fn push(&mut self, value: f64) {
        if self.samples.len() == WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
        self.total += 1;
    }

    fn summarize(&self) -> TimingSummary {
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let pick = |p: f64| -> f64 {
            if sorted.is_empty() {
                return 0.0;
            }
            let idx = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
            sorted[idx.min(sorted.len() - 1)]
        };
        TimingSummary {
            p50_ms: pick(50.0),
            p95_ms: pick(95.0),
            max_ms: sorted.last().copied().unwrap_or(0.0),
            count: self.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingSummary {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    pub count: u64,
}

#[derive(Default)]
pub struct MetricsRegistry {
    timings: Mutex<HashMap<&'static str, Window>>,
    counters: Mutex<HashMap<&'static str, u64>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a duration sample in milliseconds.
    pub fn record(&self, name: &'static str, value_ms: f64) {
        self.timings.lock().entry(name).or_default().push(value_ms);
        tracing::trace!(metric = name, value_ms, "metric_recorded");
    }

    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    pub fn incr(&self, name: &'static str) {
        *self.counters.lock().entry(name).or_insert(0) += 1;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn timing(&self, name: &str) -> Option<TimingSummary> {
        self.timings.lock().get(name).map(Window::summarize)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let timings = self
            .timings
            .lock()
            .iter()
            .map(|(&name, w)| (name.to_string(), w.summarize()))
            .collect();
        let counters = self
            .counters
            .lock()
            .iter()
            .map(|(&name, &v)| (name.to_string(), v))
            .collect();
        MetricsSnapshot { timings, counters }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timings: HashMap<String, TimingSummary>,
    pub counters: HashMap<String, u64>,
}

/// Well-known metric names (constants to avoid typos).
pub mod metric_names {
    pub const CAPTURE: &str = "t_capture";
    pub const OCR: &str = "t_ocr";
    pub const TRANSLATE_CALL: &str = "t_translate_call";
    pub const BATCH: &str = "t_batch";
    pub const RENDER: &str = "t_render";

    pub const SKIPPED: &str = "texts_skipped";
    pub const STORE_HITS: &str = "store_hits";
    pub const EXTERNAL_CALLS: &str = "external_calls";
    pub const EXTERNAL_FAILURES: &str = "external_failures";
    pub const CANCELLED: &str = "texts_cancelled";
    pub const STORE_WRITE_FAILURES: &str = "store_write_failures";
}
