use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

/// Histograms keep at most this many recent observations.
const HISTOGRAM_WINDOW: usize = 4096;

/// Type of metric.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

/// One metric value as reported by [`MetricsRecorder::snapshot`].
#[derive(Clone, Debug, Serialize)]
pub struct MetricSample {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<(String, String)>,
    pub metric_type: MetricType,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<HistogramSummary>,
}

/// Point-in-time view of every recorded metric.
#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub metrics: Vec<MetricSample>,
}

impl MetricsSnapshot {
    /// Find a sample by name and exact label set.
    pub fn find(&self, name: &str, labels: &[(&str, &str)]) -> Option<&MetricSample> {
        let key = MetricKey::new(name, labels);
        self.metrics
            .iter()
            .find(|m| m.name == key.name && m.labels == key.labels)
    }
}

/// Summary statistics from a histogram window.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
}

struct Histogram {
    window: Mutex<VecDeque<f64>>,
    total_count: AtomicU64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            window: Mutex::new(VecDeque::new()),
            total_count: AtomicU64::new(0),
        }
    }

    fn observe(&self, value: f64) {
        let mut window = self.window.lock();
        if window.len() == HISTOGRAM_WINDOW {
            window.pop_front();
        }
        window.push_back(value);
        self.total_count.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self) -> HistogramSummary {
        let mut sorted: Vec<f64> = self.window.lock().iter().copied().collect();
        if sorted.is_empty() {
            return HistogramSummary::default();
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sorted.len();
        let at = |q: f64| sorted[((n as f64 * q) as usize).min(n - 1)];
        HistogramSummary {
            count: self.total_count.load(Ordering::Relaxed),
            sum: sorted.iter().sum(),
            max: sorted[n - 1],
            p50: at(0.5),
            p95: at(0.95),
        }
    }
}

/// Metric key: name + labels sorted by label name.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        labels.sort();
        Self {
            name: name.to_string(),
            labels,
        }
    }
}

/// Read-mostly map: the write lock is only taken the first time a key shows up.
fn with_entry<V, R>(
    map: &RwLock<HashMap<MetricKey, V>>,
    key: MetricKey,
    init: impl FnOnce() -> V,
    f: impl FnOnce(&V) -> R,
) -> R {
    if let Some(v) = map.read().get(&key) {
        return f(v);
    }
    let mut map = map.write();
    f(map.entry(key).or_insert_with(init))
}

/// Thread-safe in-process metrics recorder.
#[derive(Default)]
pub struct MetricsRecorder {
    counters: RwLock<HashMap<MetricKey, AtomicU64>>,
    // f64 stored as raw bits
    gauges: RwLock<HashMap<MetricKey, AtomicU64>>,
    histograms: RwLock<HashMap<MetricKey, Histogram>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by n.
    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        with_entry(&self.counters, MetricKey::new(name, labels), || AtomicU64::new(0), |c| {
            c.fetch_add(n, Ordering::Relaxed);
        });
    }

    /// Set a gauge to a specific value.
    pub fn gauge_set(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        with_entry(&self.gauges, MetricKey::new(name, labels), || AtomicU64::new(0), |g| {
            g.store(value.to_bits(), Ordering::Relaxed);
        });
    }

    /// Record a histogram observation.
    pub fn histogram_observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        with_entry(&self.histograms, MetricKey::new(name, labels), Histogram::new, |h| {
            h.observe(value);
        });
    }

    pub fn counter_get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = MetricKey::new(name, labels);
        self.counters
            .read()
            .get(&key)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn gauge_get(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        let key = MetricKey::new(name, labels);
        self.gauges
            .read()
            .get(&key)
            .map_or(0.0, |g| f64::from_bits(g.load(Ordering::Relaxed)))
    }

    pub fn histogram_summary(&self, name: &str, labels: &[(&str, &str)]) -> HistogramSummary {
        let key = MetricKey::new(name, labels);
        self.histograms
            .read()
            .get(&key)
            .map(Histogram::summary)
            .unwrap_or_default()
    }

    /// Collect every metric, sorted by name then labels.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut metrics = Vec::new();

        for (key, c) in self.counters.read().iter() {
            metrics.push(sample(key, MetricType::Counter, c.load(Ordering::Relaxed) as f64, None));
        }
        for (key, g) in self.gauges.read().iter() {
            let value = f64::from_bits(g.load(Ordering::Relaxed));
            metrics.push(sample(key, MetricType::Gauge, value, None));
        }
        for (key, h) in self.histograms.read().iter() {
            let summary = h.summary();
            metrics.push(sample(key, MetricType::Histogram, summary.p50, Some(summary)));
        }

        metrics.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
        MetricsSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            metrics,
        }
    }
}

fn sample(
    key: &MetricKey,
    metric_type: MetricType,
    value: f64,
    summary: Option<HistogramSummary>,
) -> MetricSample {
    MetricSample {
        name: key.name.clone(),
        labels: key.labels.clone(),
        metric_type,
        value,
        summary,
    }
}
