//! Prometheus metrics endpoint
//!
//! Minimal Prometheus text exporter built on atomics and `parking_lot`:
//! counters, labelled counter families and histograms, held in a global
//! registry and rendered by [`metrics_handler`].

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters keyed by label values.
#[derive(Debug)]
pub struct CounterVec {
    label_names: Vec<&'static str>,
    entries: RwLock<BTreeMap<Vec<String>, Arc<Counter>>>,
}

impl CounterVec {
    fn new(label_names: &[&'static str]) -> Self {
        Self {
            label_names: label_names.to_vec(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn inc(&self, label_values: &[&str]) {
        self.with_label_values(label_values).inc();
    }

    pub fn get(&self, label_values: &[&str]) -> u64 {
        let key: Vec<String> = label_values.iter().map(|s| s.to_string()).collect();
        self.entries.read().get(&key).map(|c| c.get()).unwrap_or(0)
    }

    fn with_label_values(&self, label_values: &[&str]) -> Arc<Counter> {
        let key: Vec<String> = label_values.iter().map(|s| s.to_string()).collect();
        if let Some(counter) = self.entries.read().get(&key) {
            return Arc::clone(counter);
        }
        Arc::clone(self.entries.write().entry(key).or_default())
    }
}

/// Cumulative-bucket histogram.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<f64>,
    /// One slot per bucket plus `+Inf`.
    counts: Vec<AtomicU64>,
    /// f64 bits.
    sum: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = (0..=buckets.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum: AtomicU64::new(0.0_f64.to_bits()),
        }
    }

    pub fn observe(&self, val: f64) {
        for (i, bound) in self.buckets.iter().enumerate() {
            if val <= *bound {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.counts[self.buckets.len()].fetch_add(1, Ordering::Relaxed);
        let _ = self
            .sum
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + val).to_bits())
            });
    }

    pub fn count(&self) -> u64 {
        self.counts[self.buckets.len()].load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum.load(Ordering::Relaxed))
    }
}

#[derive(Debug)]
enum Metric {
    Counter(Arc<Counter>),
    CounterVec(Arc<CounterVec>),
    Histogram(Arc<Histogram>),
}

#[derive(Debug)]
struct Family {
    name: String,
    help: String,
    metric: Metric,
}

/// Registry of metric families in registration order.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    families: RwLock<Vec<Family>>,
}

/// The global singleton metrics registry.
pub static METRICS: LazyLock<MetricsRegistry> = LazyLock::new(MetricsRegistry::default);

impl MetricsRegistry {
    fn register(&self, name: &str, help: &str, metric: Metric) {
        self.families.write().push(Family {
            name: name.to_string(),
            help: help.to_string(),
            metric,
        });
    }

    pub fn register_counter(&self, name: &str, help: &str) -> Arc<Counter> {
        let counter = Arc::new(Counter::default());
        self.register(name, help, Metric::Counter(Arc::clone(&counter)));
        counter
    }

    pub fn register_counter_vec(
        &self,
        name: &str,
        help: &str,
        label_names: &[&'static str],
    ) -> Arc<CounterVec> {
        let vec = Arc::new(CounterVec::new(label_names));
        self.register(name, help, Metric::CounterVec(Arc::clone(&vec)));
        vec
    }

    pub fn register_histogram(&self, name: &str, help: &str, buckets: Vec<f64>) -> Arc<Histogram> {
        let histogram = Arc::new(Histogram::new(buckets));
        self.register(name, help, Metric::Histogram(Arc::clone(&histogram)));
        histogram
    }

    /// Render all families in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let families = self.families.read();
        let mut out = String::with_capacity(2048);

        for family in families.iter() {
            let kind = match family.metric {
                Metric::Counter(_) | Metric::CounterVec(_) => "counter",
                Metric::Histogram(_) => "histogram",
            };
            let _ = writeln!(out, "# HELP {} {}", family.name, family.help);
            let _ = writeln!(out, "# TYPE {} {}", family.name, kind);

            match &family.metric {
                Metric::Counter(counter) => {
                    let _ = writeln!(out, "{} {}", family.name, counter.get());
                }
                Metric::CounterVec(vec) => {
                    for (values, counter) in vec.entries.read().iter() {
                        let labels = format_labels(&vec.label_names, values);
                        let _ = writeln!(out, "{}{} {}", family.name, labels, counter.get());
                    }
                }
                Metric::Histogram(h) => render_histogram(&mut out, &family.name, h),
            }
        }

        out
    }
}

fn format_labels(names: &[&str], values: &[String]) -> String {
    let pairs: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{}=\"{}\"", name, escape_label_value(value)))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn render_histogram(out: &mut String, name: &str, h: &Histogram) {
    for (i, bound) in h.buckets.iter().enumerate() {
        let count = h.counts[i].load(Ordering::Relaxed);
        let _ = writeln!(out, "{}_bucket{{le=\"{}\"}} {}", name, bound, count);
    }
    let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, h.count());
    let _ = writeln!(out, "{}_sum {}", name, h.sum());
    let _ = writeln!(out, "{}_count {}", name, h.count());
}

/// Metric handles shared across the service.
pub struct StandardMetrics {
    /// Avatar responses by tier of the served image and HTTP status.
    pub avatar_responses_total: Arc<CounterVec>,
    /// Upstream adapters that produced nothing, by adapter name.
    pub avatar_source_misses_total: Arc<CounterVec>,
    /// Wall time of single upstream requests.
    pub upstream_fetch_seconds: Arc<Histogram>,
    /// Score submissions by outcome.
    pub leaderboard_submissions_total: Arc<CounterVec>,
    /// Leaderboard page reads by outcome.
    pub leaderboard_reads_total: Arc<CounterVec>,
}

/// Global standard metrics, lazily initialized.
pub static STD_METRICS: LazyLock<StandardMetrics> = LazyLock::new(init_standard_metrics);

pub fn init_standard_metrics() -> StandardMetrics {
    StandardMetrics {
        avatar_responses_total: METRICS.register_counter_vec(
            "sentient_race_avatar_responses_total",
            "Avatar responses served",
            &["tier", "status"],
        ),
        avatar_source_misses_total: METRICS.register_counter_vec(
            "sentient_race_avatar_source_misses_total",
            "Avatar source attempts that produced no image",
            &["source"],
        ),
        upstream_fetch_seconds: METRICS.register_histogram(
            "sentient_race_upstream_fetch_seconds",
            "Duration of upstream avatar requests",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 7.5],
        ),
        leaderboard_submissions_total: METRICS.register_counter_vec(
            "sentient_race_leaderboard_submissions_total",
            "Score submissions",
            &["outcome"],
        ),
        leaderboard_reads_total: METRICS.register_counter_vec(
            "sentient_race_leaderboard_reads_total",
            "Leaderboard page reads",
            &["outcome"],
        ),
    }
}

/// Axum handler that returns all metrics in Prometheus text exposition format.
pub async fn metrics_handler() -> Response {
    // Touch the standard set so a fresh process still exports its families.
    LazyLock::force(&STD_METRICS);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        METRICS.render(),
    )
        .into_response()
}
