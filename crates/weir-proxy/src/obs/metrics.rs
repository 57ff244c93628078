//! In-process metrics registry for the proxy.
//!
//! Instruments are defined once on an explicitly constructed [`Registry`] and
//! handed out as `Arc` handles. Labeled counters key their instances by the
//! label values in a `DashMap`, so lazy creation of a new combination happens
//! under the shard lock and two concurrent first uses share one instance.
//! Label arity is part of the type (`CounterVec<N>`), so a call with the wrong
//! number of values does not compile.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use weir_core::error::{Result, WeirError};

/// Fully qualified metric identity: `namespace_subsystem_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricName {
    pub namespace: &'static str,
    pub subsystem: &'static str,
    pub name: &'static str,
}

impl MetricName {
    pub const fn new(namespace: &'static str, subsystem: &'static str, name: &'static str) -> Self {
        Self { namespace, subsystem, name }
    }

    pub fn fq_name(&self) -> String {
        [self.namespace, self.subsystem, self.name]
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Definition-time options shared by every instrument kind.
#[derive(Debug, Clone, Copy)]
pub struct Opts {
    pub name: MetricName,
    pub help: &'static str,
}

impl Opts {
    pub const fn new(name: MetricName, help: &'static str) -> Self {
        Self { name, help }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

/// `{k1="v1",k2="v2"}`, or empty when there are no labels.
fn label_block(keys: &[&str], values: &[String]) -> String {
    let parts: Vec<String> = keys
        .iter()
        .zip(values)
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", parts.join(","))
    }
}

/// Anything the registry can render in Prometheus text exposition format.
trait Collect: Send + Sync {
    fn collect(&self, fq_name: &str, out: &mut String);
}

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Increment by 1.
    pub fn inc(&self) {
        self.add(1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, v: u64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Collect for Counter {
    fn collect(&self, fq_name: &str, out: &mut String) {
        let _ = writeln!(out, "{} {}", fq_name, self.get());
    }
}

/// Counter partitioned by `N` labels.
#[derive(Debug)]
pub struct CounterVec<const N: usize> {
    label_keys: [&'static str; N],
    map: DashMap<[String; N], Arc<Counter>>,
}

impl<const N: usize> CounterVec<N> {
    fn new(label_keys: [&'static str; N]) -> Self {
        Self {
            label_keys,
            map: DashMap::new(),
        }
    }

    pub fn label_keys(&self) -> &[&'static str; N] {
        &self.label_keys
    }

    /// Instance for this label combination, created on first use.
    pub fn with_label_values(&self, values: [&str; N]) -> Arc<Counter> {
        let key = values.map(String::from);
        if let Some(c) = self.map.get(&key) {
            return Arc::clone(c.value());
        }
        let entry = self.map.entry(key).or_insert_with(|| Arc::new(Counter::default()));
        Arc::clone(entry.value())
    }

    /// Increment by 1.
    pub fn inc(&self, values: [&str; N]) {
        self.add(values, 1);
    }

    /// Increment by an arbitrary value.
    pub fn add(&self, values: [&str; N], v: u64) {
        self.with_label_values(values).add(v);
    }

    /// Current value; 0 for a combination never observed.
    pub fn get(&self, values: [&str; N]) -> u64 {
        let key = values.map(String::from);
        self.map.get(&key).map(|c| c.get()).unwrap_or(0)
    }

    /// Number of live label combinations.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<const N: usize> Collect for CounterVec<N> {
    fn collect(&self, fq_name: &str, out: &mut String) {
        let mut series: Vec<([String; N], u64)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), r.value().get()))
            .collect();
        series.sort();
        for (values, v) in series {
            let labels = label_block(&self.label_keys, &values);
            let _ = writeln!(out, "{}{} {}", fq_name, labels, v);
        }
    }
}

/// Unlabeled value that can go up and down.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.add(1);
    }

    /// Decrement by 1.
    pub fn dec(&self) {
        self.add(-1);
    }

    /// Add an arbitrary signed delta.
    pub fn add(&self, v: i64) {
        self.value.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Collect for Gauge {
    fn collect(&self, fq_name: &str, out: &mut String) {
        let _ = writeln!(out, "{} {}", fq_name, self.get());
    }
}

/// `count` bounds starting at `start`, each `factor` times the previous.
pub fn exponential_buckets(start: f64, factor: f64, count: usize) -> Result<Vec<f64>> {
    if count < 1 {
        return Err(WeirError::InvalidMetric(
            "exponential_buckets needs a positive count".into(),
        ));
    }
    if !start.is_finite() || start <= 0.0 {
        return Err(WeirError::InvalidMetric(format!(
            "exponential_buckets start must be positive, got {start}"
        )));
    }
    if !factor.is_finite() || factor <= 1.0 {
        return Err(WeirError::InvalidMetric(format!(
            "exponential_buckets factor must be greater than 1, got {factor}"
        )));
    }
    let mut out = Vec::with_capacity(count);
    let mut b = start;
    for _ in 0..count {
        out.push(b);
        b *= factor;
    }
    Ok(out)
}

#[derive(Debug)]
struct HistogramState {
    // Per-bucket (non-cumulative) counts; the last slot is +Inf.
    buckets: Vec<u64>,
    count: u64,
    sum: f64,
}

/// Point-in-time histogram view with cumulative bucket counts.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// `(upper_bound, cumulative_count)`, excluding +Inf.
    pub buckets: Vec<(f64, u64)>,
    pub count: u64,
    pub sum: f64,
}

/// Distribution over buckets fixed at definition time.
///
/// One short critical section per observation keeps count, sum, and buckets
/// mutually consistent for readers.
#[derive(Debug)]
pub struct Histogram {
    upper_bounds: Vec<f64>,
    state: Mutex<HistogramState>,
}

impl Histogram {
    fn new(upper_bounds: Vec<f64>) -> Self {
        let slots = upper_bounds.len() + 1;
        Self {
            upper_bounds,
            state: Mutex::new(HistogramState {
                buckets: vec![0; slots],
                count: 0,
                sum: 0.0,
            }),
        }
    }

    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper_bounds
    }

    /// Record one sample. NaN samples are dropped: they would poison `sum`
    /// for the rest of the process.
    pub fn observe(&self, v: f64) {
        if v.is_nan() {
            return;
        }
        let idx = self.upper_bounds.partition_point(|&b| b < v);
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        st.buckets[idx] += 1;
        st.count += 1;
        st.sum += v;
    }

    /// Observe a duration in microseconds.
    pub fn observe_duration(&self, d: Duration) {
        self.observe(d.as_micros() as f64);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut acc = 0u64;
        let buckets = self
            .upper_bounds
            .iter()
            .zip(&st.buckets)
            .map(|(&le, &n)| {
                acc += n;
                (le, acc)
            })
            .collect();
        HistogramSnapshot {
            buckets,
            count: st.count,
            sum: st.sum,
        }
    }
}

impl Collect for Histogram {
    fn collect(&self, fq_name: &str, out: &mut String) {
        let snap = self.snapshot();
        for (le, n) in &snap.buckets {
            let _ = writeln!(out, "{}_bucket{{le=\"{}\"}} {}", fq_name, le, n);
        }
        let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", fq_name, snap.count);
        let _ = writeln!(out, "{}_sum {}", fq_name, snap.sum);
        let _ = writeln!(out, "{}_count {}", fq_name, snap.count);
    }
}

struct Entry {
    fq_name: String,
    help: &'static str,
    kind: MetricKind,
    collector: Arc<dyn Collect>,
}

fn valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_name(name: &MetricName) -> Result<String> {
    if name.name.is_empty() {
        return Err(WeirError::InvalidMetric("metric name must not be empty".into()));
    }
    let fq = name.fq_name();
    if !valid_ident(&fq) {
        return Err(WeirError::InvalidMetric(format!("invalid metric name: {fq}")));
    }
    Ok(fq)
}

fn validate_label_keys(fq: &str, keys: &[&str]) -> Result<()> {
    for (i, k) in keys.iter().enumerate() {
        if !valid_ident(k) || k.starts_with("__") || *k == "le" {
            return Err(WeirError::InvalidMetric(format!(
                "invalid label key '{k}' for metric {fq}"
            )));
        }
        if keys[..i].contains(k) {
            return Err(WeirError::InvalidMetric(format!(
                "duplicate label key '{k}' for metric {fq}"
            )));
        }
    }
    Ok(())
}

fn validate_buckets(fq: &str, bounds: &[f64]) -> Result<()> {
    if bounds.is_empty() {
        return Err(WeirError::InvalidMetric(format!("{fq}: histogram needs buckets")));
    }
    if bounds.iter().any(|b| !b.is_finite()) {
        return Err(WeirError::InvalidMetric(format!("{fq}: bucket bounds must be finite")));
    }
    if bounds.windows(2).any(|w| w[0] >= w[1]) {
        return Err(WeirError::InvalidMetric(format!(
            "{fq}: bucket bounds must be strictly increasing"
        )));
    }
    Ok(())
}

/// Owns every instrument of the process. Each name may be defined once.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<Vec<Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register<T: Collect + 'static>(
        &self,
        opts: Opts,
        kind: MetricKind,
        label_keys: &[&str],
        collector: T,
    ) -> Result<Arc<T>> {
        let fq_name = validate_name(&opts.name)?;
        validate_label_keys(&fq_name, label_keys)?;

        let collector = Arc::new(collector);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.iter().any(|e| e.fq_name == fq_name) {
            tracing::error!(metric = %fq_name, "metric defined twice");
            return Err(WeirError::AlreadyRegistered(fq_name));
        }
        tracing::debug!(metric = %fq_name, kind = kind.as_str(), labels = ?label_keys, "metric registered");
        entries.push(Entry {
            fq_name,
            help: opts.help,
            kind,
            collector: Arc::clone(&collector) as Arc<dyn Collect>,
        });
        Ok(collector)
    }

    pub fn counter(&self, opts: Opts) -> Result<Arc<Counter>> {
        self.register(opts, MetricKind::Counter, &[], Counter::default())
    }

    pub fn counter_vec<const N: usize>(
        &self,
        opts: Opts,
        label_keys: [&'static str; N],
    ) -> Result<Arc<CounterVec<N>>> {
        self.register(opts, MetricKind::Counter, &label_keys, CounterVec::new(label_keys))
    }

    pub fn gauge(&self, opts: Opts) -> Result<Arc<Gauge>> {
        self.register(opts, MetricKind::Gauge, &[], Gauge::default())
    }

    pub fn histogram(&self, opts: Opts, buckets: Vec<f64>) -> Result<Arc<Histogram>> {
        validate_buckets(&opts.name.fq_name(), &buckets)?;
        self.register(opts, MetricKind::Histogram, &[], Histogram::new(buckets))
    }

    /// Fully qualified names, in definition order.
    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().map(|e| e.fq_name.clone()).collect()
    }

    /// Render in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = String::new();
        for e in entries.iter() {
            let _ = writeln!(out, "# HELP {} {}", e.fq_name, escape_help(e.help));
            let _ = writeln!(out, "# TYPE {} {}", e.fq_name, e.kind.as_str());
            e.collector.collect(&e.fq_name, &mut out);
        }
        out
    }
}
