//! Per-backend outcome counters and a request duration histogram
//!
//! Everything is in memory and lock-free on the hot path; values
//! reset with the process. `render` produces the text exposition
//! format for an external scraper.

use dashmap::DashMap;
use log::trace;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::request::OutcomeClass;

pub const REQUESTS_TOTAL: &str = "backend_requests_total";
pub const REQUEST_DURATION: &str = "backend_request_duration_seconds";

/// Default duration buckets, in seconds
pub const DEFAULT_BUCKETS: [f64; 11] = [
  0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Counter key: (backend, model, outcome)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey
{   pub backend: String
  , pub model: String
  , pub outcome: String
}

/// Fixed-bucket histogram over seconds
#[derive(Debug)]
pub struct Histogram
{   bounds: Vec<f64>
  , /// Per-bucket counts; the last slot is +Inf
    counts: Vec<AtomicU64>
  , count: AtomicU64
  , /// Sum kept in microseconds so it fits an atomic
    sum_micros: AtomicU64
}

impl Histogram
{   pub fn new(bounds: &[f64]) -> Self
    {   let counts = (0..=bounds.len())
          .map(|_| AtomicU64::new(0))
          .collect();
        Histogram
        {   bounds: bounds.to_vec()
          , counts
          , count: AtomicU64::new(0)
          , sum_micros: AtomicU64::new(0)
        }
    }

    pub fn observe(&self, seconds: f64)
    {   let seconds = if seconds.is_finite() && seconds > 0.0
        {   seconds
        } else
        {   0.0
        };
        let idx = self.bounds
          .iter()
          .position(|&b| seconds <= b)
          .unwrap_or(self.bounds.len());
        self.counts[idx].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros.fetch_add(
          (seconds * 1_000_000.0) as u64,
          Ordering::Relaxed
        );
    }

    pub fn snapshot(&self) -> HistogramSnapshot
    {   let mut cumulative = 0;
        let buckets = self.counts
          .iter()
          .enumerate()
          .map(|(i, c)| {
            cumulative += c.load(Ordering::Relaxed);
            let bound = self.bounds
              .get(i)
              .copied()
              .unwrap_or(f64::INFINITY);
            (bound, cumulative)
          })
          .collect();
        HistogramSnapshot
        {   buckets
          , count: self.count.load(Ordering::Relaxed)
          , sum: self.sum_micros.load(Ordering::Relaxed) as f64
              / 1_000_000.0
        }
    }
}

/// Point-in-time histogram values
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot
{   /// (upper bound, cumulative count), last bound is +Inf
    pub buckets: Vec<(f64, u64)>
  , pub count: u64
  , pub sum: f64
}

/// Point-in-time view of the whole sink
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot
{   pub counters: Vec<(CounterKey, u64)>
  , pub duration: HistogramSnapshot
}

/// Shared metrics sink, safe for concurrent use from any task.
#[derive(Debug)]
pub struct MetricsSink
{   counters: DashMap<CounterKey, AtomicU64>
  , duration: Histogram
}

impl Default for MetricsSink
{   fn default() -> Self
    {   MetricsSink::new()
    }
}

impl MetricsSink
{   pub fn new() -> Self
    {   MetricsSink
        {   counters: DashMap::new()
          , duration: Histogram::new(&DEFAULT_BUCKETS)
        }
    }

    /// Count one call for (backend, model, outcome).
    pub fn record(
      &self
    , backend: &str
    , model: &str
    , outcome: OutcomeClass
    )
    {   trace!(
          "metric {} backend={} model={} outcome={}",
          REQUESTS_TOTAL, backend, model, outcome
        );
        let key = CounterKey
        {   backend: backend.to_string()
          , model: model.to_string()
          , outcome: outcome.as_str().to_string()
        };
        self.counters
          .entry(key)
          .or_insert_with(|| AtomicU64::new(0))
          .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duration(&self, seconds: f64)
    {   self.duration.observe(seconds);
    }

    /// Current value of one counter, 0 if never recorded.
    pub fn counter(
      &self
    , backend: &str
    , model: &str
    , outcome: OutcomeClass
    ) -> u64
    {   let key = CounterKey
        {   backend: backend.to_string()
          , model: model.to_string()
          , outcome: outcome.as_str().to_string()
        };
        self.counters
          .get(&key)
          .map(|c| c.load(Ordering::Relaxed))
          .unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot
    {   let mut counters: Vec<(CounterKey, u64)> = self.counters
          .iter()
          .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
          .collect();
        counters.sort_by(|a, b| a.0.cmp(&b.0));
        MetricsSnapshot
        {   counters
          , duration: self.duration.snapshot()
        }
    }

    /// Text exposition of every counter and the histogram.
    pub fn render(&self) -> String
    {   let snapshot = self.snapshot();
        let mut out = String::with_capacity(1024);

        let _ = writeln!(
          out, "# HELP {} Backend requests by outcome", REQUESTS_TOTAL
        );
        let _ = writeln!(out, "# TYPE {} counter", REQUESTS_TOTAL);
        for (key, value) in &snapshot.counters
        {   let _ = writeln!(
              out,
              "{}{{backend=\"{}\",model=\"{}\",outcome=\"{}\"}} {}",
              REQUESTS_TOTAL,
              escape_label(&key.backend),
              escape_label(&key.model),
              escape_label(&key.outcome),
              value
            );
        }

        let _ = writeln!(
          out, "# HELP {} Backend request duration", REQUEST_DURATION
        );
        let _ = writeln!(out, "# TYPE {} histogram", REQUEST_DURATION);
        for (bound, count) in &snapshot.duration.buckets
        {   let le = if bound.is_infinite()
            {   "+Inf".to_string()
            } else
            {   bound.to_string()
            };
            let _ = writeln!(
              out,
              "{}_bucket{{le=\"{}\"}} {}",
              REQUEST_DURATION, le, count
            );
        }
        let _ = writeln!(
          out, "{}_sum {}", REQUEST_DURATION, snapshot.duration.sum
        );
        let _ = writeln!(
          out, "{}_count {}", REQUEST_DURATION, snapshot.duration.count
        );
        out
    }
}

fn escape_label(value: &str) -> String
{   value
      .replace('\\', "\\\\")
      .replace('"', "\\\"")
      .replace('\n', "\\n")
}
