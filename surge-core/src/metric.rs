use crate::ConfigError;
use pdatastructs::tdigest::{TDigest, K1};
use serde::Serialize;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// Built-in metrics recorded by the runtime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub enum MetricName {
    Checks,
    HttpReqDuration,
    HttpReqFailed,
    HttpReqs,
    IterationDuration,
    Iterations,
    Vus,
    VusMax,
}

impl MetricName {
    pub const ALL: [MetricName; 8] = [
        MetricName::Checks,
        MetricName::HttpReqDuration,
        MetricName::HttpReqFailed,
        MetricName::HttpReqs,
        MetricName::IterationDuration,
        MetricName::Iterations,
        MetricName::Vus,
        MetricName::VusMax,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::Checks => "checks",
            MetricName::HttpReqDuration => "http_req_duration",
            MetricName::HttpReqFailed => "http_req_failed",
            MetricName::HttpReqs => "http_reqs",
            MetricName::IterationDuration => "iteration_duration",
            MetricName::Iterations => "iterations",
            MetricName::Vus => "vus",
            MetricName::VusMax => "vus_max",
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricName::HttpReqs | MetricName::Iterations => MetricKind::Counter,
            MetricName::HttpReqFailed | MetricName::Checks => MetricKind::Rate,
            MetricName::HttpReqDuration | MetricName::IterationDuration => MetricKind::Trend,
            MetricName::Vus | MetricName::VusMax => MetricKind::Gauge,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricName::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownMetric(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonic count; aggregations `count` and `rate` (per second).
    Counter,
    /// Share of non-zero samples; aggregation `rate`.
    Rate,
    /// Distribution of durations in milliseconds.
    Trend,
    /// Last observed value plus its extremes.
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Rate => "rate",
            MetricKind::Trend => "trend",
            MetricKind::Gauge => "gauge",
        }
    }
}

/// Point-in-time value of a single metric.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricValue {
    Counter { count: u64, rate: f64 },
    Rate { hits: u64, total: u64 },
    Trend(TrendValue),
    Gauge { value: f64, min: f64, max: f64 },
}

impl MetricValue {
    pub fn counter(count: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0. { count as f64 / secs } else { 0. };
        MetricValue::Counter { count, rate }
    }

    pub fn rate(hits: u64, total: u64) -> Self {
        MetricValue::Rate { hits, total }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter { .. } => MetricKind::Counter,
            MetricValue::Rate { .. } => MetricKind::Rate,
            MetricValue::Trend(_) => MetricKind::Trend,
            MetricValue::Gauge { .. } => MetricKind::Gauge,
        }
    }

    /// Whether any sample has been observed for this metric.
    pub fn has_samples(&self) -> bool {
        match self {
            MetricValue::Counter { .. } | MetricValue::Gauge { .. } => true,
            MetricValue::Rate { total, .. } => *total > 0,
            MetricValue::Trend(trend) => trend.count() > 0,
        }
    }

    pub fn rate_value(&self) -> Option<f64> {
        match self {
            MetricValue::Rate { hits, total } if *total > 0 => Some(*hits as f64 / *total as f64),
            MetricValue::Counter { rate, .. } => Some(*rate),
            _ => None,
        }
    }
}

/// Latency distribution backed by a t-digest. Values are milliseconds.
#[derive(Debug, Clone, Serialize)]
#[serde(into = "TrendSummary")]
pub struct TrendValue {
    digest: TDigest<K1>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Default for TrendValue {
    fn default() -> Self {
        Self::new()
    }
}

impl TrendValue {
    pub fn new() -> Self {
        Self {
            digest: default_tdigest(),
            count: 0,
            sum: 0.,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn from_samples(samples: &[f64]) -> Self {
        let mut trend = Self::new();
        for sample in samples {
            trend.insert(*sample);
        }
        trend
    }

    pub fn insert(&mut self, value: f64) {
        self.digest.insert(value);
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn insert_duration(&mut self, value: Duration) {
        self.insert(value.as_secs_f64() * 1_000.);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn avg(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(50.)
    }

    /// `p` is given in percent, `0.0..=100.0`.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }

        let value = self.digest.quantile(p / 100.);
        if value.is_finite() {
            // The digest interpolates between centroids and can land outside the observed range.
            Some(value.clamp(self.min, self.max))
        } else {
            error!("Non-finite percentile p({p}) from t-digest with {} samples", self.count);
            None
        }
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}

#[derive(Serialize)]
struct TrendSummary {
    count: u64,
    avg: Option<f64>,
    min: Option<f64>,
    med: Option<f64>,
    max: Option<f64>,
    #[serde(rename = "p(90)")]
    p90: Option<f64>,
    #[serde(rename = "p(95)")]
    p95: Option<f64>,
    #[serde(rename = "p(99)")]
    p99: Option<f64>,
}

impl From<TrendValue> for TrendSummary {
    fn from(trend: TrendValue) -> Self {
        Self {
            count: trend.count(),
            avg: trend.avg(),
            min: trend.min(),
            med: trend.med(),
            max: trend.max(),
            p90: trend.percentile(90.),
            p95: trend.percentile(95.),
            p99: trend.percentile(99.),
        }
    }
}

/// Every built-in metric at one instant of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    #[serde(skip)]
    pub elapsed: Duration,
    #[serde(flatten)]
    pub values: BTreeMap<MetricName, MetricValue>,
}

impl MetricsSnapshot {
    pub fn new(elapsed: Duration) -> Self {
        Self {
            elapsed,
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: MetricName, value: MetricValue) {
        self.values.insert(name, value);
    }

    pub fn get(&self, name: MetricName) -> Option<&MetricValue> {
        self.values.get(&name)
    }

    pub fn trend(&self, name: MetricName) -> Option<&TrendValue> {
        match self.values.get(&name) {
            Some(MetricValue::Trend(trend)) => Some(trend),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_round_trip_through_str() {
        for name in MetricName::ALL {
            assert_eq!(name.as_str().parse::<MetricName>().unwrap(), name);
        }
        assert!(matches!(
            "http_req_waiting".parse::<MetricName>(),
            Err(ConfigError::UnknownMetric(_))
        ));
    }

    #[test]
    fn trend_tracks_exact_extremes_and_mean() {
        let trend = TrendValue::from_samples(&[10., 20., 30., 40.]);
        assert_eq!(trend.count(), 4);
        assert_eq!(trend.min(), Some(10.));
        assert_eq!(trend.max(), Some(40.));
        assert_eq!(trend.avg(), Some(25.));
    }

    #[test]
    fn trend_percentiles_are_ordered_and_bounded() {
        let samples: Vec<f64> = (1..=1_000).map(f64::from).collect();
        let trend = TrendValue::from_samples(&samples);

        let p50 = trend.percentile(50.).unwrap();
        let p99 = trend.percentile(99.).unwrap();
        assert!((450. ..=550.).contains(&p50), "p50={p50}");
        assert!((970. ..=1_000.).contains(&p99), "p99={p99}");
        assert!(p50 < p99);
    }

    #[test]
    fn empty_trend_has_no_values() {
        let trend = TrendValue::new();
        assert_eq!(trend.avg(), None);
        assert_eq!(trend.percentile(99.), None);
        assert!(!MetricValue::Trend(trend).has_samples());
    }

    #[test]
    fn counter_rate_is_per_second() {
        let value = MetricValue::counter(300, Duration::from_secs(60));
        assert_eq!(value.rate_value(), Some(5.));
    }
}
