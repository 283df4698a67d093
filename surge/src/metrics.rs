use metrics_util::AtomicBucket;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use surge_core::{CheckResult, MetricName, MetricValue, MetricsSnapshot, TrendValue};
use tokio::time::Instant;

/// Sink for every built-in metric of a run, shared by all VUs of all scenarios.
pub(crate) struct RunMetrics {
    started: Instant,
    http_reqs: AtomicU64,
    http_req_failed: RateSink,
    http_req_duration: TrendSink,
    iterations: AtomicU64,
    iteration_duration: TrendSink,
    checks: RateSink,
    check_results: Mutex<Vec<CheckResult>>,
    vus: GaugeSink,
}

impl RunMetrics {
    pub fn new() -> Self {
        #[cfg(feature = "metrics")]
        describe();

        Self {
            started: Instant::now(),
            http_reqs: AtomicU64::new(0),
            http_req_failed: RateSink::default(),
            http_req_duration: TrendSink::default(),
            iterations: AtomicU64::new(0),
            iteration_duration: TrendSink::default(),
            checks: RateSink::default(),
            check_results: Mutex::new(vec![]),
            vus: GaugeSink::default(),
        }
    }

    pub fn record_http(&self, duration: Duration, failed: bool) {
        self.http_reqs.fetch_add(1, Ordering::Relaxed);
        self.http_req_failed.record(failed);
        self.http_req_duration.record(duration);

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("http_reqs").increment(1);
            if failed {
                metrics::counter!("http_req_failed").increment(1);
            }
            metrics::histogram!("http_req_duration").record(duration.as_secs_f64() * 1_000.);
        }
    }

    pub fn record_iteration(&self, duration: Duration) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        self.iteration_duration.record(duration);

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("iterations").increment(1);
            metrics::histogram!("iteration_duration").record(duration.as_secs_f64() * 1_000.);
        }
    }

    pub fn record_check(&self, name: &str, passed: bool) {
        // A passing check is the "hit" of the `checks` rate.
        self.checks.record(passed);

        {
            let mut results = self
                .check_results
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let idx = match results.iter().position(|c| c.name == name) {
                Some(idx) => idx,
                None => {
                    results.push(CheckResult {
                        name: name.to_string(),
                        passes: 0,
                        fails: 0,
                    });
                    results.len() - 1
                }
            };
            let result = &mut results[idx];
            if passed {
                result.passes += 1;
            } else {
                result.fails += 1;
            }
        }

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "checks",
            "check" => name.to_string(),
            "result" => if passed { "pass" } else { "fail" }
        )
        .increment(1);
    }

    /// Count a VU as running until the returned guard is dropped.
    pub fn vu_started(self: &Arc<Self>) -> VuGuard {
        self.vus.increment();
        VuGuard {
            metrics: self.clone(),
        }
    }

    #[cfg(test)]
    pub fn active_vus(&self) -> u64 {
        self.vus.value.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let elapsed = self.elapsed();
        let mut snapshot = MetricsSnapshot::new(elapsed);

        snapshot.insert(
            MetricName::HttpReqs,
            MetricValue::counter(self.http_reqs.load(Ordering::Relaxed), elapsed),
        );
        snapshot.insert(MetricName::HttpReqFailed, self.http_req_failed.value());
        snapshot.insert(
            MetricName::HttpReqDuration,
            MetricValue::Trend(self.http_req_duration.fold()),
        );
        snapshot.insert(
            MetricName::Iterations,
            MetricValue::counter(self.iterations.load(Ordering::Relaxed), elapsed),
        );
        snapshot.insert(
            MetricName::IterationDuration,
            MetricValue::Trend(self.iteration_duration.fold()),
        );
        snapshot.insert(MetricName::Checks, self.checks.value());

        let (vus, vus_max) = self.vus.values();
        snapshot.insert(MetricName::Vus, vus);
        snapshot.insert(MetricName::VusMax, vus_max);

        snapshot
    }

    pub fn check_results(&self) -> Vec<CheckResult> {
        self.check_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub(crate) struct VuGuard {
    metrics: Arc<RunMetrics>,
}

impl Drop for VuGuard {
    fn drop(&mut self) {
        self.metrics.vus.decrement();
    }
}

#[derive(Default)]
struct RateSink {
    hits: AtomicU64,
    total: AtomicU64,
}

impl RateSink {
    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    fn value(&self) -> MetricValue {
        // `hits` is bumped before `total`, so a concurrent read can see it ahead.
        let total = self.total.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed).min(total);
        MetricValue::rate(hits, total)
    }
}

/// Durations are pushed lock-free and folded into the digest when a snapshot is taken.
struct TrendSink {
    pending: AtomicBucket<Duration>,
    folded: Mutex<TrendValue>,
}

impl Default for TrendSink {
    fn default() -> Self {
        Self {
            pending: AtomicBucket::new(),
            folded: Mutex::new(TrendValue::new()),
        }
    }
}

impl TrendSink {
    fn record(&self, duration: Duration) {
        self.pending.push(duration);
    }

    fn fold(&self) -> TrendValue {
        let mut folded = self.folded.lock().unwrap_or_else(PoisonError::into_inner);
        self.pending.clear_with(|batch| {
            for duration in batch {
                folded.insert_duration(*duration);
            }
        });
        folded.clone()
    }
}

struct GaugeSink {
    value: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

impl Default for GaugeSink {
    fn default() -> Self {
        Self {
            value: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }
}

impl GaugeSink {
    fn increment(&self) {
        let value = self.value.fetch_add(1, Ordering::Relaxed) + 1;
        self.max.fetch_max(value, Ordering::Relaxed);
        self.min.fetch_min(value, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::gauge!("vus").set(value as f64);
    }

    fn decrement(&self) {
        let value = self.value.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        self.min.fetch_min(value, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::gauge!("vus").set(value as f64);
    }

    /// Returns `(vus, vus_max)`.
    fn values(&self) -> (MetricValue, MetricValue) {
        let value = self.value.load(Ordering::Relaxed) as f64;
        let max = self.max.load(Ordering::Relaxed) as f64;
        let min = match self.min.load(Ordering::Relaxed) {
            u64::MAX => 0.,
            min => min as f64,
        };

        (
            MetricValue::Gauge { value, min, max },
            MetricValue::Gauge {
                value: max,
                min: max,
                max,
            },
        )
    }
}

#[cfg(feature = "metrics")]
fn describe() {
    use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

    describe_counter!("http_reqs", "HTTP requests issued");
    describe_counter!("http_req_failed", "HTTP requests that errored or returned an unexpected status");
    describe_histogram!("http_req_duration", Unit::Milliseconds, "Total time of an HTTP request");
    describe_counter!("iterations", "Completed VU iterations");
    describe_histogram!("iteration_duration", Unit::Milliseconds, "Time to complete one iteration");
    describe_counter!("checks", "Check outcomes by name and result");
    describe_gauge!("vus", "Currently running VUs");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(snapshot: &MetricsSnapshot, name: MetricName) -> Option<f64> {
        snapshot.get(name).and_then(MetricValue::rate_value)
    }

    #[test]
    fn http_samples_feed_counter_rate_and_trend() {
        let metrics = RunMetrics::new();
        for ms in [10, 20, 30] {
            metrics.record_http(Duration::from_millis(ms), false);
        }
        metrics.record_http(Duration::from_millis(40), true);

        let snapshot = metrics.snapshot();
        assert!(matches!(
            snapshot.get(MetricName::HttpReqs),
            Some(MetricValue::Counter { count: 4, .. })
        ));
        assert_eq!(rate(&snapshot, MetricName::HttpReqFailed), Some(0.25));

        let trend = snapshot.trend(MetricName::HttpReqDuration).unwrap();
        assert_eq!(trend.count(), 4);
        assert_eq!(trend.min(), Some(10.));
        assert_eq!(trend.max(), Some(40.));
    }

    #[test]
    fn trends_accumulate_across_snapshots() {
        let metrics = RunMetrics::new();
        metrics.record_iteration(Duration::from_millis(5));
        let _ = metrics.snapshot();
        metrics.record_iteration(Duration::from_millis(15));

        let trend = metrics.snapshot();
        let trend = trend.trend(MetricName::IterationDuration).unwrap();
        assert_eq!(trend.count(), 2);
        assert_eq!(trend.avg(), Some(10.));
    }

    #[test]
    fn checks_are_tallied_by_name_in_first_seen_order() {
        let metrics = RunMetrics::new();
        metrics.record_check("status is 200", true);
        metrics.record_check("body is empty", false);
        metrics.record_check("status is 200", false);

        assert_eq!(
            metrics.check_results(),
            vec![
                CheckResult {
                    name: "status is 200".into(),
                    passes: 1,
                    fails: 1
                },
                CheckResult {
                    name: "body is empty".into(),
                    passes: 0,
                    fails: 1
                },
            ]
        );
        assert_eq!(rate(&metrics.snapshot(), MetricName::Checks), Some(1. / 3.));
    }

    #[test]
    fn vu_guard_tracks_running_vus() {
        let metrics = Arc::new(RunMetrics::new());
        let a = metrics.vu_started();
        let b = metrics.vu_started();
        assert_eq!(metrics.active_vus(), 2);
        drop(a);
        drop(b);
        assert_eq!(metrics.active_vus(), 0);

        let snapshot = metrics.snapshot();
        assert!(matches!(
            snapshot.get(MetricName::VusMax),
            Some(MetricValue::Gauge { value, .. }) if *value == 2.
        ));
    }
}
