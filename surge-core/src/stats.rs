use crate::{exit_code, HumanDuration, MetricName, MetricValue, MetricsSnapshot};
use serde::Serialize;
use serde_with::serde_as;
use std::fmt;
use std::time::Duration;

/// Result of a complete run, returned by awaiting a scenario.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    #[serde_as(as = "HumanDuration")]
    pub elapsed: Duration,
    pub scenarios: Vec<ScenarioSummary>,
    pub metrics: MetricsSnapshot,
    pub checks: Vec<CheckResult>,
    pub thresholds: Vec<ThresholdOutcome>,
    pub abort: Option<AbortReason>,
}

impl RunSummary {
    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.status != ThresholdStatus::Failed)
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn exit_code(&self) -> u8 {
        match self.abort {
            Some(AbortReason::External) => exit_code::EXTERNAL_ABORT,
            Some(AbortReason::Threshold { .. }) => exit_code::THRESHOLDS_FAILED,
            None if !self.thresholds_passed() => exit_code::THRESHOLDS_FAILED,
            None => exit_code::SUCCESS,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSummary {
    pub name: String,
    pub executor: &'static str,
    pub max_vus: u64,
    #[serde_as(as = "HumanDuration")]
    pub planned_duration: Duration,
}

/// Pass/fail tally for one named check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdStatus {
    Passed,
    Failed,
    /// The metric had no samples to judge.
    NoData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdOutcome {
    pub metric: MetricName,
    pub threshold: String,
    pub observed: Option<f64>,
    pub status: ThresholdStatus,
    pub abort_on_fail: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum AbortReason {
    /// An `abortOnFail` threshold was crossed.
    Threshold { metric: MetricName, threshold: String },
    /// The operator interrupted the run.
    External,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Threshold { metric, threshold } => {
                write!(f, "threshold `{threshold}` on {metric} crossed")
            }
            AbortReason::External => f.write_str("interrupted"),
        }
    }
}

const NAME_WIDTH: usize = 30;

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let max_vus: u64 = self.scenarios.iter().map(|s| s.max_vus).sum();
        let planned = self
            .scenarios
            .iter()
            .map(|s| s.planned_duration)
            .max()
            .unwrap_or_default();
        writeln!(
            f,
            "     scenarios: {} scenario(s), {} max VUs, {} max duration",
            self.scenarios.len(),
            max_vus,
            humantime::format_duration(planned),
        )?;
        for s in &self.scenarios {
            writeln!(
                f,
                "              * {}: {}, up to {} VUs over {}",
                s.name,
                s.executor,
                s.max_vus,
                humantime::format_duration(s.planned_duration),
            )?;
        }
        writeln!(f)?;

        for check in &self.checks {
            let total = check.passes + check.fails;
            let mark = if check.fails == 0 { '✓' } else { '✗' };
            writeln!(f, "     {mark} {}", check.name)?;
            if check.fails > 0 {
                writeln!(
                    f,
                    "      ↳  {}% — ✓ {} / ✗ {}",
                    percent(check.passes, total),
                    check.passes,
                    check.fails
                )?;
            }
        }
        if !self.checks.is_empty() {
            writeln!(f)?;
        }

        for (name, value) in &self.metrics.values {
            let outcomes: Vec<_> = self
                .thresholds
                .iter()
                .filter(|t| t.metric == *name)
                .collect();
            let mark = if outcomes.is_empty() {
                ' '
            } else if outcomes.iter().any(|t| t.status == ThresholdStatus::Failed) {
                '✗'
            } else {
                '✓'
            };

            let dotted = format!("{name}{}", ".".repeat(NAME_WIDTH.saturating_sub(name.as_str().len())));
            writeln!(f, "   {mark} {dotted}: {}", format_value(value))?;

            for outcome in outcomes {
                let mark = match outcome.status {
                    ThresholdStatus::Passed => '✓',
                    ThresholdStatus::Failed => '✗',
                    ThresholdStatus::NoData => '-',
                };
                writeln!(f, "       {mark} '{}'", outcome.threshold)?;
            }
        }

        writeln!(f)?;
        write!(f, "     running ({}), ", humantime::format_duration(round_ms(self.elapsed)))?;
        match &self.abort {
            Some(reason) => writeln!(f, "aborted: {reason}"),
            None if self.thresholds_passed() => writeln!(f, "completed"),
            None => writeln!(f, "completed; some thresholds have failed"),
        }
    }
}

fn percent(part: u64, total: u64) -> String {
    if total == 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", part as f64 / total as f64 * 100.)
}

fn round_ms(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

fn ms(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}ms"),
        None => "-".to_string(),
    }
}

fn format_value(value: &MetricValue) -> String {
    match value {
        MetricValue::Counter { count, rate } => format!("{count:<8} {rate:.2}/s"),
        MetricValue::Rate { hits, total } => format!(
            "{}%  ✓ {} ✗ {}",
            percent(*hits, *total),
            hits,
            total - hits
        ),
        MetricValue::Trend(t) => format!(
            "avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={}",
            ms(t.avg()),
            ms(t.min()),
            ms(t.med()),
            ms(t.max()),
            ms(t.percentile(90.)),
            ms(t.percentile(95.)),
            ms(t.percentile(99.)),
        ),
        MetricValue::Gauge { value, min, max } => format!("{value:<8} min={min} max={max}"),
    }
}
