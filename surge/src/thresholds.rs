use surge_core::{AbortReason, MetricsSnapshot, Threshold, ThresholdOutcome, ThresholdStatus};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Judges compiled thresholds against metric snapshots.
pub(crate) struct ThresholdEvaluator {
    thresholds: Vec<Threshold>,
}

impl ThresholdEvaluator {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        Self { thresholds }
    }

    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> Vec<ThresholdOutcome> {
        self.thresholds
            .iter()
            .map(|threshold| {
                let judged = snapshot
                    .get(threshold.metric)
                    .and_then(|value| threshold.expr.evaluate(value));

                let (observed, status) = match judged {
                    Some((observed, true)) => (Some(observed), ThresholdStatus::Passed),
                    Some((observed, false)) => (Some(observed), ThresholdStatus::Failed),
                    None => (None, ThresholdStatus::NoData),
                };

                ThresholdOutcome {
                    metric: threshold.metric,
                    threshold: threshold.source.clone(),
                    observed,
                    status,
                    abort_on_fail: threshold.abort_on_fail,
                }
            })
            .collect()
    }

    /// First `abortOnFail` rule that is failing and past its evaluation delay.
    pub fn abort_reason(&self, snapshot: &MetricsSnapshot) -> Option<AbortReason> {
        let elapsed = snapshot.elapsed;
        self.thresholds
            .iter()
            .zip(self.evaluate(snapshot))
            .find(|(threshold, outcome)| {
                outcome.status == ThresholdStatus::Failed && threshold.aborts_at(elapsed)
            })
            .map(|(threshold, outcome)| {
                warn!(
                    "Threshold `{}` on {} crossed (observed {:?}) at {:?}",
                    threshold.source, threshold.metric, outcome.observed, elapsed
                );
                AbortReason::Threshold {
                    metric: threshold.metric,
                    threshold: threshold.source.clone(),
                }
            })
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}
