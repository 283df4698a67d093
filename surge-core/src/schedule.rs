use crate::{ConstantVus, RampingVus, ScenarioSpec};
use std::time::Duration;

impl ScenarioSpec {
    /// Number of VUs the scenario wants running `elapsed` into the run, or `None` once it is over.
    pub fn target_vus(&self, elapsed: Duration) -> Option<u64> {
        match self {
            ScenarioSpec::RampingVus(r) => r.target_vus(elapsed),
            ScenarioSpec::ConstantVus(c) => c.target_vus(elapsed),
        }
    }

    pub fn total_duration(&self) -> Duration {
        match self {
            ScenarioSpec::RampingVus(r) => r.total_duration(),
            ScenarioSpec::ConstantVus(c) => c.duration,
        }
    }

    pub fn max_vus(&self) -> u64 {
        match self {
            ScenarioSpec::RampingVus(r) => r.max_vus(),
            ScenarioSpec::ConstantVus(c) => c.vus,
        }
    }
}

impl RampingVus {
    /// Stages are walked in declaration order, each interpolating linearly from the previous
    /// stage's target (or `start_vus`) to its own.
    pub fn target_vus(&self, elapsed: Duration) -> Option<u64> {
        let mut from = self.start_vus;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start.saturating_add(stage.duration);
            if elapsed < stage_end {
                // Zero-length stages never get here, so the division is safe.
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let delta = stage.target as f64 - from as f64;
                return Some((from as f64 + delta * progress).round() as u64);
            }
            from = stage.target;
            stage_start = stage_end;
        }

        None
    }

    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |total, s| total.saturating_add(s.duration))
    }

    pub fn max_vus(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, u64::max)
    }
}

impl ConstantVus {
    pub fn target_vus(&self, elapsed: Duration) -> Option<u64> {
        (elapsed < self.duration).then_some(self.vus)
    }
}
