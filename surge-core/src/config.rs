use crate::{
    ConfigError, Threshold, DEFAULT_GRACEFUL_RAMP_DOWN, DEFAULT_GRACEFUL_STOP, DEFAULT_START_VUS,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, DeserializeAs, SerializeAs};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Serde adapter for humantime strings such as `"10s"` or `"1m30s"`.
pub struct HumanDuration;

impl SerializeAs<Duration> for HumanDuration {
    fn serialize_as<S: Serializer>(source: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*source))
    }
}

impl<'de> DeserializeAs<'de, Duration> for HumanDuration {
    fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Everything a run needs: thresholds plus one or more scenarios.
///
/// Built in code by a load-test script, or loaded from JSON in the k6 `options` shape:
///
/// ```json
/// {
///   "thresholds": {
///     "http_req_failed": [{ "threshold": "rate<0.01", "abortOnFail": true }],
///     "http_req_duration": ["p(99)<1000"]
///   },
///   "scenarios": {
///     "breaking": {
///       "executor": "ramping-vus",
///       "stages": [{ "duration": "10s", "target": 20 }]
///     }
///   }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    /// Metric name to rules. Names and expressions are checked by [`Options::validate`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thresholds: BTreeMap<String, Vec<ThresholdRule>>,
    #[serde(default)]
    pub scenarios: BTreeMap<String, ScenarioSpec>,
    /// Global cap on HTTP requests per second across every VU.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rps: Option<u32>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threshold<I, R>(mut self, metric: &str, rules: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ThresholdRule>,
    {
        self.thresholds
            .entry(metric.to_string())
            .or_default()
            .extend(rules.into_iter().map(Into::into));
        self
    }

    pub fn scenario(mut self, name: &str, spec: impl Into<ScenarioSpec>) -> Self {
        self.scenarios.insert(name.to_string(), spec.into());
        self
    }

    pub fn rps(mut self, rps: u32) -> Self {
        self.rps = Some(rps);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse every threshold rule and bind it to its metric.
    pub fn compile_thresholds(&self) -> Result<Vec<Threshold>, ConfigError> {
        let mut compiled = vec![];
        for (metric, rules) in &self.thresholds {
            for rule in rules {
                compiled.push(Threshold::compile(metric, rule)?);
            }
        }
        Ok(compiled)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.compile_thresholds()?;

        if self.scenarios.is_empty() {
            return Err(ConfigError::NoScenarios);
        }

        for (name, spec) in &self.scenarios {
            if let ScenarioSpec::RampingVus(ramping) = spec {
                if ramping.stages.is_empty() {
                    return Err(ConfigError::NoStages(name.clone()));
                }
                ramping
                    .stages
                    .iter()
                    .try_fold(Duration::ZERO, |total, stage| total.checked_add(stage.duration))
                    .ok_or_else(|| ConfigError::DurationOverflow(name.clone()))?;
            }
            if spec.max_vus() == 0 {
                return Err(ConfigError::NoVus(name.clone()));
            }
        }

        if self.rps == Some(0) {
            return Err(ConfigError::ZeroRps);
        }

        Ok(())
    }
}

/// One pass/fail rule for a metric, optionally stopping the run when violated.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawThresholdRule")]
pub struct ThresholdRule {
    pub threshold: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub abort_on_fail: bool,
    #[serde_as(as = "Option<HumanDuration>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_abort_eval: Option<Duration>,
}

impl ThresholdRule {
    pub fn new(threshold: &str) -> Self {
        Self {
            threshold: threshold.to_string(),
            abort_on_fail: false,
            delay_abort_eval: None,
        }
    }

    pub fn abort_on_fail(mut self) -> Self {
        self.abort_on_fail = true;
        self
    }

    pub fn delay_abort_eval(mut self, delay: Duration) -> Self {
        self.delay_abort_eval = Some(delay);
        self
    }
}

impl From<&str> for ThresholdRule {
    fn from(threshold: &str) -> Self {
        ThresholdRule::new(threshold)
    }
}

// Rules are written either as a bare expression or as the full object.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawThresholdRule {
    Expr(String),
    Full(FullThresholdRule),
}

#[serde_as]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullThresholdRule {
    threshold: String,
    #[serde(default)]
    abort_on_fail: bool,
    #[serde_as(as = "Option<HumanDuration>")]
    #[serde(default)]
    delay_abort_eval: Option<Duration>,
}

impl From<RawThresholdRule> for ThresholdRule {
    fn from(raw: RawThresholdRule) -> Self {
        match raw {
            RawThresholdRule::Expr(threshold) => ThresholdRule::new(&threshold),
            RawThresholdRule::Full(full) => ThresholdRule {
                threshold: full.threshold,
                abort_on_fail: full.abort_on_fail,
                delay_abort_eval: full.delay_abort_eval,
            },
        }
    }
}

/// One ramp step: move linearly to `target` VUs over `duration`.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde_as(as = "HumanDuration")]
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub const fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// How a scenario varies its VU count over time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "kebab-case")]
pub enum ScenarioSpec {
    RampingVus(RampingVus),
    ConstantVus(ConstantVus),
}

impl ScenarioSpec {
    pub fn executor(&self) -> &'static str {
        match self {
            ScenarioSpec::RampingVus(_) => "ramping-vus",
            ScenarioSpec::ConstantVus(_) => "constant-vus",
        }
    }

    pub fn graceful_stop(&self) -> Duration {
        match self {
            ScenarioSpec::RampingVus(r) => r.graceful_stop,
            ScenarioSpec::ConstantVus(c) => c.graceful_stop,
        }
    }

    pub fn graceful_ramp_down(&self) -> Duration {
        match self {
            ScenarioSpec::RampingVus(r) => r.graceful_ramp_down,
            ScenarioSpec::ConstantVus(c) => c.graceful_stop,
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RampingVus {
    #[serde(rename = "startVUs", default = "default_start_vus")]
    pub start_vus: u64,
    pub stages: Vec<Stage>,
    #[serde_as(as = "HumanDuration")]
    #[serde(default = "default_graceful_ramp_down")]
    pub graceful_ramp_down: Duration,
    #[serde_as(as = "HumanDuration")]
    #[serde(default = "default_graceful_stop")]
    pub graceful_stop: Duration,
}

impl RampingVus {
    pub fn new(stages: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            start_vus: DEFAULT_START_VUS,
            stages: stages.into_iter().collect(),
            graceful_ramp_down: DEFAULT_GRACEFUL_RAMP_DOWN,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }

    pub fn start_vus(mut self, start_vus: u64) -> Self {
        self.start_vus = start_vus;
        self
    }

    pub fn graceful_ramp_down(mut self, graceful_ramp_down: Duration) -> Self {
        self.graceful_ramp_down = graceful_ramp_down;
        self
    }

    pub fn graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }
}

impl From<RampingVus> for ScenarioSpec {
    fn from(spec: RampingVus) -> Self {
        ScenarioSpec::RampingVus(spec)
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstantVus {
    pub vus: u64,
    #[serde_as(as = "HumanDuration")]
    pub duration: Duration,
    #[serde_as(as = "HumanDuration")]
    #[serde(default = "default_graceful_stop")]
    pub graceful_stop: Duration,
}

impl ConstantVus {
    pub fn new(vus: u64, duration: Duration) -> Self {
        Self {
            vus,
            duration,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }
}

impl From<ConstantVus> for ScenarioSpec {
    fn from(spec: ConstantVus) -> Self {
        ScenarioSpec::ConstantVus(spec)
    }
}

fn default_start_vus() -> u64 {
    DEFAULT_START_VUS
}

fn default_graceful_ramp_down() -> Duration {
    DEFAULT_GRACEFUL_RAMP_DOWN
}

fn default_graceful_stop() -> Duration {
    DEFAULT_GRACEFUL_STOP
}
