use thiserror::Error;

/// Problems found while loading or validating [`Options`](crate::Options).
///
/// All of these are fatal: the runtime refuses to start a run with a bad configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("invalid threshold expression `{expression}`: {reason}")]
    InvalidThreshold { expression: String, reason: String },

    #[error("threshold `{expression}` uses `{aggregation}`, which is not available for {kind} metric `{metric}`")]
    AggregationMismatch {
        metric: String,
        kind: &'static str,
        aggregation: String,
        expression: String,
    },

    #[error("no scenarios configured")]
    NoScenarios,

    #[error("scenario `{0}` has no stages")]
    NoStages(String),

    #[error("scenario `{0}` never runs any VUs")]
    NoVus(String),

    #[error("scenario `{0}` runs longer than the longest representable duration")]
    DurationOverflow(String),

    #[error("`rps` must be greater than zero")]
    ZeroRps,

    #[error("failed to parse options: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read options file: {0}")]
    Io(#[from] std::io::Error),
}
