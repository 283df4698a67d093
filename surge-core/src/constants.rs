use std::time::Duration;

/// VUs a `ramping-vus` scenario starts with when `startVUs` is not given.
pub const DEFAULT_START_VUS: u64 = 1;

/// How long a VU removed during ramp-down may keep running its iteration.
pub const DEFAULT_GRACEFUL_RAMP_DOWN: Duration = Duration::from_secs(30);

/// How long running iterations may take to finish once a scenario ends.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Interval at which thresholds are evaluated while a run is in progress.
pub const THRESHOLD_EVAL_INTERVAL: Duration = Duration::from_secs(2);

/// Interval at which executors re-read their schedule and resize the VU pool.
pub const VU_ADJUST_INTERVAL: Duration = Duration::from_millis(100);

/// Per-request timeout applied by `surge::http`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Process exit codes, numbered the way k6 numbers them.
pub mod exit_code {
    pub const SUCCESS: u8 = 0;
    pub const THRESHOLDS_FAILED: u8 = 99;
    pub const INVALID_CONFIG: u8 = 104;
    pub const EXTERNAL_ABORT: u8 = 105;
}
