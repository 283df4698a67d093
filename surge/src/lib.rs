#![cfg_attr(docsrs, feature(doc_cfg))]
//! A load-testing runtime in the style of k6: scenarios ramp virtual users (VUs) along a
//! schedule, each VU loops an async iteration function, and the run is judged by thresholds
//! over built-in metrics.
//!
//! ```no_run
//! use surge::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let summary = fetch_home()
//!         .stages([
//!             Stage::new(Duration::from_secs(10), 20),
//!             Stage::new(Duration::from_secs(50), 20),
//!         ])
//!         .threshold("http_req_failed", ThresholdRule::new("rate<0.01").abort_on_fail())
//!         .threshold("http_req_duration", "p(99)<1000")
//!         .await
//!         .unwrap();
//!
//!     println!("{summary}");
//!     std::process::exit(summary.exit_code().into());
//! }
//!
//! #[scenario]
//! async fn fetch_home() {
//!     let res = http::get("http://localhost:8000/").await;
//!     check(&res, &[("status is 200", &|r: &Response| r.status() == 200)]);
//! }
//! ```

mod check;
mod cli;
mod context;
mod error;
mod executor;
pub mod http;
mod metrics;
pub mod scenario;
mod thresholds;
mod vu;

pub use check::{check, Check};
pub use cli::SurgeCli;
pub use context::{scenario_name, vu_id};
pub use error::SurgeError;
pub use scenario::{RunResult, Scenario};
pub use surge_core::{
    exit_code, AbortReason, CheckResult, ConfigError, ConstantVus, MetricName, MetricValue,
    MetricsSnapshot, Options, RampingVus, RunSummary, ScenarioSpec, Stage, ThresholdOutcome,
    ThresholdRule, ThresholdStatus,
};
pub use surge_macros::scenario;

pub mod prelude {
    pub use crate::check::check;
    pub use crate::http::{self, Response};
    pub use crate::scenario::ConfigurableScenario;
    pub use surge_core::{ConstantVus, Options, RampingVus, RunSummary, Stage, ThresholdRule};
    pub use surge_macros::scenario;
}
