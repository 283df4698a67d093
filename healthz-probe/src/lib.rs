//! Breaking-point test for `/healthz`.
//!
//! Ramps from 20 to 140 VUs over six minutes. Every iteration fetches `/healthz` once and
//! checks the status. The run aborts as soon as 1% of requests fail, and fails if the 99th
//! percentile latency reaches one second.
use std::time::Duration;
use surge::prelude::*;

pub const HEALTHZ_URL: &str = "http://localhost:8000/healthz";

/// Label of the single check recorded per iteration.
///
/// The condition it guards is `status == 200` even though the label says 204.
pub const CHECK_NAME: &str = "response code was 204";

pub const SCENARIO_NAME: &str = "breaking";

pub const STAGES: [Stage; 8] = [
    Stage::new(Duration::from_secs(10), 20),
    Stage::new(Duration::from_secs(50), 20),
    Stage::new(Duration::from_secs(50), 40),
    Stage::new(Duration::from_secs(50), 60),
    Stage::new(Duration::from_secs(50), 80),
    Stage::new(Duration::from_secs(50), 100),
    Stage::new(Duration::from_secs(50), 120),
    Stage::new(Duration::from_secs(50), 140),
];

pub fn options() -> Options {
    Options::new()
        .threshold(
            "http_req_failed",
            [ThresholdRule::new("rate<0.01").abort_on_fail()],
        )
        .threshold("http_req_duration", ["p(99)<1000"])
        .scenario(SCENARIO_NAME, RampingVus::new(STAGES))
}

/// One iteration: a single `GET` and a single check on its status.
pub async fn probe(url: &str) {
    let res = http::get(url).await;
    check(&res, &[(CHECK_NAME, &|r: &Response| r.status() == 200)]);
}

#[scenario]
pub async fn breaking() {
    probe(HEALTHZ_URL).await
}
