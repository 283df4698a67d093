//! HTTP requests that report into the run's built-in metrics.
//!
//! Requests never fail loudly: a transport error becomes a [`Response`] with status `0` and
//! [`Response::error`] set, and is counted in `http_req_failed`.
use crate::context;
use reqwest::Client;
use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::Duration;
use surge_core::DEFAULT_REQUEST_TIMEOUT;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

static CLIENT: OnceLock<Client> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    body: Vec<u8>,
    error: Option<String>,
    duration: Duration,
}

impl Response {
    /// HTTP status code, or `0` if no response was received.
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Whether this request counts toward `http_req_failed`: a transport error or a status
    /// outside `200..=399`.
    pub fn is_failed(&self) -> bool {
        self.error.is_some() || !(200..400).contains(&self.status)
    }
}

/// Issue a `GET` and wait for the full response body.
pub async fn get(url: &str) -> Response {
    throttle().await;

    let client = CLIENT.get_or_init(Client::new);
    let start = Instant::now();
    let result = fetch(client, url).await;
    let duration = start.elapsed();

    let response = match result {
        Ok((status, body)) => Response {
            status,
            body,
            error: None,
            duration,
        },
        Err(err) => {
            debug!("GET {url} failed: {err}");
            Response {
                status: 0,
                body: vec![],
                error: Some(err.to_string()),
                duration,
            }
        }
    };

    record_request(response.duration, response.is_failed());
    response
}

async fn fetch(client: &Client, url: &str) -> Result<(u16, Vec<u8>), reqwest::Error> {
    let res = client
        .get(url)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .send()
        .await?;
    let status = res.status().as_u16();
    let body = res.bytes().await?;
    Ok((status, body.to_vec()))
}

/// Wait for the run-wide `rps` limiter, if one is configured.
pub(crate) async fn throttle() {
    if let Some(limiter) = context::current().and_then(|ctx| ctx.limiter) {
        limiter.until_ready().await;
    }
}

pub(crate) fn record_request(duration: Duration, failed: bool) {
    match context::current() {
        Some(ctx) => ctx.metrics.record_http(duration, failed),
        None => warn!("No VU context available; request is not measured."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, error: Option<&str>) -> Response {
        Response {
            status,
            body: vec![],
            error: error.map(str::to_string),
            duration: Duration::from_millis(1),
        }
    }

    #[test]
    fn failed_requests_follow_expected_statuses() {
        assert!(!response(200, None).is_failed());
        assert!(!response(204, None).is_failed());
        assert!(!response(302, None).is_failed());
        assert!(response(404, None).is_failed());
        assert!(response(503, None).is_failed());
        assert!(response(0, Some("connection refused")).is_failed());
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn unreachable_host_yields_status_zero() {
        // Port 9 (discard) is essentially never bound on test hosts.
        let res = get("http://127.0.0.1:9/healthz").await;
        assert_eq!(res.status(), 0);
        assert!(res.error().is_some());
        assert!(res.is_failed());
        assert!(logs_contain("No VU context available"));
    }
}
