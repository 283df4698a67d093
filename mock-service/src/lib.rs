//! Stand-in for the service under test.
//!
//! `/healthz` answers like the real service (`204 No Content`); the other routes let tests pick
//! the status code, latency or failure rate a probe will see.
use axum::{debug_handler, extract::Path, http::StatusCode, routing::get, Router};
use metrics::counter;
use rand::Rng;
use std::net::SocketAddr;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::debug;

pub fn app() -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status/:code", get(status))
        .route("/delay/ms/:delay_ms", get(delay))
        .route("/flaky/:fail_percent", get(flaky))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    debug!("Mock service listening on {addr}");
    axum::serve(listener, app()).await?;
    Ok(())
}

#[debug_handler]
pub async fn healthz() -> StatusCode {
    counter!("mock-service.healthz").increment(1);
    StatusCode::NO_CONTENT
}

#[debug_handler]
pub async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

#[debug_handler]
pub async fn delay(Path(delay_ms): Path<u64>) -> StatusCode {
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    StatusCode::OK
}

/// Fails roughly `fail_percent` out of every hundred requests.
#[debug_handler]
pub async fn flaky(Path(fail_percent): Path<u32>) -> StatusCode {
    let roll = rand::thread_rng().gen_range(0..100);
    if roll < fail_percent {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}
