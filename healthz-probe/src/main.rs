use healthz_probe::{breaking, options};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::process::ExitCode;
use surge::prelude::*;
use surge::SurgeCli;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_LOG_FILTER: &str = "surge=info,healthz_probe=info";

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let prometheus: SocketAddr = "0.0.0.0:8002".parse()?;
    if let Err(err) = PrometheusBuilder::new()
        .with_http_listener(prometheus)
        .install()
    {
        warn!("Prometheus exporter disabled: {err}");
    }

    let cli = SurgeCli::parse();
    let scenario = match cli.configure(breaking().options(options())) {
        Ok(scenario) => scenario,
        Err(err) => {
            error!("{err}");
            return Ok(ExitCode::from(err.exit_code()));
        }
    };

    let summary = match scenario.await {
        Ok(summary) => summary,
        Err(err) => {
            error!("{err}");
            return Ok(ExitCode::from(err.exit_code()));
        }
    };

    println!("{summary}");
    cli.export_summary(&summary)?;

    Ok(ExitCode::from(summary.exit_code()))
}
