use crate::scenario::{ConfigurableScenario, RunResult};
use crate::SurgeError;
use clap::Parser;
use std::path::PathBuf;
use surge_core::{Options, RunSummary};
#[allow(unused)]
use tracing::{debug, error, info, warn};

/// Default command line for a load-test binary.
///
/// # Example
///
/// ```ignore
/// use surge::prelude::*;
/// use surge::SurgeCli;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let cli = SurgeCli::parse();
///     let summary = cli.configure(my_scenario().options(my_options()))?.await?;
///     cli.export_summary(&summary)?;
///     Ok(())
/// }
/// ```
#[derive(Parser, Debug, Default)]
#[command(version, about)]
pub struct SurgeCli {
    /// JSON file in the k6 `options` shape, replacing the script's options
    #[arg(short, long, value_name = "PATH")]
    pub options: Option<PathBuf>,

    /// Cap HTTP requests per second across all VUs
    #[arg(long, value_name = "N")]
    pub rps: Option<u32>,

    /// Run without evaluating thresholds
    #[arg(long)]
    pub no_thresholds: bool,

    /// Write the end-of-test summary as JSON
    #[arg(long, value_name = "PATH")]
    pub summary_export: Option<PathBuf>,
}

impl SurgeCli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Apply the command line overrides to a scenario. The run also becomes interruptible.
    pub fn configure<S>(&self, scenario: S) -> Result<S, SurgeError>
    where
        S: ConfigurableScenario<RunResult>,
    {
        let mut scenario = scenario.interruptible();

        if let Some(path) = &self.options {
            info!("Loading options from {}", path.display());
            scenario = scenario.options(Options::from_path(path)?);
        }
        if let Some(rps) = self.rps {
            scenario = scenario.rps(rps);
        }
        if self.no_thresholds {
            scenario = scenario.skip_thresholds();
        }

        Ok(scenario)
    }

    pub fn export_summary(&self, summary: &RunSummary) -> Result<(), SurgeError> {
        if let Some(path) = &self.summary_export {
            let json = serde_json::to_string_pretty(summary)?;
            std::fs::write(path, json)?;
            info!("Summary written to {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use std::time::Duration;
    use surge_core::{ConfigError, ScenarioSpec, Stage};

    async fn noop() {}

    fn cli(args: &[&str]) -> SurgeCli {
        SurgeCli::try_parse_from(std::iter::once("surge").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parses_flags() {
        let parsed = cli(&[
            "--options",
            "opts.json",
            "--rps",
            "50",
            "--no-thresholds",
            "--summary-export",
            "out.json",
        ]);
        assert_eq!(parsed.options, Some(PathBuf::from("opts.json")));
        assert_eq!(parsed.rps, Some(50));
        assert!(parsed.no_thresholds);
        assert_eq!(parsed.summary_export, Some(PathBuf::from("out.json")));

        let empty = cli(&[]);
        assert!(empty.options.is_none() && empty.rps.is_none() && !empty.no_thresholds);
    }

    #[test]
    fn options_file_replaces_script_options() {
        let path = std::env::temp_dir().join(format!("surge-cli-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "scenarios": { "flat": { "executor": "constant-vus", "vus": 2, "duration": "5s" } } }"#,
        )
        .unwrap();

        let scenario = Scenario::new("noop", noop).stages([Stage::new(Duration::from_secs(1), 1)]);
        let parsed = SurgeCli {
            options: Some(path.clone()),
            rps: Some(10),
            ..Default::default()
        };
        let scenario = parsed.configure(scenario).unwrap();
        std::fs::remove_file(&path).unwrap();

        let options = scenario.current_options();
        assert_eq!(options.rps, Some(10));
        assert_eq!(options.scenarios.len(), 1);
        assert!(matches!(
            options.scenarios["flat"],
            ScenarioSpec::ConstantVus(_)
        ));
    }

    #[test]
    fn missing_options_file_is_a_config_error() {
        let parsed = SurgeCli {
            options: Some(PathBuf::from("/nonexistent/surge/options.json")),
            ..Default::default()
        };
        let err = parsed.configure(Scenario::new("noop", noop)).err().unwrap();
        assert!(matches!(err, SurgeError::Config(ConfigError::Io(_))));
        assert_eq!(err.exit_code(), surge_core::exit_code::INVALID_CONFIG);
    }
}
