mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;

    use healthz_probe::{probe, CHECK_NAME};
    use std::time::Duration;
    use surge::prelude::*;
    use surge::{exit_code, AbortReason, MetricName, MetricValue, ThresholdStatus};

    /// The probe's thresholds over a short ramp instead of the six-minute one.
    fn short_run() -> Options {
        let mut options = healthz_probe::options();
        options.scenarios.clear();
        options.scenario(
            "short",
            RampingVus::new([
                Stage::new(Duration::from_secs(1), 5),
                Stage::new(Duration::from_secs(2), 5),
            ])
            .graceful_stop(Duration::from_secs(5)),
        )
    }

    fn counter(summary: &RunSummary, name: MetricName) -> u64 {
        match summary.metrics.get(name) {
            Some(MetricValue::Counter { count, .. }) => *count,
            other => panic!("{name} is not a counter: {other:?}"),
        }
    }

    fn threshold_status(summary: &RunSummary, metric: MetricName) -> ThresholdStatus {
        summary
            .thresholds
            .iter()
            .find(|t| t.metric == metric)
            .map(|t| t.status)
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(30_000)]
    async fn ok_responses_pass_everything() {
        init().await;

        let summary = probe_ok().options(short_run()).await.unwrap();

        assert_eq!(summary.abort, None);
        assert_eq!(summary.exit_code(), exit_code::SUCCESS);

        // One request and one check per iteration.
        let requests = counter(&summary, MetricName::HttpReqs);
        assert!(requests > 0);
        assert_eq!(counter(&summary, MetricName::Iterations), requests);
        let check = summary.check(CHECK_NAME).unwrap();
        assert_eq!(check.passes, requests);
        assert_eq!(check.fails, 0);
        assert_eq!(summary.checks.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(30_000)]
    async fn no_content_fails_checks_but_not_the_run() {
        init().await;

        let summary = probe_healthz().options(short_run()).await.unwrap();

        // 204 is a successful HTTP status, so only the check fails.
        assert_eq!(summary.abort, None);
        assert_eq!(summary.exit_code(), exit_code::SUCCESS);
        assert_eq!(
            summary.metrics.get(MetricName::HttpReqFailed).and_then(MetricValue::rate_value),
            Some(0.)
        );

        let check = summary.check(CHECK_NAME).unwrap();
        assert_eq!(check.passes, 0);
        assert_eq!(check.fails, counter(&summary, MetricName::HttpReqs));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(30_000)]
    async fn server_errors_abort_early() {
        init().await;

        let mut options = short_run();
        options.scenarios.clear();
        let options = options.scenario(
            "long",
            RampingVus::new([Stage::new(Duration::from_secs(60), 5)]),
        );

        let summary = probe_errors().options(options).await.unwrap();

        assert_eq!(
            summary.abort,
            Some(AbortReason::Threshold {
                metric: MetricName::HttpReqFailed,
                threshold: "rate<0.01".to_string(),
            })
        );
        assert_eq!(summary.exit_code(), exit_code::THRESHOLDS_FAILED);
        assert!(summary.elapsed < Duration::from_secs(10), "{:?}", summary.elapsed);
        assert!(summary.to_string().contains("aborted"));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(30_000)]
    async fn partial_error_rate_aborts() {
        init().await;

        let mut options = short_run();
        options.scenarios.clear();
        let options = options.scenario(
            "long",
            RampingVus::new([Stage::new(Duration::from_secs(60), 5)]),
        );

        let summary = probe_flaky().options(options).await.unwrap();

        assert!(matches!(
            summary.abort,
            Some(AbortReason::Threshold { metric: MetricName::HttpReqFailed, .. })
        ));
        assert_eq!(summary.exit_code(), exit_code::THRESHOLDS_FAILED);
        assert!(summary.elapsed < Duration::from_secs(10), "{:?}", summary.elapsed);

        // Most requests still succeed; the abort comes from the error rate, not a dead service.
        let failed = summary
            .metrics
            .get(MetricName::HttpReqFailed)
            .and_then(MetricValue::rate_value)
            .unwrap();
        assert!(failed >= 0.01 && failed < 0.2, "{failed}");
        assert!(summary.check(CHECK_NAME).unwrap().passes > 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(30_000)]
    async fn slow_responses_fail_without_aborting() {
        init().await;

        let options = short_run();
        let summary = probe_slow().options(options).await.unwrap();

        assert_eq!(summary.abort, None);
        assert_eq!(summary.exit_code(), exit_code::THRESHOLDS_FAILED);
        assert_eq!(
            threshold_status(&summary, MetricName::HttpReqDuration),
            ThresholdStatus::Failed
        );
        assert_eq!(
            threshold_status(&summary, MetricName::HttpReqFailed),
            ThresholdStatus::Passed
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(30_000)]
    async fn unreachable_service_counts_as_failed() {
        init().await;

        let summary = probe_unreachable().options(short_run()).await.unwrap();

        assert!(matches!(summary.abort, Some(AbortReason::Threshold { .. })));
        let check = summary.check(CHECK_NAME).unwrap();
        assert_eq!(check.passes, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn summary_export_writes_json() -> anyhow::Result<()> {
        init().await;

        let path = std::env::temp_dir()
            .join(format!("healthz-summary-{}.json", std::process::id()));
        let cli = surge::SurgeCli {
            summary_export: Some(path.clone()),
            ..Default::default()
        };

        let summary = cli.configure(probe_ok().options(short_run()))?.await?;
        cli.export_summary(&summary)?;

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        std::fs::remove_file(&path)?;

        assert_eq!(json["scenarios"][0]["name"], "short");
        assert_eq!(json["checks"][0]["name"], CHECK_NAME);
        assert_eq!(json["metrics"]["http_req_failed"]["type"], "rate");
        assert!(json["abort"].is_null());
        Ok(())
    }

    /* Scenario Helpers */

    #[scenario]
    async fn probe_ok() {
        probe(&url("/status/200")).await
    }

    #[scenario]
    async fn probe_healthz() {
        probe(&url("/healthz")).await
    }

    #[scenario]
    async fn probe_errors() {
        probe(&url("/status/500")).await
    }

    #[scenario]
    async fn probe_flaky() {
        probe(&url("/flaky/5")).await
    }

    #[scenario]
    async fn probe_slow() {
        probe(&url("/delay/ms/1100")).await
    }

    #[scenario]
    async fn probe_unreachable() {
        probe("http://127.0.0.1:9/healthz").await
    }
}
