//! Scenario handle and the top-level run loop.
use crate::executor::run_executor;
use crate::metrics::RunMetrics;
use crate::thresholds::ThresholdEvaluator;
use crate::SurgeError;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::{
    future::Future,
    num::NonZeroU32,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use surge_core::{
    AbortReason, Options, RampingVus, RunSummary, Stage, ThresholdRule, THRESHOLD_EVAL_INTERVAL,
};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Result of awaiting a [`Scenario`].
///
/// A run that completes, even with failed thresholds or after an abort, is `Ok`; inspect
/// [`RunSummary::exit_code`]. `Err` means the run never started.
pub type RunResult = Result<RunSummary, SurgeError>;

/// Load test scenario structure
///
/// Handler for running scenarios. Not intended for manual creation, use the
/// [`#[scenario]`](surge_macros::scenario) macro which will add these methods to functions.
#[pin_project::pin_project]
pub struct Scenario<T> {
    func: T,
    runner_fut: Option<Pin<Box<dyn Future<Output = RunResult> + Send>>>,
    config: RunConfig,
}

#[derive(Clone, Debug)]
pub(crate) struct RunConfig {
    pub name: String,
    pub options: Options,
    pub thresholds_enabled: bool,
    pub interruptible: bool,
}

impl<T> Scenario<T> {
    #[doc(hidden)]
    pub fn new(name: &str, func: T) -> Self {
        Self {
            func,
            runner_fut: None,
            config: RunConfig {
                name: name.to_string(),
                options: Options::new(),
                thresholds_enabled: true,
                interruptible: false,
            },
        }
    }

    /// Options the scenario will run with.
    pub fn current_options(&self) -> &Options {
        &self.config.options
    }
}

impl<T, F> Future for Scenario<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    type Output = RunResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let runner = this.runner_fut.get_or_insert_with(|| {
            let func = this.func.clone();
            let config = this.config.clone();
            Box::pin(run_scenario(func, config))
        });
        runner.as_mut().poll(cx)
    }
}

pub trait ConfigurableScenario<T: Send>: Future<Output = T> + Sized + Send {
    fn options(self, options: Options) -> Self;
    fn stages(self, stages: impl IntoIterator<Item = Stage>) -> Self;
    fn threshold(self, metric: &str, rule: impl Into<ThresholdRule>) -> Self;
    fn rps(self, rps: u32) -> Self;
    fn skip_thresholds(self) -> Self;
    fn interruptible(self) -> Self;
}

impl<T, F> ConfigurableScenario<RunResult> for Scenario<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    /// Replace all options, typically with a script's `options()`.
    ///
    /// # Example
    /// ```no_run
    /// use surge::prelude::*;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let options = Options::new()
    ///         .threshold("http_req_failed", [ThresholdRule::new("rate<0.01").abort_on_fail()])
    ///         .scenario("smoke", ConstantVus::new(2, Duration::from_secs(30)));
    ///
    ///     let summary = my_scenario().options(options).await.unwrap();
    ///     println!("{summary}");
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario() {
    /// }
    /// ```
    fn options(mut self, options: Options) -> Self {
        self.config.options = options;
        self
    }

    /// Shorthand for a single `ramping-vus` scenario named after the function.
    ///
    /// # Example
    /// ```no_run
    /// use surge::prelude::*;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     my_scenario()
    ///         .stages([
    ///             Stage::new(Duration::from_secs(30), 20),
    ///             Stage::new(Duration::from_secs(30), 0),
    ///         ])
    ///         .await
    ///         .unwrap();
    /// }
    ///
    /// #[scenario]
    /// async fn my_scenario() {
    /// }
    /// ```
    fn stages(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.config
            .options
            .scenarios
            .insert(self.config.name.clone(), RampingVus::new(stages).into());
        self
    }

    /// Add a threshold rule on a built-in metric.
    fn threshold(mut self, metric: &str, rule: impl Into<ThresholdRule>) -> Self {
        self.config
            .options
            .thresholds
            .entry(metric.to_string())
            .or_default()
            .push(rule.into());
        self
    }

    /// Cap HTTP requests per second across every VU.
    fn rps(mut self, rps: u32) -> Self {
        self.config.options.rps = Some(rps);
        self
    }

    /// Run without judging thresholds. Nothing can abort the run early.
    fn skip_thresholds(mut self) -> Self {
        self.config.thresholds_enabled = false;
        self
    }

    /// Stop the run early on Ctrl-C.
    fn interruptible(mut self) -> Self {
        self.config.interruptible = true;
        self
    }
}

#[instrument(name="scenario", skip_all, fields(name=config.name))]
pub(crate) async fn run_scenario<T, F>(func: T, config: RunConfig) -> RunResult
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    let options = &config.options;
    options.validate()?;

    let thresholds = if config.thresholds_enabled {
        options.compile_thresholds()?
    } else {
        info!("Threshold evaluation disabled");
        vec![]
    };
    let evaluator = ThresholdEvaluator::new(thresholds);

    info!(
        "Running {} scenario(s) with {} threshold rule(s)",
        options.scenarios.len(),
        options.thresholds.values().map(Vec::len).sum::<usize>()
    );

    let metrics = Arc::new(RunMetrics::new());
    let limiter = options
        .rps
        .and_then(NonZeroU32::new)
        .map(|rps| Arc::new(rate_limiter(rps)));
    let (stop_tx, stop_rx) = watch::channel(false);

    let mut executors = JoinSet::new();
    for (name, spec) in &options.scenarios {
        executors.spawn(run_executor(
            name.as_str().into(),
            spec.clone(),
            func.clone(),
            metrics.clone(),
            limiter.clone(),
            stop_rx.clone(),
        ));
    }

    let mut ticker = interval(THRESHOLD_EVAL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing is recorded yet.
    ticker.tick().await;

    let ctrl_c = interrupted(config.interruptible);
    tokio::pin!(ctrl_c);

    let mut scenarios = vec![];
    let mut abort = None;
    loop {
        tokio::select! {
            joined = executors.join_next() => match joined {
                Some(Ok(summary)) => scenarios.push(summary),
                Some(Err(err)) => error!("Executor task failed: {err}"),
                None => break,
            },
            _ = ticker.tick(), if abort.is_none() && !evaluator.is_empty() => {
                let snapshot = metrics.snapshot();
                debug!("Evaluating thresholds at {:?}", snapshot.elapsed);
                if let Some(reason) = evaluator.abort_reason(&snapshot) {
                    abort = Some(reason);
                    stop_tx.send_replace(true);
                }
            }
            _ = &mut ctrl_c, if abort.is_none() => {
                warn!("Interrupted; stopping all scenarios");
                abort = Some(AbortReason::External);
                stop_tx.send_replace(true);
            }
        }
    }

    let snapshot = metrics.snapshot();
    let thresholds = evaluator.evaluate(&snapshot);
    scenarios.sort_by(|a, b| a.name.cmp(&b.name));

    let summary = RunSummary {
        elapsed: snapshot.elapsed,
        scenarios,
        checks: metrics.check_results(),
        metrics: snapshot,
        thresholds,
        abort,
    };

    match &summary.abort {
        Some(reason) => warn!("Run aborted after {:?}: {reason}", summary.elapsed),
        None if summary.thresholds_passed() => info!("Run complete"),
        None => warn!("Run complete; some thresholds have failed"),
    }

    Ok(summary)
}

/// Resolves on Ctrl-C, or never if the run is not interruptible.
async fn interrupted(enabled: bool) {
    if enabled {
        match tokio::signal::ctrl_c().await {
            Ok(()) => return,
            Err(err) => error!("Unable to listen for Ctrl-C: {err}"),
        }
    }
    std::future::pending::<()>().await
}

fn rate_limiter(rps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(rps).allow_burst(NonZeroU32::MIN))
}
