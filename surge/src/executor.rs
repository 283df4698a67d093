use crate::metrics::RunMetrics;
use crate::vu::VuPool;
use governor::DefaultDirectRateLimiter;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use surge_core::{ScenarioSpec, ScenarioSummary, VU_ADJUST_INTERVAL};
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Drive one scenario's VU count along its schedule until the schedule ends or `stop` is set.
#[instrument(name = "executor", skip_all, fields(scenario = %name))]
pub(crate) async fn run_executor<T, F>(
    name: Arc<str>,
    spec: ScenarioSpec,
    func: T,
    metrics: Arc<RunMetrics>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    mut stop: watch::Receiver<bool>,
) -> ScenarioSummary
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    info!(
        "Starting {} executor: up to {} VUs over {}",
        spec.executor(),
        spec.max_vus(),
        humantime::format_duration(spec.total_duration())
    );

    let mut pool = VuPool::new(func, name.clone(), metrics, limiter);
    let start = Instant::now();
    let mut ticker = interval(VU_ADJUST_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_target = None;
    let mut interrupted = *stop.borrow_and_update();
    while !interrupted {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(target) = spec.target_vus(start.elapsed()) else {
                    break;
                };
                if last_target != Some(target) {
                    trace!("Target VUs: {target}");
                    last_target = Some(target);
                }
                pool.set_vus(target, spec.graceful_ramp_down());
                pool.reap();
            }
            changed = stop.changed() => {
                interrupted = changed.is_err() || *stop.borrow_and_update();
            }
        }
    }

    let grace = if interrupted {
        debug!("Interrupted after {:?}", start.elapsed());
        Duration::ZERO
    } else {
        spec.graceful_stop()
    };
    pool.shutdown(grace).await;

    info!("Scenario finished after {:?}", start.elapsed());

    ScenarioSummary {
        name: name.to_string(),
        executor: spec.executor(),
        max_vus: spec.max_vus(),
        planned_duration: spec.total_duration(),
    }
}
