use crate::context::{VuContext, VU_CONTEXT};
use crate::metrics::RunMetrics;
use governor::DefaultDirectRateLimiter;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

struct Vu {
    id: u64,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Vu {
    /// Finish the current iteration, then exit.
    fn retire(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// The VUs of one scenario.
///
/// Each VU loops over the scenario function until told to stop. A VU being scaled away is
/// first asked to stop after its current iteration; it is aborted if that takes longer than
/// the allowed grace period.
pub(crate) struct VuPool<T> {
    func: T,
    scenario: Arc<str>,
    metrics: Arc<RunMetrics>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,

    active: Vec<Vu>,
    retiring: Vec<(Vu, Instant)>,
    next_id: u64,
}

impl<T, F> VuPool<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = ()> + Send + 'static,
{
    pub fn new(
        func: T,
        scenario: Arc<str>,
        metrics: Arc<RunMetrics>,
        limiter: Option<Arc<DefaultDirectRateLimiter>>,
    ) -> Self {
        Self {
            func,
            scenario,
            metrics,
            limiter,
            active: vec![],
            retiring: vec![],
            next_id: 1,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Grow or shrink the pool to `target` VUs.
    pub fn set_vus(&mut self, target: u64, graceful_ramp_down: Duration) {
        let target = target as usize;

        if self.active.len() > target {
            let deadline = Instant::now() + graceful_ramp_down;
            while self.active.len() > target {
                if let Some(vu) = self.active.pop() {
                    trace!("Retiring VU {}", vu.id);
                    vu.retire();
                    self.retiring.push((vu, deadline));
                }
            }
        }

        while self.active.len() < target {
            let vu = self.spawn();
            self.active.push(vu);
        }
    }

    /// Drop retired VUs that have exited and abort those past their deadline.
    pub fn reap(&mut self) {
        let now = Instant::now();
        self.retiring.retain(|(vu, deadline)| {
            if vu.handle.is_finished() {
                return false;
            }
            if now >= *deadline {
                debug!("VU {} did not finish its iteration in time; aborting", vu.id);
                vu.handle.abort();
                return false;
            }
            true
        });
    }

    /// Stop every VU, waiting up to `graceful_stop` for in-flight iterations.
    ///
    /// VUs already retiring keep their ramp-down deadline unless `graceful_stop` ends sooner.
    pub async fn shutdown(mut self, graceful_stop: Duration) {
        let deadline = Instant::now() + graceful_stop;
        for vu in &self.active {
            vu.retire();
        }

        let vus = self.active.drain(..).map(|vu| (vu, deadline)).chain(
            self.retiring
                .drain(..)
                .map(|(vu, retire_by)| (vu, retire_by.min(deadline))),
        );

        for (mut vu, deadline) in vus {
            if tokio::time::timeout_at(deadline, &mut vu.handle).await.is_err() {
                debug!("VU {} interrupted", vu.id);
                vu.handle.abort();
                // Wait for the abort to land so the VU is no longer counted.
                let _ = vu.handle.await;
            }
        }
    }

    fn spawn(&mut self) -> Vu {
        let id = self.next_id;
        self.next_id += 1;

        let stop = Arc::new(AtomicBool::new(false));
        let ctx = VuContext {
            vu: id,
            scenario: self.scenario.clone(),
            metrics: self.metrics.clone(),
            limiter: self.limiter.clone(),
        };

        trace!("Spawning VU {id}");
        let handle = tokio::spawn(VU_CONTEXT.scope(
            ctx,
            run_vu(self.func.clone(), stop.clone(), self.metrics.clone()),
        ));

        Vu { id, stop, handle }
    }
}

async fn run_vu<T, F>(func: T, stop: Arc<AtomicBool>, metrics: Arc<RunMetrics>)
where
    T: Fn() -> F,
    F: Future<Output = ()>,
{
    let _guard = metrics.vu_started();
    while !stop.load(Ordering::Relaxed) {
        let start = Instant::now();
        func().await;
        metrics.record_iteration(start.elapsed());

        // An iteration that never awaits would otherwise hold the worker thread.
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use surge_core::MetricName;

    fn pool<T, F>(func: T) -> (VuPool<T>, Arc<RunMetrics>)
    where
        T: Fn() -> F + Send + Sync + 'static + Clone,
        F: Future<Output = ()> + Send + 'static,
    {
        let metrics = Arc::new(RunMetrics::new());
        (VuPool::new(func, "test".into(), metrics.clone(), None), metrics)
    }

    async fn short_iteration() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test]
    #[ntest::timeout(2000)]
    async fn grows_and_shrinks() {
        let (mut pool, metrics) = pool(short_iteration);

        pool.set_vus(5, Duration::from_secs(1));
        assert_eq!(pool.len(), 5);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(metrics.active_vus(), 5);

        pool.set_vus(2, Duration::from_secs(1));
        assert_eq!(pool.len(), 2);
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.reap();
        assert_eq!(metrics.active_vus(), 2);

        pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(metrics.active_vus(), 0);
        let snapshot = metrics.snapshot();
        let iterations = snapshot.trend(MetricName::IterationDuration).unwrap();
        assert!(iterations.count() > 0);
    }

    #[tokio::test]
    #[ntest::timeout(2000)]
    async fn stuck_iterations_are_aborted_after_grace() {
        let (mut pool, metrics) = pool(|| tokio::time::sleep(Duration::from_secs(60)));

        pool.set_vus(3, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(metrics.active_vus(), 3);

        pool.shutdown(Duration::from_millis(100)).await;
        assert_eq!(metrics.active_vus(), 0);
    }

    #[tokio::test]
    #[ntest::timeout(2000)]
    async fn shutdown_cuts_ramp_down_grace_short() {
        let (mut pool, metrics) = pool(|| tokio::time::sleep(Duration::from_secs(60)));

        pool.set_vus(2, Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.set_vus(0, Duration::from_secs(10));
        pool.reap();
        assert_eq!(pool.len(), 0);
        assert_eq!(metrics.active_vus(), 2);

        let start = Instant::now();
        pool.shutdown(Duration::ZERO).await;
        assert!(start.elapsed() < Duration::from_secs(1), "{:?}", start.elapsed());
        assert_eq!(metrics.active_vus(), 0);
    }

    #[tokio::test]
    #[ntest::timeout(2000)]
    async fn vus_see_their_own_context() {
        let seen = Arc::new(AtomicU64::new(0));
        let func = {
            let seen = seen.clone();
            move || {
                let seen = seen.clone();
                async move {
                    let id = crate::vu_id().unwrap_or_default();
                    seen.fetch_max(id, Ordering::Relaxed);
                    assert_eq!(crate::scenario_name().as_deref(), Some("test"));
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
        };
        let (mut pool, _) = pool(func);

        pool.set_vus(4, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.shutdown(Duration::from_secs(1)).await;

        assert_eq!(seen.load(Ordering::Relaxed), 4);
    }
}
