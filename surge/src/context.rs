use crate::metrics::RunMetrics;
use governor::DefaultDirectRateLimiter;
use std::sync::Arc;

/// Per-VU state made available to `http` and `check` while an iteration runs.
#[derive(Clone)]
pub(crate) struct VuContext {
    pub vu: u64,
    pub scenario: Arc<str>,
    pub metrics: Arc<RunMetrics>,
    pub limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

tokio::task_local! {
    pub(crate) static VU_CONTEXT: VuContext;
}

pub(crate) fn current() -> Option<VuContext> {
    VU_CONTEXT.try_with(Clone::clone).ok()
}

/// Id of the VU running the current task, starting at 1 within each scenario.
///
/// `None` outside of a running scenario.
pub fn vu_id() -> Option<u64> {
    VU_CONTEXT.try_with(|ctx| ctx.vu).ok()
}

/// Name of the scenario the current VU belongs to.
pub fn scenario_name() -> Option<Arc<str>> {
    VU_CONTEXT.try_with(|ctx| ctx.scenario.clone()).ok()
}
