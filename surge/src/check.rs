use crate::context;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// A named predicate evaluated by [`check`].
pub type Check<'a, T> = (&'a str, &'a dyn Fn(&T) -> bool);

/// Evaluate each named predicate against `value` and record the outcome under its name.
///
/// A failing check is only recorded; it never interrupts the iteration. Returns whether all
/// predicates held.
///
/// ```ignore
/// let res = http::get("http://localhost:8000/healthz").await;
/// check(&res, &[("status is 200", &|r: &Response| r.status() == 200)]);
/// ```
pub fn check<T>(value: &T, checks: &[Check<'_, T>]) -> bool {
    let ctx = context::current();
    if ctx.is_none() {
        warn!("No VU context available; checks are not recorded.");
    }

    let mut all_passed = true;
    for (name, predicate) in checks {
        let passed = predicate(value);
        if !passed {
            trace!("Check `{name}` failed");
        }
        if let Some(ctx) = &ctx {
            ctx.metrics.record_check(name, passed);
        }
        all_passed &= passed;
    }
    all_passed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{VuContext, VU_CONTEXT};
    use crate::metrics::RunMetrics;
    use std::sync::Arc;

    #[tokio::test]
    async fn records_each_check_once() {
        let metrics = Arc::new(RunMetrics::new());
        let ctx = VuContext {
            vu: 1,
            scenario: "test".into(),
            metrics: metrics.clone(),
            limiter: None,
        };

        let passed = VU_CONTEXT
            .scope(ctx, async {
                check(
                    &204u16,
                    &[
                        ("is 204", &|s: &u16| *s == 204),
                        ("is 200", &|s: &u16| *s == 200),
                    ],
                )
            })
            .await;

        assert!(!passed);
        let results = metrics.check_results();
        assert_eq!(results.len(), 2);
        assert_eq!((results[0].passes, results[0].fails), (1, 0));
        assert_eq!((results[1].passes, results[1].fails), (0, 1));
    }

    #[tracing_test::traced_test]
    #[test]
    fn works_outside_a_vu() {
        assert!(check(&"ok", &[("non-empty", &|s: &&str| !s.is_empty())]));
        assert!(logs_contain("No VU context available"));
    }
}
