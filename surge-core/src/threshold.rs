//! Threshold expressions such as `rate<0.01` or `p(99)<1000`.
use crate::{ConfigError, MetricKind, MetricName, MetricValue, ThresholdRule};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Count,
    Rate,
    Value,
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in percent, e.g. `p(99)` is `Percentile(99.)`.
    Percentile(f64),
}

impl Aggregation {
    pub fn is_valid_for(&self, kind: MetricKind) -> bool {
        use Aggregation::*;
        match kind {
            MetricKind::Counter => matches!(self, Count | Rate),
            MetricKind::Rate => matches!(self, Rate),
            MetricKind::Trend => matches!(self, Avg | Min | Max | Med | Percentile(_)),
            MetricKind::Gauge => matches!(self, Value | Min | Max),
        }
    }

    /// Reduce a metric to the single number this aggregation compares against.
    ///
    /// Returns `None` while the metric has no samples or the aggregation does not apply to it.
    pub fn apply(&self, metric: &MetricValue) -> Option<f64> {
        if !metric.has_samples() {
            return None;
        }

        match (self, metric) {
            (Aggregation::Count, MetricValue::Counter { count, .. }) => Some(*count as f64),
            (Aggregation::Rate, MetricValue::Counter { .. } | MetricValue::Rate { .. }) => {
                metric.rate_value()
            }
            (Aggregation::Value, MetricValue::Gauge { value, .. }) => Some(*value),
            (Aggregation::Min, MetricValue::Gauge { min, .. }) => Some(*min),
            (Aggregation::Max, MetricValue::Gauge { max, .. }) => Some(*max),
            (Aggregation::Avg, MetricValue::Trend(t)) => t.avg(),
            (Aggregation::Min, MetricValue::Trend(t)) => t.min(),
            (Aggregation::Max, MetricValue::Trend(t)) => t.max(),
            (Aggregation::Med, MetricValue::Trend(t)) => t.med(),
            (Aggregation::Percentile(p), MetricValue::Trend(t)) => t.percentile(*p),
            _ => None,
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Count => f.write_str("count"),
            Aggregation::Rate => f.write_str("rate"),
            Aggregation::Value => f.write_str("value"),
            Aggregation::Avg => f.write_str("avg"),
            Aggregation::Min => f.write_str("min"),
            Aggregation::Max => f.write_str("max"),
            Aggregation::Med => f.write_str("med"),
            Aggregation::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let agg = match s {
            "count" => Aggregation::Count,
            "rate" => Aggregation::Rate,
            "value" => Aggregation::Value,
            "avg" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "med" => Aggregation::Med,
            other => {
                let inner = other
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| format!("unknown aggregation `{other}`"))?;
                let p: f64 = inner
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid percentile `{inner}`"))?;
                if !(0. ..=100.).contains(&p) {
                    return Err(format!("percentile {p} is outside 0..=100"));
                }
                Aggregation::Percentile(p)
            }
        };
        Ok(agg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    StrictEq,
    Ne,
}

impl Operator {
    // Longest tokens first so `<=` is not read as `<`.
    const TOKENS: [(&'static str, Operator); 7] = [
        ("===", Operator::StrictEq),
        ("==", Operator::Eq),
        ("!=", Operator::Ne),
        ("<=", Operator::Le),
        (">=", Operator::Ge),
        ("<", Operator::Lt),
        (">", Operator::Gt),
    ];

    pub fn compare(&self, observed: f64, limit: f64) -> bool {
        match self {
            Operator::Lt => observed < limit,
            Operator::Le => observed <= limit,
            Operator::Gt => observed > limit,
            Operator::Ge => observed >= limit,
            Operator::Eq | Operator::StrictEq => observed == limit,
            Operator::Ne => observed != limit,
        }
    }

    fn as_str(&self) -> &'static str {
        Operator::TOKENS
            .iter()
            .find(|(_, op)| op == self)
            .map(|(token, _)| *token)
            .unwrap_or("?")
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `<aggregation> <operator> <number>` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub operator: Operator,
    pub limit: f64,
}

impl ThresholdExpr {
    /// Returns the observed value and whether it satisfies the expression, or `None` when there
    /// is nothing to judge yet.
    pub fn evaluate(&self, metric: &MetricValue) -> Option<(f64, bool)> {
        let observed = self.aggregation.apply(metric)?;
        Some((observed, self.operator.compare(observed, self.limit)))
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregation, self.operator, self.limit)
    }
}

impl FromStr for ThresholdExpr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigError::InvalidThreshold {
            expression: s.to_string(),
            reason,
        };

        let op_start = s
            .find(['<', '>', '=', '!'])
            .ok_or_else(|| invalid("missing comparison operator".into()))?;
        let (lhs, rest) = s.split_at(op_start);

        let (token, operator) = Operator::TOKENS
            .iter()
            .find(|(token, _)| rest.starts_with(token))
            .ok_or_else(|| invalid(format!("unknown operator in `{rest}`")))?;

        let aggregation: Aggregation = lhs.trim().parse().map_err(invalid)?;

        let rhs = rest[token.len()..].trim();
        let limit: f64 = rhs
            .parse()
            .map_err(|_| invalid(format!("`{rhs}` is not a number")))?;

        Ok(ThresholdExpr {
            aggregation,
            operator: *operator,
            limit,
        })
    }
}

/// A threshold rule bound to its metric, ready to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: MetricName,
    pub source: String,
    pub expr: ThresholdExpr,
    pub abort_on_fail: bool,
    pub delay_abort_eval: Option<Duration>,
}

impl Threshold {
    pub fn compile(metric: &str, rule: &ThresholdRule) -> Result<Self, ConfigError> {
        let metric_name: MetricName = metric.parse()?;
        let expr: ThresholdExpr = rule.threshold.parse()?;

        let kind = metric_name.kind();
        if !expr.aggregation.is_valid_for(kind) {
            return Err(ConfigError::AggregationMismatch {
                metric: metric.to_string(),
                kind: kind.as_str(),
                aggregation: expr.aggregation.to_string(),
                expression: rule.threshold.clone(),
            });
        }

        Ok(Self {
            metric: metric_name,
            source: rule.threshold.clone(),
            expr,
            abort_on_fail: rule.abort_on_fail,
            delay_abort_eval: rule.delay_abort_eval,
        })
    }

    /// Whether a failure of this rule, observed `elapsed` into the run, should stop the run.
    pub fn aborts_at(&self, elapsed: Duration) -> bool {
        self.abort_on_fail && self.delay_abort_eval.map_or(true, |delay| elapsed >= delay)
    }
}
