//! Conditional gating of steps.
//!
//! Conditions are a small closed expression form interpreted directly — a
//! tagged enum over references, literals, comparisons, and boolean
//! combinators. Nothing here is ever evaluated as code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::binding::{parse_reference, resolve_path, ResultLookup};

// ---------------------------------------------------------------------------
// Operands
// ---------------------------------------------------------------------------

/// A comparison operand: an inline value or a `${stepId.path}` reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operand {
    Value { value: Value },
    Ref { path: String },
}

impl Operand {
    fn resolve(&self, results: &dyn ResultLookup) -> Option<Value> {
        match self {
            Operand::Value { value } => Some(value.clone()),
            Operand::Ref { path } => {
                let (step_id, rest) = parse_reference(path).or_else(|| {
                    // Bare `step.path` form is accepted alongside `${…}`.
                    match path.split_once('.') {
                        Some((step, rest)) if !step.is_empty() => Some((step, rest)),
                        None if !path.is_empty() => Some((path.as_str(), "")),
                        _ => None,
                    }
                })?;
                resolve_path(results.completed(step_id)?, rest).cloned()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Comparison operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Boolean expression over prior step outputs.
///
/// Evaluation returns `None` when any referenced step has no completed
/// result or a reference resolves to something the expression cannot use;
/// the engine treats that the same as `false` — the gated step is skipped,
/// never failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Constant.
    Literal { value: bool },
    /// A reference that must resolve to a boolean.
    Ref { path: String },
    /// Binary comparison of two operands.
    Compare { op: CompareOp, lhs: Operand, rhs: Operand },
    /// True iff every term is true.
    All { terms: Vec<Condition> },
    /// True iff at least one term is true.
    Any { terms: Vec<Condition> },
    /// Negation.
    Not { term: Box<Condition> },
}

impl Condition {
    /// Evaluate against completed step results.
    ///
    /// `None` means "unresolvable" and is propagated strictly: an
    /// expression over a missing reference never becomes satisfied by
    /// negation or short-circuiting.
    pub fn evaluate(&self, results: &dyn ResultLookup) -> Option<bool> {
        match self {
            Condition::Literal { value } => Some(*value),
            Condition::Ref { path } => {
                match (Operand::Ref { path: path.clone() }).resolve(results)? {
                    Value::Bool(flag) => Some(flag),
                    Value::Null => Some(false),
                    _ => None,
                }
            }
            Condition::Compare { op, lhs, rhs } => {
                compare(*op, &lhs.resolve(results)?, &rhs.resolve(results)?)
            }
            Condition::All { terms } => {
                let mut satisfied = true;
                for term in terms {
                    satisfied &= term.evaluate(results)?;
                }
                Some(satisfied)
            }
            Condition::Any { terms } => {
                let mut satisfied = false;
                for term in terms {
                    satisfied |= term.evaluate(results)?;
                }
                Some(satisfied)
            }
            Condition::Not { term } => term.evaluate(results).map(|v| !v),
        }
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Option<bool> {
    match op {
        CompareOp::Eq => Some(lhs == rhs),
        CompareOp::Ne => Some(lhs != rhs),
        _ => {
            let ordering = order(lhs, rhs)?;
            Some(match op {
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::Gte => ordering.is_ge(),
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Lte => ordering.is_le(),
                CompareOp::Eq | CompareOp::Ne => unreachable!(),
            })
        }
    }
}

/// Ordering is defined for number pairs and string pairs only.
fn order(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn results() -> HashMap<String, Value> {
        HashMap::from([
            ("step1".to_string(), json!({ "flag": true, "count": 7, "label": "ok" })),
            ("step2".to_string(), json!({ "flag": false })),
        ])
    }

    fn reference(path: &str) -> Operand {
        Operand::Ref { path: path.to_string() }
    }

    fn value(v: Value) -> Operand {
        Operand::Value { value: v }
    }

    #[test]
    fn boolean_reference_evaluates_to_its_value() {
        let results = results();
        let yes = Condition::Ref { path: "${step1.flag}".into() };
        let no = Condition::Ref { path: "${step2.flag}".into() };
        assert_eq!(yes.evaluate(&results), Some(true));
        assert_eq!(no.evaluate(&results), Some(false));
    }

    #[test]
    fn reference_to_missing_step_is_unresolvable() {
        let condition = Condition::Ref { path: "${ghost.flag}".into() };
        assert_eq!(condition.evaluate(&results()), None);
    }

    #[test]
    fn negation_of_unresolvable_stays_unresolvable() {
        let condition = Condition::Not {
            term: Box::new(Condition::Ref { path: "${ghost.flag}".into() }),
        };
        assert_eq!(condition.evaluate(&results()), None);
    }

    #[test]
    fn numeric_comparisons() {
        let results = results();
        let gt = Condition::Compare {
            op: CompareOp::Gt,
            lhs: reference("${step1.count}"),
            rhs: value(json!(5)),
        };
        let lte = Condition::Compare {
            op: CompareOp::Lte,
            lhs: reference("${step1.count}"),
            rhs: value(json!(5)),
        };
        assert_eq!(gt.evaluate(&results), Some(true));
        assert_eq!(lte.evaluate(&results), Some(false));
    }

    #[test]
    fn equality_is_structural() {
        let condition = Condition::Compare {
            op: CompareOp::Eq,
            lhs: reference("${step1.label}"),
            rhs: value(json!("ok")),
        };
        assert_eq!(condition.evaluate(&results()), Some(true));
    }

    #[test]
    fn ordering_across_kinds_is_unresolvable() {
        let condition = Condition::Compare {
            op: CompareOp::Gt,
            lhs: reference("${step1.label}"),
            rhs: value(json!(5)),
        };
        assert_eq!(condition.evaluate(&results()), None);
    }

    #[test]
    fn combinators_compose() {
        let results = results();
        let both = Condition::All {
            terms: vec![
                Condition::Ref { path: "${step1.flag}".into() },
                Condition::Literal { value: true },
            ],
        };
        let either = Condition::Any {
            terms: vec![
                Condition::Ref { path: "${step2.flag}".into() },
                Condition::Literal { value: false },
            ],
        };
        assert_eq!(both.evaluate(&results), Some(true));
        assert_eq!(either.evaluate(&results), Some(false));
    }

    #[test]
    fn condition_round_trips_through_serde() {
        let condition = Condition::Compare {
            op: CompareOp::Gte,
            lhs: reference("${step1.count}"),
            rhs: value(json!(3)),
        };
        let encoded = serde_json::to_string(&condition).unwrap();
        let decoded: Condition = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.evaluate(&results()), Some(true));
    }
}
