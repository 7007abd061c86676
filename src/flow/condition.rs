//! Inline flow conditions.
//!
//! A [`FlowCondition`] compares one field of the execution variables against
//! a literal using a fixed operator set. Field paths are dotted
//! (`"order.amount"`). Evaluation is total: an unresolvable field, a type
//! mismatch or a bad regex make the condition false rather than failing the
//! flow.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    StartsWith,
    EndsWith,
    /// Regular-expression match over the field rendered as a string.
    Matches,
    In,
    NotIn,
    /// Ignores `value`; true when the field is absent or JSON null.
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowCondition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl FlowCondition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Evaluate against the current execution variables.
    pub fn evaluate(&self, variables: &Value) -> bool {
        let field = resolve_path(variables, &self.field);

        match self.operator {
            ConditionOperator::IsNull => field.map_or(true, Value::is_null),
            ConditionOperator::IsNotNull => field.is_some_and(|v| !v.is_null()),
            _ => {
                let Some(field) = field else { return false };
                match self.operator {
                    ConditionOperator::Eq => loose_eq(field, &self.value),
                    ConditionOperator::Neq => !loose_eq(field, &self.value),
                    ConditionOperator::Gt => compare(field, &self.value, |o| o > 0.0),
                    ConditionOperator::Gte => compare(field, &self.value, |o| o >= 0.0),
                    ConditionOperator::Lt => compare(field, &self.value, |o| o < 0.0),
                    ConditionOperator::Lte => compare(field, &self.value, |o| o <= 0.0),
                    ConditionOperator::Contains => match (field, &self.value) {
                        (Value::String(s), Value::String(needle)) => s.contains(needle),
                        (Value::Array(items), needle) => items.iter().any(|v| loose_eq(v, needle)),
                        _ => false,
                    },
                    ConditionOperator::StartsWith => {
                        str_pair(field, &self.value).is_some_and(|(s, p)| s.starts_with(p))
                    }
                    ConditionOperator::EndsWith => {
                        str_pair(field, &self.value).is_some_and(|(s, p)| s.ends_with(p))
                    }
                    ConditionOperator::Matches => {
                        let Value::String(pattern) = &self.value else {
                            return false;
                        };
                        match Regex::new(pattern) {
                            Ok(re) => re.is_match(&render(field)),
                            Err(err) => {
                                tracing::warn!(pattern, error = %err, "invalid condition regex");
                                false
                            }
                        }
                    }
                    ConditionOperator::In => membership(field, &self.value),
                    ConditionOperator::NotIn => !membership(field, &self.value),
                    ConditionOperator::IsNull | ConditionOperator::IsNotNull => unreachable!(),
                }
            }
        }
    }
}

/// Walk a dotted path through nested objects (and numeric array indices).
fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Equality with numeric coercion: `1` equals `1.0`.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value, test: impl Fn(f64) -> bool) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => {
            let ordering = x.cmp(y) as i8 as f64;
            test(ordering)
        }
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => test(x - y),
            _ => false,
        },
    }
}

fn str_pair<'a>(a: &'a Value, b: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((a.as_str()?, b.as_str()?))
}

fn membership(field: &Value, value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|v| loose_eq(field, v)),
        _ => false,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
