use std::str::FromStr;

use serde_json::Value;
use tracing::warn;

use strategist_core::error::{Result, StrategistError};

use crate::variables::{display_value, VariableEnv};

/// Comparison applied by a condition node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    StartsWith,
    EndsWith,
}

impl FromStr for Operator {
    type Err = StrategistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "==" | "===" | "eq" => Ok(Self::Eq),
            "!=" | "!==" | "ne" => Ok(Self::Ne),
            ">" | "gt" => Ok(Self::Gt),
            "<" | "lt" => Ok(Self::Lt),
            ">=" | "gte" => Ok(Self::Ge),
            "<=" | "lte" => Ok(Self::Le),
            "contains" => Ok(Self::Contains),
            "startsWith" | "starts_with" => Ok(Self::StartsWith),
            "endsWith" | "ends_with" => Ok(Self::EndsWith),
            other => Err(StrategistError::Condition(format!("Unknown operator: {}", other))),
        }
    }
}

/// Resolve one operand against the environment.
///
/// `$name` (or `$a.b`) reads a variable and falls back to the operand text
/// when missing. A bare operand is a literal unless a variable of exactly
/// that name exists.
pub fn resolve_operand(operand: &str, env: &VariableEnv) -> Value {
    if let Some(name) = operand.strip_prefix('$') {
        return match env.get_path(name) {
            Some(value) => value.clone(),
            None => {
                warn!(operand, "Variable not found, using literal operand");
                Value::String(operand.to_string())
            }
        };
    }
    env.get(operand)
        .cloned()
        .unwrap_or_else(|| Value::String(operand.to_string()))
}

/// Number-like values: JSON numbers and trimmed, non-empty numeric strings.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Forced coercion for ordering operators; booleans and null count as 1/0,
/// blank strings as 0.
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        other => as_number(other),
    }
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return l == r;
    }
    left == right || display_value(left) == display_value(right)
}

/// Apply `op` to two resolved operands.
pub fn compare(left: &Value, op: Operator, right: &Value) -> bool {
    match op {
        Operator::Eq => loose_equals(left, right),
        Operator::Ne => !loose_equals(left, right),
        Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le => {
            // A side that does not coerce behaves like NaN: every ordering is false
            let (Some(l), Some(r)) = (coerce_number(left), coerce_number(right)) else {
                return false;
            };
            match op {
                Operator::Gt => l > r,
                Operator::Lt => l < r,
                Operator::Ge => l >= r,
                _ => l <= r,
            }
        }
        Operator::Contains => display_value(left).contains(&display_value(right)),
        Operator::StartsWith => display_value(left).starts_with(&display_value(right)),
        Operator::EndsWith => display_value(left).ends_with(&display_value(right)),
    }
}

/// Resolve both operands and compare them.
pub fn evaluate(left: &str, operator: &str, right: &str, env: &VariableEnv) -> Result<bool> {
    let op: Operator = operator.parse()?;
    let l = resolve_operand(left, env);
    let r = resolve_operand(right, env);
    Ok(compare(&l, op, &r))
}

/// [`evaluate`], treating any evaluation error as `false`.
pub fn evaluate_or_false(left: &str, operator: &str, right: &str, env: &VariableEnv) -> bool {
    match evaluate(left, operator, right, env) {
        Ok(result) => result,
        Err(e) => {
            warn!(left, operator, right, error = %e, "Condition evaluation failed, treating as false");
            false
        }
    }
}
