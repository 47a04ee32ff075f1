use serde_json::{json, Value};
use tracing::debug;

use strategist_core::types::{ConditionNode, Handle};

use super::NodeOutput;
use crate::condition::{evaluate_or_false, resolve_operand};
use crate::variables::VariableEnv;

pub fn execute(node: &ConditionNode, env: &VariableEnv) -> NodeOutput {
    let result = evaluate_or_false(&node.left, &node.operator, &node.right, env);

    let input = json!({
        "left": resolve_operand(&node.left, env),
        "operator": node.operator,
        "right": resolve_operand(&node.right, env),
    });
    debug!(left = %node.left, operator = %node.operator, right = %node.right, result, "Condition evaluated");

    let mut out = NodeOutput::new(input, Value::Bool(result));
    out.branch = if result { Handle::True } else { Handle::False };
    if let Some(name) = node.true_output.as_deref().filter(|n| !n.trim().is_empty()) {
        out.assignments.push((name.to_string(), Value::Bool(result)));
    }
    if let Some(name) = node.false_output.as_deref().filter(|n| !n.trim().is_empty()) {
        out.assignments.push((name.to_string(), Value::Bool(!result)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(operator: &str) -> ConditionNode {
        ConditionNode {
            left: "$price".into(),
            operator: operator.into(),
            right: "50000".into(),
            true_output: Some("highFlag".into()),
            false_output: Some("lowFlag".into()),
        }
    }

    fn env(price: i64) -> VariableEnv {
        let mut env = VariableEnv::new();
        env.set("price", json!(price));
        env
    }

    #[test]
    fn test_true_branch_sets_both_flags() {
        let out = execute(&node(">"), &env(60000));
        assert_eq!(out.branch, Handle::True);
        assert_eq!(out.output, json!(true));
        assert_eq!(
            out.assignments,
            vec![
                ("highFlag".to_string(), json!(true)),
                ("lowFlag".to_string(), json!(false)),
            ]
        );
        assert_eq!(out.input["left"], json!(60000));
    }

    #[test]
    fn test_false_branch() {
        let out = execute(&node(">"), &env(40000));
        assert_eq!(out.branch, Handle::False);
        assert_eq!(out.assignments[0], ("highFlag".to_string(), json!(false)));
    }

    #[test]
    fn test_bad_operator_takes_false_branch() {
        let out = execute(&node("between"), &env(60000));
        assert_eq!(out.branch, Handle::False);
        assert_eq!(out.output, json!(false));
    }
}
