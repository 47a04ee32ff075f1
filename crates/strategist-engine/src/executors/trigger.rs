use serde_json::json;
use tracing::{debug, info, warn};

use strategist_core::error::Result;
use strategist_core::types::{TriggerKind, TriggerNode};

use super::NodeOutput;
use crate::engine::StrategyFlowEngine;
use crate::variables::VariableEnv;

/// Start a run of another strategy.
///
/// The child gets a fresh environment holding only the forwarded
/// variables. With `wait_for_completion` the child's failure is reported in
/// the output but does not fail this node; otherwise the child runs as an
/// independent task and finalizes its own execution row.
pub async fn execute(
    engine: &StrategyFlowEngine,
    node: &TriggerNode,
    env: &VariableEnv,
) -> Result<NodeOutput> {
    let target = node.target_strategy_id;
    let input = json!({
        "targetStrategyId": target,
        "forwardVariables": node.forward_variables,
        "waitForCompletion": node.wait_for_completion,
    });

    if let Some(guard) = node.guard_variable.as_deref().filter(|g| !g.trim().is_empty()) {
        if !env.is_truthy(guard) {
            debug!(guard, target, "Trigger guard is falsy, skipping");
            return Ok(NodeOutput::new(input, json!({ "triggered": false }))
                .assign_output(node.output_variable.as_deref()));
        }
    }

    let child = engine
        .store()
        .create_execution(target, TriggerKind::Manual)
        .await?;
    let forwarded = env.subset(&node.forward_variables);

    let output = if node.wait_for_completion {
        info!(target, execution_id = child.id, "Triggering strategy and waiting");
        let outcome = engine.run_with_variables(target, child.id, forwarded).await;
        engine.finish_execution(child.id, &outcome).await;

        if !outcome.success {
            warn!(
                target,
                execution_id = child.id,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Triggered strategy failed"
            );
        }

        json!({
            "triggered": true,
            "waitForCompletion": true,
            "executionId": child.id,
            "success": outcome.success,
            "error": outcome.error,
            "variables": outcome.variables,
        })
    } else {
        info!(target, execution_id = child.id, "Triggering strategy in background");
        let engine = engine.clone();
        let execution_id = child.id;
        tokio::spawn(async move {
            let outcome = engine.run_with_variables(target, execution_id, forwarded).await;
            engine.finish_execution(execution_id, &outcome).await;
        });

        json!({
            "triggered": true,
            "waitForCompletion": false,
            "executionId": child.id,
        })
    };

    Ok(NodeOutput::new(input, output).assign_output(node.output_variable.as_deref()))
}
