//! One executor per node kind. Dispatch is a total match over [`NodeSpec`].

pub mod condition;
pub mod fetch;
pub mod generate;
pub mod notify;
pub mod trigger;

use serde_json::Value;

use strategist_core::error::Result;
use strategist_core::types::{Handle, Node, NodeSpec};

use crate::engine::StrategyFlowEngine;
use crate::variables::VariableEnv;

/// What a node produced. Applied to the environment by the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    /// Snapshot of the resolved inputs, for the audit log.
    pub input: Value,
    pub output: Value,
    /// Variables to set, in order.
    pub assignments: Vec<(String, Value)>,
    /// Handle whose edges are followed next.
    pub branch: Handle,
    /// Failure that was absorbed rather than propagated.
    pub soft_error: Option<String>,
}

impl NodeOutput {
    pub fn new(input: Value, output: Value) -> Self {
        Self {
            input,
            output,
            assignments: Vec::new(),
            branch: Handle::Default,
            soft_error: None,
        }
    }

    /// Assign the output to `name`; blank names are ignored.
    pub fn assign_output(mut self, name: Option<&str>) -> Self {
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            self.assignments.push((name.to_string(), self.output.clone()));
        }
        self
    }

    pub fn apply(&self, env: &mut VariableEnv) {
        for (name, value) in &self.assignments {
            env.set(name.clone(), value.clone());
        }
    }
}

/// Run a node against a snapshot of the environment.
pub async fn dispatch(
    engine: &StrategyFlowEngine,
    node: &Node,
    env: &VariableEnv,
) -> Result<NodeOutput> {
    match &node.spec {
        NodeSpec::Fetch(spec) => fetch::execute(engine.fetcher(), spec, env).await,
        NodeSpec::Generate(spec) => {
            generate::execute(engine.language_model(), engine.settings(), spec, env).await
        }
        NodeSpec::Condition(spec) => Ok(condition::execute(spec, env)),
        NodeSpec::Trigger(spec) => trigger::execute(engine, spec, env).await,
        NodeSpec::Notify(spec) => {
            notify::execute(engine.notifier(), engine.settings(), spec, env).await
        }
    }
}
