use strategist_core::types::*;

pub fn strategy(id: StrategyId) -> Strategy {
    Strategy {
        id,
        name: format!("Strategy {}", id),
        enabled: true,
        schedule: None,
        trigger_meta: serde_json::Value::Null,
    }
}

fn node(id: NodeId, order_index: i64, name: &str, spec: NodeSpec) -> Node {
    Node {
        id,
        strategy_id: 0,
        name: name.to_string(),
        order_index,
        enabled: true,
        spec,
    }
}

pub fn fetch(id: NodeId, url: &str, output_variable: &str) -> Node {
    node(
        id,
        0,
        &format!("Fetch {}", id),
        NodeSpec::Fetch(FetchNode {
            url: url.to_string(),
            method: "GET".to_string(),
            headers: None,
            body: None,
            extract_path: None,
            parse_number: false,
            output_variable: output_variable.to_string(),
        }),
    )
}

pub fn fetch_extract(id: NodeId, url: &str, path: &str, output_variable: &str) -> Node {
    let mut n = fetch(id, url, output_variable);
    if let NodeSpec::Fetch(f) = &mut n.spec {
        f.extract_path = Some(path.to_string());
        f.parse_number = true;
    }
    n
}

pub fn generate(id: NodeId, prompt: &str, output_variable: &str) -> Node {
    node(
        id,
        0,
        &format!("Generate {}", id),
        NodeSpec::Generate(GenerateNode {
            tier: ModelTier::Cheap,
            system_prompt: None,
            prompt: prompt.to_string(),
            include_variables: false,
            output_variable: output_variable.to_string(),
        }),
    )
}

pub fn condition(id: NodeId, left: &str, operator: &str, right: &str) -> Node {
    node(
        id,
        0,
        &format!("Condition {}", id),
        NodeSpec::Condition(ConditionNode {
            left: left.to_string(),
            operator: operator.to_string(),
            right: right.to_string(),
            true_output: None,
            false_output: None,
        }),
    )
}

pub fn trigger(id: NodeId, target: StrategyId, wait_for_completion: bool) -> Node {
    node(
        id,
        0,
        &format!("Trigger {}", id),
        NodeSpec::Trigger(TriggerNode {
            target_strategy_id: target,
            guard_variable: None,
            forward_variables: Vec::new(),
            wait_for_completion,
            output_variable: None,
        }),
    )
}

pub fn notify(id: NodeId, message: &str) -> Node {
    node(
        id,
        0,
        &format!("Notify {}", id),
        NodeSpec::Notify(NotifyNode {
            chat_id: None,
            message: message.to_string(),
            include_variables: false,
            guard_variable: None,
            severity: Severity::Info,
            render_mode: RenderMode::Plain,
        }),
    )
}

/// Set the legacy execution order of a node.
pub fn ordered(mut node: Node, order_index: i64) -> Node {
    node.order_index = order_index;
    node
}

pub fn disabled(mut node: Node) -> Node {
    node.enabled = false;
    node
}

pub fn edge(source: &str, target: &str) -> Edge {
    Edge::new(source, Handle::Default, target)
}

pub fn branch(source: &str, handle: Handle, target: &str) -> Edge {
    Edge::new(source, handle, target)
}
