use std::collections::{HashMap, HashSet};

use tracing::debug;

use strategist_core::types::{Edge, Handle, Node, END_NODE, START_NODE};

/// Adjacency view of a strategy's enabled nodes and their edges.
///
/// Nodes are keyed `"{kind}_{id}"`. Edges leaving a disabled or unknown
/// node are dropped; edges pointing at one are kept and simply lead
/// nowhere when followed.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    nodes: HashMap<String, Node>,
    adjacency: HashMap<(String, Handle), Vec<String>>,
    start: Vec<String>,
}

impl FlowGraph {
    pub fn build(nodes: Vec<Node>, edges: &[Edge]) -> Self {
        let nodes: HashMap<String, Node> = nodes
            .into_iter()
            .filter(|n| n.enabled)
            .map(|n| (n.key(), n))
            .collect();

        let mut adjacency: HashMap<(String, Handle), Vec<String>> = HashMap::new();
        let mut incoming: HashSet<&str> = HashSet::new();
        let mut start_targets = Vec::new();

        for edge in edges {
            if edge.source == START_NODE {
                start_targets.push(edge.target.clone());
                continue;
            }
            if !nodes.contains_key(&edge.source) {
                debug!(source = %edge.source, target = %edge.target, "Ignoring edge from disabled or unknown node");
                continue;
            }
            incoming.insert(edge.target.as_str());
            adjacency
                .entry((edge.source.clone(), edge.source_handle))
                .or_default()
                .push(edge.target.clone());
        }

        let start = if !start_targets.is_empty() {
            start_targets
        } else {
            let mut roots: Vec<&Node> = nodes
                .iter()
                .filter(|(key, _)| !incoming.contains(key.as_str()))
                .map(|(_, node)| node)
                .collect();
            if roots.is_empty() {
                // Every node sits on a cycle; fall back to the lowest order index
                if let Some(min) = nodes.values().map(|n| n.order_index).min() {
                    roots = nodes.values().filter(|n| n.order_index == min).collect();
                }
            }
            roots.sort_by(|a, b| (a.order_index, a.key()).cmp(&(b.order_index, b.key())));
            roots.into_iter().map(Node::key).collect()
        };

        Self {
            nodes,
            adjacency,
            start,
        }
    }

    /// Keys the run queue is seeded with, in order.
    pub fn start_keys(&self) -> &[String] {
        &self.start
    }

    pub fn node(&self, key: &str) -> Option<&Node> {
        self.nodes.get(key)
    }

    /// Targets of the edges leaving `key` through `handle`.
    pub fn next(&self, key: &str, handle: Handle) -> &[String] {
        self.adjacency
            .get(&(key.to_string(), handle))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_sentinel(key: &str) -> bool {
        key == START_NODE || key == END_NODE
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
