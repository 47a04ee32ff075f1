use std::collections::BTreeMap;

use strategist_core::types::Node;

/// Enabled nodes grouped by order index, ascending.
///
/// Strategies without edges run group by group; members of one group run
/// concurrently.
pub fn order_groups(nodes: Vec<Node>) -> Vec<(i64, Vec<Node>)> {
    let mut groups: BTreeMap<i64, Vec<Node>> = BTreeMap::new();
    for node in nodes.into_iter().filter(|n| n.enabled) {
        groups.entry(node.order_index).or_default().push(node);
    }
    for members in groups.values_mut() {
        members.sort_by_key(|n| (n.node_type(), n.id));
    }
    groups.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strategist_test_utils::fixtures::{disabled, fetch, notify, ordered};

    #[test]
    fn test_groups_sorted_by_index() {
        let groups = order_groups(vec![
            ordered(notify(1, "x"), 2),
            ordered(fetch(2, "u", "b"), 0),
            ordered(fetch(1, "u", "a"), 0),
            ordered(disabled(fetch(3, "u", "c")), 1),
        ]);

        let indices: Vec<i64> = groups.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2]);
        let first: Vec<String> = groups[0].1.iter().map(|n| n.key()).collect();
        assert_eq!(first, vec!["fetch_1", "fetch_2"]);
    }

    #[test]
    fn test_empty() {
        assert!(order_groups(Vec::new()).is_empty());
    }
}
