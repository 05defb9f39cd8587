//! Cycle detection for reparenting
//!
//! Attaching a node beneath one of its own descendants (or beneath itself)
//! would turn the collection's forest into a graph with a cycle. The check
//! builds a parent -> children adjacency map from the full current node set
//! and walks the subtree below the moving node.
//!
//! The map is rebuilt on every call. Concurrent mutations change the shape of
//! the tree, so a cached index would have to be invalidated on every
//! structural write to the collection.

use crate::models::ClassNode;
use std::collections::{HashMap, HashSet, VecDeque};

/// Build a parent id -> child ids map; root nodes contribute no edge
fn child_index(nodes: &[ClassNode]) -> HashMap<&str, Vec<&str>> {
    let mut index: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in nodes {
        if let Some(parent_id) = node.parent_id.as_deref() {
            index.entry(parent_id).or_default().push(node.id.as_str());
        }
    }
    index
}

/// Collect every node reachable below `node_id` (not including `node_id`).
///
/// Breadth-first; a malformed input that already contains a cycle terminates
/// because visited ids are never enqueued twice.
pub fn descendants(nodes: &[ClassNode], node_id: &str) -> HashSet<String> {
    let index = child_index(nodes);
    let mut found: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([node_id]);

    while let Some(current) = queue.pop_front() {
        if let Some(children) = index.get(current) {
            for &child in children {
                if child != node_id && found.insert(child.to_string()) {
                    queue.push_back(child);
                }
            }
        }
    }

    found
}

/// Whether attaching `node_id` beneath `candidate_parent_id` would create a cycle.
///
/// Moving to the root level (`None`) is always acyclic.
pub fn would_create_cycle(
    nodes: &[ClassNode],
    node_id: &str,
    candidate_parent_id: Option<&str>,
) -> bool {
    match candidate_parent_id {
        None => false,
        Some(parent_id) if parent_id == node_id => true,
        Some(parent_id) => descendants(nodes, node_id).contains(parent_id),
    }
}
