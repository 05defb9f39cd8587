//! Collection integrity checks and dense-sequence repair planning
//!
//! Used after a failed write phase (and on demand) to find sibling groups
//! whose sequences are no longer `1..N` and to plan the renumbering that
//! restores them.

use crate::models::ClassNode;
use crate::operations::sequence_reindexer::{is_dense, renumber};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A sibling group whose sequences are not exactly `{1, ..., k}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceViolation {
    /// Parent of the group (`None` for the root group)
    pub parent_id: Option<String>,
    /// Observed sequences, sorted
    pub sequences: Vec<i64>,
}

/// Outcome of an integrity check over one collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub sequence_violations: Vec<SequenceViolation>,
    /// Nodes that are their own ancestor, sorted by id
    pub cycle_members: Vec<String>,
    /// Nodes whose parent is not part of the collection, sorted by id
    pub orphans: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.sequence_violations.is_empty() && self.cycle_members.is_empty() && self.orphans.is_empty()
    }
}

/// Group nodes by parent id; `BTreeMap` keeps the output order stable
pub fn sibling_groups(nodes: &[ClassNode]) -> BTreeMap<Option<String>, Vec<ClassNode>> {
    let mut groups: BTreeMap<Option<String>, Vec<ClassNode>> = BTreeMap::new();
    for node in nodes {
        groups
            .entry(node.parent_id.clone())
            .or_default()
            .push(node.clone());
    }
    for siblings in groups.values_mut() {
        siblings.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));
    }
    groups
}

fn find_cycle_members(nodes: &[ClassNode]) -> Vec<String> {
    let parents: HashMap<&str, &str> = nodes
        .iter()
        .filter_map(|n| n.parent_id.as_deref().map(|p| (n.id.as_str(), p)))
        .collect();

    let mut members: Vec<String> = nodes
        .iter()
        .filter(|node| {
            let mut seen: HashSet<&str> = HashSet::new();
            let mut current = node.id.as_str();
            while let Some(&parent) = parents.get(current) {
                if parent == node.id {
                    return true;
                }
                if !seen.insert(parent) {
                    // Cycle above this node that does not include it
                    return false;
                }
                current = parent;
            }
            false
        })
        .map(|node| node.id.clone())
        .collect();

    members.sort();
    members
}

/// Check density, acyclicity and parent presence for one collection's nodes
pub fn check_integrity(nodes: &[ClassNode]) -> IntegrityReport {
    let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    let sequence_violations = sibling_groups(nodes)
        .into_iter()
        .filter(|(_, siblings)| !is_dense(siblings))
        .map(|(parent_id, siblings)| SequenceViolation {
            parent_id,
            sequences: siblings.iter().map(|s| s.sequence).collect(),
        })
        .collect();

    let mut orphans: Vec<String> = nodes
        .iter()
        .filter(|n| n.parent_id.as_deref().is_some_and(|p| !ids.contains(p)))
        .map(|n| n.id.clone())
        .collect();
    orphans.sort();

    IntegrityReport {
        sequence_violations,
        cycle_members: find_cycle_members(nodes),
        orphans,
    }
}

/// Plan the renumbering that makes every sibling group dense again
///
/// Returns updated copies of the nodes whose sequence must change.
pub fn plan_repair(nodes: &[ClassNode]) -> Vec<ClassNode> {
    sibling_groups(nodes)
        .values()
        .flat_map(|siblings| renumber(siblings))
        .collect()
}
