//! Mutation planning
//!
//! Turns a validated request plus a snapshot of the affected nodes into a
//! `WriteBatch`. Planning performs no I/O: the engine reads, plans, and then
//! hands the whole batch to `NodeStore::apply_batch` in one step, so the
//! old-group gap close, the new-group gap open and the node's own update land
//! together or not at all.

use crate::db::{TreePosition, WriteBatch};
use crate::models::{ClassNode, NodeContentUpdate};
use crate::operations::cycle_detector::descendants;
use crate::operations::sequence_reindexer::{close_gap, open_gap, shift_range};
use std::collections::{BTreeMap, HashMap};

/// Planned reparent/reposition of one node
#[derive(Debug, Clone)]
pub struct MovePlan {
    pub batch: WriteBatch,
    /// Node as it will be stored (before the store bumps its version)
    pub node: ClassNode,
    pub from: TreePosition,
    pub siblings_shifted: usize,
}

/// Planned content update and optional in-group reorder
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    /// Empty when the request changes nothing
    pub batch: WriteBatch,
    pub node: ClassNode,
    /// `(old_sequence, new_sequence)` when the rank changed
    pub reorder: Option<(i64, i64)>,
    pub content_changed: bool,
    pub siblings_shifted: usize,
}

/// Planned creation of a node at a position
#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub batch: WriteBatch,
    pub node: ClassNode,
    pub siblings_shifted: usize,
}

/// Planned removal of a node and its subtree
#[derive(Debug, Clone)]
pub struct DeletePlan {
    pub batch: WriteBatch,
    /// Number of nodes removed, including the subtree root
    pub removed: usize,
    pub siblings_shifted: usize,
}

/// Siblings of a group, excluding `exclude_id`, sorted by `(sequence, id)`
fn group_members(nodes: &[ClassNode], parent_id: Option<&str>, exclude_id: &str) -> Vec<ClassNode> {
    let mut members: Vec<ClassNode> = nodes
        .iter()
        .filter(|n| n.parent_id.as_deref() == parent_id && n.id != exclude_id)
        .cloned()
        .collect();
    members.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));
    members
}

/// Overlay `changes` onto `group` by id
fn overlay(group: &mut [ClassNode], changes: &[ClassNode]) {
    let by_id: HashMap<&str, i64> = changes.iter().map(|c| (c.id.as_str(), c.sequence)).collect();
    for sibling in group.iter_mut() {
        if let Some(sequence) = by_id.get(sibling.id.as_str()) {
            sibling.sequence = *sequence;
        }
    }
}

/// Stage the final state of every sibling that actually differs from the snapshot
///
/// A sibling shifted down by a gap close and back up by a gap open ends where
/// it started and is not rewritten.
fn stage_sibling_changes(
    batch: &mut WriteBatch,
    snapshot: &[ClassNode],
    rounds: impl IntoIterator<Item = Vec<ClassNode>>,
) -> usize {
    let mut finals: BTreeMap<String, ClassNode> = BTreeMap::new();
    for round in rounds {
        for node in round {
            finals.insert(node.id.clone(), node);
        }
    }

    let originals: HashMap<&str, &ClassNode> = snapshot.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut staged = 0;
    for (id, node) in finals {
        let unchanged = originals
            .get(id.as_str())
            .is_some_and(|orig| orig.sequence == node.sequence && orig.parent_id == node.parent_id);
        if !unchanged {
            batch.stage_update(node);
            staged += 1;
        }
    }
    staged
}

/// Plan moving `node` under `new_parent_id` at rank `new_sequence`.
///
/// `collection_nodes` is the full current node set of the collection. The
/// old group closes the node's gap first. When the destination is the same
/// group, the gap is opened in the already-closed group; otherwise the
/// destination group is taken as-is, never counting the moving node in it.
/// The insertion point is clamped to `[1, destination_count + 1]`.
pub fn plan_move(
    collection_nodes: &[ClassNode],
    node: &ClassNode,
    new_parent_id: Option<String>,
    new_sequence: i64,
) -> MovePlan {
    let mut old_group = group_members(collection_nodes, node.parent_id.as_deref(), &node.id);
    let closed = close_gap(&old_group, node.sequence);

    let destination = if node.parent_id == new_parent_id {
        overlay(&mut old_group, &closed);
        old_group
    } else {
        group_members(collection_nodes, new_parent_id.as_deref(), &node.id)
    };
    let opened = open_gap(&destination, new_sequence);

    let mut batch = WriteBatch::new();
    let siblings_shifted = stage_sibling_changes(&mut batch, collection_nodes, [closed, opened.shifted]);

    let mut moved = node.clone();
    moved.parent_id = new_parent_id;
    moved.sequence = opened.position;
    batch.stage_update(moved.clone());

    MovePlan {
        batch,
        node: moved,
        from: TreePosition::from(node),
        siblings_shifted,
    }
}

/// Plan a content update and optional reorder of `node` within `siblings`.
///
/// `siblings` is the node's current group, including the node itself. The
/// target rank is clamped to `[1, siblings.len()]`; a target equal to the
/// current rank produces no sibling writes. When neither content nor rank
/// changes the batch is empty.
pub fn plan_update(
    siblings: &[ClassNode],
    node: &ClassNode,
    content: &NodeContentUpdate,
    new_sequence: Option<i64>,
) -> UpdatePlan {
    let mut updated = node.clone();
    let content_changed = content.apply_to(&mut updated);

    let mut batch = WriteBatch::new();
    let mut reorder = None;
    let mut siblings_shifted = 0;

    if let Some(requested) = new_sequence {
        let shift = shift_range(siblings, node.sequence, requested);
        if shift.position != node.sequence {
            siblings_shifted = stage_sibling_changes(&mut batch, siblings, [shift.shifted]);
            reorder = Some((node.sequence, shift.position));
            updated.sequence = shift.position;
        }
    }

    if content_changed || reorder.is_some() {
        batch.stage_update(updated.clone());
    }

    UpdatePlan {
        batch,
        node: updated,
        reorder,
        content_changed,
        siblings_shifted,
    }
}

/// Plan inserting `node` into `siblings` at `sequence` (append when `None`)
pub fn plan_insert(siblings: &[ClassNode], mut node: ClassNode, sequence: Option<i64>) -> InsertPlan {
    let requested = sequence.unwrap_or(siblings.len() as i64 + 1);
    let opened = open_gap(siblings, requested);

    let mut batch = WriteBatch::new();
    let siblings_shifted = opened.shifted.len();
    batch.stage_updates(opened.shifted);

    node.sequence = opened.position;
    batch.stage_insert(node.clone());

    InsertPlan {
        batch,
        node,
        siblings_shifted,
    }
}

/// Depth of `node` below `root_id`, following parent links
fn depth_below(parents: &HashMap<&str, Option<&str>>, node: &ClassNode, root_id: &str) -> usize {
    let mut depth = 0;
    let mut current = node.parent_id.as_deref();
    while let Some(parent) = current {
        depth += 1;
        if parent == root_id {
            break;
        }
        current = parents.get(parent).copied().flatten();
    }
    depth
}

/// Plan removing `node` with its whole subtree and closing its gap
///
/// Deletes are staged deepest first, so any prefix of the batch leaves a
/// forest without orphans.
pub fn plan_delete(collection_nodes: &[ClassNode], node: &ClassNode) -> DeletePlan {
    let parents: HashMap<&str, Option<&str>> = collection_nodes
        .iter()
        .map(|n| (n.id.as_str(), n.parent_id.as_deref()))
        .collect();
    let mut subtree: Vec<(usize, &ClassNode)> = {
        let ids = descendants(collection_nodes, &node.id);
        collection_nodes
            .iter()
            .filter(|n| ids.contains(&n.id))
            .map(|n| (depth_below(&parents, n, &node.id), n))
            .collect()
    };
    subtree.sort_by(|(da, a), (db, b)| db.cmp(da).then_with(|| a.id.cmp(&b.id)));

    let mut batch = WriteBatch::new();
    for (_, descendant) in &subtree {
        batch.stage_delete(descendant);
    }
    batch.stage_delete(node);

    let old_group = group_members(collection_nodes, node.parent_id.as_deref(), &node.id);
    let closed = close_gap(&old_group, node.sequence);
    let siblings_shifted = closed.len();
    batch.stage_updates(closed);

    DeletePlan {
        batch,
        removed: subtree.len() + 1,
        siblings_shifted,
    }
}
