//! Dense sibling sequence maintenance
//!
//! Sibling groups are ranked by a dense 1-based `sequence`. Every structural
//! mutation is expressed as one or two of the adjustments below, computed over
//! a sibling list already sorted by sequence:
//!
//! - [`close_gap`] when a node leaves a group
//! - [`open_gap`] when a node enters a group at a given rank
//! - [`shift_range`] when a node changes rank inside its own group
//! - [`renumber`] to rebuild a damaged group from scratch
//!
//! Each function is pure and returns only the siblings whose sequence changed,
//! as updated copies. Persisting them is the caller's job.

use crate::models::ClassNode;

/// Result of a gap-opening or in-group shift
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reindex {
    /// Final (clamped) sequence for the node being placed
    pub position: i64,
    /// Siblings whose sequence changed
    pub shifted: Vec<ClassNode>,
}

/// Clamp an insertion point into `[1, sibling_count + 1]`
pub fn clamp_insert_position(requested: i64, sibling_count: usize) -> i64 {
    requested.clamp(1, sibling_count as i64 + 1)
}

/// Clamp an in-group rank into `[1, sibling_count]`
///
/// `sibling_count` includes the node being reordered, so it is at least 1 for
/// any real reorder; an empty group clamps to 1.
pub fn clamp_reorder_position(requested: i64, sibling_count: usize) -> i64 {
    requested.clamp(1, (sibling_count as i64).max(1))
}

fn with_sequence(node: &ClassNode, sequence: i64) -> ClassNode {
    let mut shifted = node.clone();
    shifted.sequence = sequence;
    shifted
}

/// Absorb the slot vacated at `removed_sequence`.
///
/// Every sibling ranked after the removed one moves one step earlier.
pub fn close_gap(siblings: &[ClassNode], removed_sequence: i64) -> Vec<ClassNode> {
    siblings
        .iter()
        .filter(|s| s.sequence > removed_sequence)
        .map(|s| with_sequence(s, s.sequence - 1))
        .collect()
}

/// Make room for a node entering the group at `insert_sequence`.
///
/// The requested rank is clamped to a valid insertion point first; every
/// sibling at or after it moves one step later.
pub fn open_gap(siblings: &[ClassNode], insert_sequence: i64) -> Reindex {
    let position = clamp_insert_position(insert_sequence, siblings.len());
    let shifted = siblings
        .iter()
        .filter(|s| s.sequence >= position)
        .map(|s| with_sequence(s, s.sequence + 1))
        .collect();

    Reindex { position, shifted }
}

/// Move a node from `old_sequence` to `new_sequence` inside its own group.
///
/// `siblings` includes the moving node. Moving later shifts the nodes in
/// `(old, new]` one step earlier; moving earlier shifts `[new, old)` one step
/// later. The moving node itself is never in `shifted`.
pub fn shift_range(siblings: &[ClassNode], old_sequence: i64, new_sequence: i64) -> Reindex {
    let position = clamp_reorder_position(new_sequence, siblings.len());

    let shifted = if position > old_sequence {
        siblings
            .iter()
            .filter(|s| s.sequence > old_sequence && s.sequence <= position)
            .map(|s| with_sequence(s, s.sequence - 1))
            .collect()
    } else if position < old_sequence {
        siblings
            .iter()
            .filter(|s| s.sequence >= position && s.sequence < old_sequence)
            .map(|s| with_sequence(s, s.sequence + 1))
            .collect()
    } else {
        Vec::new()
    };

    Reindex { position, shifted }
}

/// Rebuild a dense `1..N` ranking for one sibling group.
///
/// Siblings are ordered by their current sequence with the ID as tie-breaker,
/// so duplicates and gaps left by an interrupted write resolve
/// deterministically. Returns only the nodes whose sequence changed.
pub fn renumber(siblings: &[ClassNode]) -> Vec<ClassNode> {
    let mut ordered: Vec<&ClassNode> = siblings.iter().collect();
    ordered.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));

    ordered
        .into_iter()
        .zip(1..)
        .filter(|(node, rank)| node.sequence != *rank)
        .map(|(node, rank)| with_sequence(node, rank))
        .collect()
}

/// Whether a sibling group's sequences are exactly `{1, ..., k}`
pub fn is_dense(siblings: &[ClassNode]) -> bool {
    let mut sequences: Vec<i64> = siblings.iter().map(|s| s.sequence).collect();
    sequences.sort_unstable();
    sequences.into_iter().zip(1..).all(|(seq, rank)| seq == rank)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(ids: &[&str]) -> Vec<ClassNode> {
        ids.iter()
            .zip(1..)
            .map(|(id, seq)| ClassNode::new_with_id(*id, "c1", None, seq, *id, "unit"))
            .collect()
    }

    fn changes(nodes: &[ClassNode]) -> Vec<(String, i64)> {
        nodes.iter().map(|n| (n.id.clone(), n.sequence)).collect()
    }

    #[test]
    fn test_close_gap_shifts_later_siblings() {
        // "b" (seq 2) left the group
        let siblings: Vec<ClassNode> = group(&["a", "b", "c", "d"])
            .into_iter()
            .filter(|n| n.id != "b")
            .collect();

        let changed = close_gap(&siblings, 2);
        assert_eq!(
            changes(&changed),
            vec![("c".to_string(), 2), ("d".to_string(), 3)]
        );
    }

    #[test]
    fn test_close_gap_last_position_is_noop() {
        let siblings = group(&["a", "b"]);
        assert!(close_gap(&siblings, 3).is_empty());
    }

    #[test]
    fn test_open_gap_in_middle() {
        let siblings = group(&["a", "b", "c"]);
        let reindex = open_gap(&siblings, 2);

        assert_eq!(reindex.position, 2);
        assert_eq!(
            changes(&reindex.shifted),
            vec![("b".to_string(), 3), ("c".to_string(), 4)]
        );
    }

    #[test]
    fn test_open_gap_clamps_bounds() {
        let siblings = group(&["a", "b", "c"]);

        let low = open_gap(&siblings, 0);
        assert_eq!(low.position, 1);
        assert_eq!(low.shifted.len(), 3);
        assert_eq!(low, open_gap(&siblings, 1));

        let high = open_gap(&siblings, 10_000);
        assert_eq!(high.position, 4);
        assert!(high.shifted.is_empty());
        assert_eq!(high, open_gap(&siblings, 4));
    }

    #[test]
    fn test_open_gap_empty_group() {
        let reindex = open_gap(&[], 5);
        assert_eq!(reindex.position, 1);
        assert!(reindex.shifted.is_empty());
    }

    #[test]
    fn test_shift_range_moving_earlier() {
        // [X(1), Y(2), Z(3), W(4)], W -> 2
        let siblings = group(&["x", "y", "z", "w"]);
        let reindex = shift_range(&siblings, 4, 2);

        assert_eq!(reindex.position, 2);
        assert_eq!(
            changes(&reindex.shifted),
            vec![("y".to_string(), 3), ("z".to_string(), 4)]
        );
    }

    #[test]
    fn test_shift_range_moving_later() {
        let siblings = group(&["x", "y", "z", "w"]);
        let reindex = shift_range(&siblings, 1, 3);

        assert_eq!(reindex.position, 3);
        assert_eq!(
            changes(&reindex.shifted),
            vec![("y".to_string(), 1), ("z".to_string(), 2)]
        );
    }

    #[test]
    fn test_shift_range_clamps_to_group_size() {
        let siblings = group(&["x", "y", "z"]);

        let reindex = shift_range(&siblings, 1, 99);
        assert_eq!(reindex.position, 3);
        assert_eq!(reindex.shifted.len(), 2);

        let unchanged = shift_range(&siblings, 3, 99);
        assert_eq!(unchanged.position, 3);
        assert!(unchanged.shifted.is_empty());
    }

    #[test]
    fn test_renumber_repairs_gaps_and_duplicates() {
        let mut siblings = group(&["a", "b", "c", "d"]);
        siblings[0].sequence = 2; // a: 2
        siblings[1].sequence = 2; // b: 2
        siblings[2].sequence = 5; // c: 5
        siblings[3].sequence = 7; // d: 7
        assert!(!is_dense(&siblings));

        let changed = renumber(&siblings);
        assert_eq!(
            changes(&changed),
            vec![
                ("a".to_string(), 1),
                ("c".to_string(), 3),
                ("d".to_string(), 4)
            ]
        );
    }

    #[test]
    fn test_renumber_dense_group_is_noop() {
        let siblings = group(&["a", "b", "c"]);
        assert!(is_dense(&siblings));
        assert!(renumber(&siblings).is_empty());
    }
}
