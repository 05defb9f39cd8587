//! Import lock policy
//!
//! Nodes imported from an external source keep their structural position:
//! they can be neither moved, reordered nor used as the destination parent
//! of a move.

use crate::models::ClassNode;
use crate::operations::TreeOperationError;

/// Reject structural mutation of an import-locked node.
///
/// Pure predicate with no side effects.
pub fn check_mutable(node: &ClassNode) -> Result<(), TreeOperationError> {
    if node.is_locked_by_import {
        tracing::debug!("Rejecting structural mutation of import-locked node '{}'", node.id);
        return Err(TreeOperationError::import_locked(&node.id));
    }
    Ok(())
}

/// Reject a subtree removal when any member is import-locked
pub fn check_subtree_mutable<'a>(
    nodes: impl IntoIterator<Item = &'a ClassNode>,
) -> Result<(), TreeOperationError> {
    nodes.into_iter().try_for_each(check_mutable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::ErrorKind;

    #[test]
    fn test_unlocked_node_is_mutable() {
        let node = ClassNode::new("c1", None, 1, "Unit", "unit");
        assert!(check_mutable(&node).is_ok());
    }

    #[test]
    fn test_locked_node_is_forbidden() {
        let node = ClassNode::new_with_id("e", "c1", None, 1, "Imported", "unit").locked_by_import(true);
        let err = check_mutable(&node).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(err.to_string().contains("'e'"));
    }

    #[test]
    fn test_subtree_with_locked_member() {
        let a = ClassNode::new_with_id("a", "c1", None, 1, "A", "unit");
        let b = ClassNode::new_with_id("b", "c1", Some("a".into()), 1, "B", "lesson").locked_by_import(true);

        assert!(check_subtree_mutable([&a]).is_ok());
        assert!(check_subtree_mutable([&a, &b]).is_err());
    }
}
