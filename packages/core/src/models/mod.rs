//! Data Models
//!
//! This module contains the data structures shared by the store and the
//! mutation engine:
//!
//! - `ClassNode` - one vertex of a class roadmap tree
//! - `NodeContentUpdate` - content-only field changes
//! - `ParentFilter` - sibling group / whole-collection selector

mod node;

pub use node::{ClassNode, NodeContentUpdate, ParentFilter};
