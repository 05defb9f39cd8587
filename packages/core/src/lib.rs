//! ClassNode Core
//!
//! This crate maintains ClassNode trees: per-class curriculum and skill
//! roadmaps stored as ordered forests. It keeps three invariants while nodes
//! are moved and reordered:
//!
//! - **Dense sequencing**: every sibling group is ranked exactly `1..N`
//! - **Acyclicity**: no node is ever its own ancestor
//! - **Import locks**: imported nodes keep their structural position
//!
//! # Modules
//!
//! - [`models`] - Data structures (`ClassNode`, `NodeContentUpdate`)
//! - [`db`] - `NodeStore` contract, write batches, in-memory store, events
//! - [`operations`] - Pure checks, reindexing and planning
//! - [`services`] - `TreeMutationEngine` orchestration

pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use models::*;
pub use operations::{ErrorKind, TreeOperationError};
pub use services::{EngineConfig, TreeMutationEngine};
