//! Storage Layer
//!
//! This module defines the persistence contract the tree mutation engine
//! depends on:
//!
//! - `NodeStore` - async repository of ClassNodes with atomic batch writes
//! - `WriteBatch` / `NodeWrite` - planned writes produced by the engine
//! - `InMemoryNodeStore` - reference implementation with fault injection
//! - `TreeEvent` - domain events broadcast after successful mutations
//!
//! Real deployments implement `NodeStore` over their database of choice and
//! map `apply_batch` onto a transaction.

mod error;
pub mod events;
mod memory_store;
mod node_store;

pub use error::StoreError;
pub use events::{TreeEvent, TreePosition};
pub use memory_store::InMemoryNodeStore;
pub use node_store::{NodeStore, NodeWrite, WriteBatch};
