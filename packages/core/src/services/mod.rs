//! Business Services
//!
//! - `TreeMutationEngine` - move, reorder, insert, delete and repair of ClassNode trees
//! - `CollectionLocks` - per-collection serialization of structural mutations
//! - `EngineConfig` - engine tuning
//!
//! Services coordinate between the storage layer and the pure operations,
//! enforcing validation order and the single-batch write discipline.

pub mod collection_locks;
pub mod config;
pub mod tree_mutation_engine;

pub use collection_locks::{CollectionGuard, CollectionLocks};
pub use config::{ConfigError, EngineConfig};
pub use tree_mutation_engine::TreeMutationEngine;
