//! Database abstraction layer.
//!
//! This module provides access to caller-registered target databases:
//! - Engine dispatch with one implementation per engine kind
//! - Read-only query execution under a deadline
//! - Schema introspection
//! - Type mappings into scalar values
//! - Persistence of connection records and snapshots
//! - The connection registry tying these together

pub mod engine;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod store;
pub mod types;

pub use engine::{Engine, EngineTimeouts, engine_for};
pub use executor::{FetchedRows, QueryExecutor};
pub use registry::ConnectionRegistry;
pub use store::{MemoryStore, MetadataStore, SqliteStore};
