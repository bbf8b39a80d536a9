//! MCP tool handlers.
//!
//! Each handler turns tool input into gateway calls and gateway results into
//! JSON-friendly output types.

pub mod databases;
pub mod query;

pub use databases::DatabaseToolHandler;
pub use query::QueryToolHandler;
