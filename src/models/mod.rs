//! Data models for the query gateway.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod generation;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionRecord, ConnectionRecordError, ConnectionStatus, DatabaseType};
pub use generation::{GenerationRecord, GenerationStatus};
pub use query::{
    ColumnDef, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_CAP, ExecutionStatus, ResultSet, Row,
    ScalarValue, StatementRecord, TemporalValue,
};
pub use schema::{ColumnInfo, IndexInfo, SchemaSnapshot, TableInfo, ViewInfo};
