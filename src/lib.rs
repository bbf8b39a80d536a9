//! DB Query Gateway Library
//!
//! A safety-gated SQL gateway: register PostgreSQL, MySQL and SQLite
//! databases by URL, inspect their schema, run read-only statements under a
//! row cap and deadline, and generate statements from natural language
//! before passing them through the same read-only gate.

pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod mcp;
pub mod models;
pub mod sql;
pub mod tools;
pub mod transport;

pub use config::{Config, GatewayConfig};
pub use error::{GatewayError, GatewayResult};
pub use gateway::QueryGateway;
pub use mcp::GatewayService;
