//! Query and generation tools.
//!
//! This module implements the `run_query` and `generate_sql` MCP tools.

use crate::error::GatewayResult;
use crate::gateway::QueryGateway;
use crate::models::{ColumnDef, GenerationRecord, ResultSet, StatementRecord};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Input for the run_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RunQueryInput {
    /// Name of a registered database
    pub name: String,
    /// A single SELECT statement. Anything else is rejected without touching the database.
    pub sql: String,
}

/// Input for the generate_sql tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GenerateSqlInput {
    /// Name of a registered database with cached metadata
    pub name: String,
    /// Natural-language description of the data wanted (3-2000 characters)
    pub prompt: String,
}

/// Rows returned by run_query.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueryRows {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    /// True when the gateway appended its own LIMIT; more rows may exist
    pub was_limited: bool,
}

impl From<ResultSet> for QueryRows {
    fn from(result: ResultSet) -> Self {
        Self {
            rows: result.rows.iter().map(|row| row.to_json_map()).collect(),
            columns: result.columns,
            row_count: result.row_count,
            execution_time_ms: result.execution_time_ms,
            was_limited: result.was_limited,
        }
    }
}

/// Output for the run_query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RunQueryOutput {
    pub statement: StatementRecord,
    /// Absent when the statement was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryRows>,
}

/// Output for the generate_sql tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GenerateSqlOutput {
    pub generation: GenerationRecord,
}

/// Handler for query and generation tools.
pub struct QueryToolHandler {
    gateway: Arc<QueryGateway>,
}

impl QueryToolHandler {
    pub fn new(gateway: Arc<QueryGateway>) -> Self {
        Self { gateway }
    }

    pub async fn run_query(&self, input: RunQueryInput) -> GatewayResult<RunQueryOutput> {
        let (statement, result) = self.gateway.run_query(input.name.trim(), &input.sql).await?;
        info!(
            name = %input.name,
            status = ?statement.status,
            rows = ?statement.row_count,
            "run_query"
        );
        Ok(RunQueryOutput {
            statement,
            result: result.map(QueryRows::from),
        })
    }

    pub async fn generate_sql(&self, input: GenerateSqlInput) -> GatewayResult<GenerateSqlOutput> {
        let generation = self
            .gateway
            .generate_sql(input.name.trim(), &input.prompt)
            .await?;
        Ok(GenerateSqlOutput { generation })
    }
}
