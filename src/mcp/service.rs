//! MCP service implementation using rmcp.
//!
//! This module defines the GatewayService struct with all gateway tools
//! exposed via the MCP protocol using the rmcp framework's macros.

use crate::gateway::QueryGateway;
use crate::tools::databases::{
    DatabaseNameInput, DatabaseToolHandler, DeleteDatabaseOutput, GetDatabaseOutput,
    ListDatabasesOutput, RefreshMetadataOutput, RegisterDatabaseInput, RegisterDatabaseOutput,
};
use crate::tools::query::{
    GenerateSqlInput, GenerateSqlOutput, QueryToolHandler, RunQueryInput, RunQueryOutput,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct GatewayService {
    /// Shared gateway for all tool calls
    gateway: Arc<QueryGateway>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl GatewayService {
    pub fn new(gateway: Arc<QueryGateway>) -> Self {
        Self {
            gateway,
            tool_router: Self::tool_router(),
        }
    }

    fn databases(&self) -> DatabaseToolHandler {
        DatabaseToolHandler::new(self.gateway.clone())
    }

    fn queries(&self) -> QueryToolHandler {
        QueryToolHandler::new(self.gateway.clone())
    }

    /// Reject blank names before they reach the gateway.
    fn validate_name(&self, provided: &str) -> Result<String, McpError> {
        let trimmed = provided.trim();
        if trimmed.is_empty() {
            Err(McpError::invalid_params(
                "name is required. Call list_databases first to get registered names.",
                None,
            ))
        } else {
            Ok(trimmed.to_string())
        }
    }
}

#[tool_router]
impl GatewayService {
    #[tool(
        description = "Register (or update) a database by name and URL.\nSupported: PostgreSQL, MySQL, SQLite.\nThe database is probed and its schema cached; an unreachable database is still registered with status \"error\"."
    )]
    async fn register_database(
        &self,
        Parameters(input): Parameters<RegisterDatabaseInput>,
    ) -> Result<Json<RegisterDatabaseOutput>, McpError> {
        self.databases()
            .register(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "List registered databases with their status. Passwords are masked.")]
    async fn list_databases(&self) -> Result<Json<ListDatabasesOutput>, McpError> {
        self.databases().list().await.map(Json).map_err(McpError::from)
    }

    #[tool(
        description = "Get one registered database and its cached schema (tables, columns, keys, indexes, views)."
    )]
    async fn get_database(
        &self,
        Parameters(mut input): Parameters<DatabaseNameInput>,
    ) -> Result<Json<GetDatabaseOutput>, McpError> {
        input.name = self.validate_name(&input.name)?;
        self.databases().get(input).await.map(Json).map_err(McpError::from)
    }

    #[tool(description = "Remove a registered database and its cached schema.")]
    async fn delete_database(
        &self,
        Parameters(mut input): Parameters<DatabaseNameInput>,
    ) -> Result<Json<DeleteDatabaseOutput>, McpError> {
        input.name = self.validate_name(&input.name)?;
        self.databases()
            .delete(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Reconnect to a registered database and replace its cached schema.")]
    async fn refresh_metadata(
        &self,
        Parameters(mut input): Parameters<DatabaseNameInput>,
    ) -> Result<Json<RefreshMetadataOutput>, McpError> {
        input.name = self.validate_name(&input.name)?;
        self.databases()
            .refresh(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Run a single read-only SELECT against a registered database.\nStatements without LIMIT are capped (default 1000 rows) and report was_limited.\nAny other statement is rejected and reported in statement.validation_error."
    )]
    async fn run_query(
        &self,
        Parameters(mut input): Parameters<RunQueryInput>,
    ) -> Result<Json<RunQueryOutput>, McpError> {
        input.name = self.validate_name(&input.name)?;
        self.queries()
            .run_query(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Generate a SELECT statement from a natural-language prompt using the cached schema.\nThe statement is validated but not executed; pass it to run_query."
    )]
    async fn generate_sql(
        &self,
        Parameters(mut input): Parameters<GenerateSqlInput>,
    ) -> Result<Json<GenerateSqlOutput>, McpError> {
        input.name = self.validate_name(&input.name)?;
        self.queries()
            .generate_sql(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for GatewayService {
    fn get_info(&self) -> ServerInfo {
        let generation = if self.gateway.generation_enabled() {
            "- `generate_sql` turns a question into a SELECT using the cached schema\n"
        } else {
            "- `generate_sql` is disabled (no OPENAI_API_KEY configured)\n"
        };

        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "db-query-gateway".to_owned(),
                title: Some("DB Query Gateway".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Read-only SQL gateway for registered databases.\n\
                \n\
                ## Workflow\n\
                1. `register_database` with a name and URL (or `list_databases` to reuse one)\n\
                2. `get_database` to read the cached schema\n\
                3. `run_query` with a SELECT statement\n\
                \n\
                ## Notes\n\
                - Only single SELECT statements run; writes and DDL are rejected\n\
                - Queries without LIMIT are capped at {} rows\n\
                {}\
                - Call `refresh_metadata` after schema changes",
                self.gateway.config().row_cap,
                generation,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::db::MemoryStore;

    fn create_test_service() -> GatewayService {
        let gateway = QueryGateway::new(Arc::new(MemoryStore::new()), GatewayConfig::default());
        GatewayService::new(Arc::new(gateway))
    }

    #[test]
    fn test_validate_name_trims_whitespace() {
        let service = create_test_service();
        assert_eq!(service.validate_name("  s1  ").unwrap(), "s1");
    }

    #[test]
    fn test_validate_name_rejects_empty() {
        let service = create_test_service();
        let err = service.validate_name("   ").unwrap_err();
        assert!(err.to_string().contains("name is required"));
    }

    #[test]
    fn test_server_info() {
        let service = create_test_service();
        let info = service.get_info();
        assert_eq!(info.server_info.name, "db-query-gateway");
        assert!(info.capabilities.tools.is_some());
        assert!(info.instructions.unwrap().contains("disabled"));
    }

    #[tokio::test]
    async fn test_missing_database_maps_to_resource_not_found() {
        let service = create_test_service();
        let err = service
            .get_database(Parameters(DatabaseNameInput {
                name: "missing".to_string(),
            }))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code, rmcp::model::ErrorCode::RESOURCE_NOT_FOUND);
    }
}
