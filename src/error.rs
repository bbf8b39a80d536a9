//! Error types for the query gateway.
//!
//! Every operation returns a [`GatewayError`] whose variant tells the caller
//! whether the fault lies with the request (validation, unknown name), with
//! the target database, or with the upstream LLM service.

use thiserror::Error;

use crate::models::{ConnectionRecordError, GenerationRecord, StatementRecord};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Database not found: {name}")]
    NotFound { name: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    /// The statement passed validation but failed at the target.
    #[error("Query execution failed: {message}")]
    QueryExecution {
        message: String,
        statement: Box<StatementRecord>,
    },

    #[error("LLM service error: {message}")]
    LlmService {
        message: String,
        generation: Option<Box<GenerationRecord>>,
    },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error for a registered database name.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn query_execution(message: impl Into<String>, statement: StatementRecord) -> Self {
        Self::QueryExecution {
            message: message.into(),
            statement: Box::new(statement),
        }
    }

    /// Create an LLM service error, optionally carrying the failed generation.
    pub fn llm_service(message: impl Into<String>, generation: Option<GenerationRecord>) -> Self {
        Self::LlmService {
            message: message.into(),
            generation: generation.map(Box::new),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::NotFound { .. } => Some("Register the database first with register_database"),
            Self::Timeout { .. } => {
                Some("Consider narrowing the query or raising the query timeout")
            }
            Self::Database { .. } | Self::QueryExecution { .. } => {
                Some("Check the SQL syntax and referenced objects")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable by the caller.
    ///
    /// The gateway itself never retries database work.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Timeout { .. }
                | Self::QueryExecution { .. }
                | Self::LlmService { .. }
        )
    }

    /// Whether the caller's request was at fault.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::NotFound { .. })
    }
}

/// Convert sqlx errors raised against a target database.
impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => GatewayError::connection(
                msg.to_string(),
                "Check the connection URL format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                GatewayError::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => GatewayError::database("No rows returned", None),
            sqlx::Error::PoolTimedOut => GatewayError::timeout("connection acquire", 30),
            sqlx::Error::PoolClosed => {
                GatewayError::connection("Connection pool is closed", "Restart the gateway")
            }
            sqlx::Error::Io(io_err) => GatewayError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => GatewayError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => GatewayError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                GatewayError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                GatewayError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => GatewayError::internal("Database worker crashed"),
            _ => GatewayError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl From<ConnectionRecordError> for GatewayError {
    fn from(err: ConnectionRecordError) -> Self {
        GatewayError::validation(err.to_string())
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert GatewayError to MCP ErrorData.
/// Includes the suggestion field in the `data` object when available.
impl From<GatewayError> for rmcp::ErrorData {
    fn from(err: GatewayError) -> Self {
        match &err {
            GatewayError::Validation { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), suggestion_data(err.suggestion()))
            }
            GatewayError::NotFound { .. } => rmcp::ErrorData::resource_not_found(
                err.to_string(),
                suggestion_data(err.suggestion()),
            ),
            GatewayError::Database { message, sql_state } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (SQLSTATE: {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::internal_error(msg, suggestion_data(err.suggestion()))
            }
            GatewayError::Connection { .. }
            | GatewayError::Timeout { .. }
            | GatewayError::QueryExecution { .. }
            | GatewayError::LlmService { .. }
            | GatewayError::Storage { .. }
            | GatewayError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(err.suggestion()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatewayError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(GatewayError::timeout("query", 30).is_retryable());
        assert!(GatewayError::connection("err", "sugg").is_retryable());
        assert!(GatewayError::llm_service("upstream down", None).is_retryable());
        assert!(!GatewayError::validation("bad sql").is_retryable());
        assert!(!GatewayError::not_found("s1").is_retryable());
    }

    #[test]
    fn test_client_fault() {
        assert!(GatewayError::validation("bad").is_client_fault());
        assert!(GatewayError::not_found("s1").is_client_fault());
        assert!(!GatewayError::storage("disk full").is_client_fault());
    }

    #[test]
    fn test_query_execution_keeps_statement() {
        let mut statement = StatementRecord::new("SELECT 1");
        statement.fail("boom");
        let err = GatewayError::query_execution("boom", statement);
        match err {
            GatewayError::QueryExecution { statement, .. } => {
                assert_eq!(statement.sql_text, "SELECT 1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    // Tests for From<GatewayError> for rmcp::ErrorData

    #[test]
    fn test_validation_maps_to_invalid_params() {
        let err = GatewayError::validation("bad input");
        let mcp_err: rmcp::ErrorData = err.into();
        // invalid_params uses -32602
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_not_found_maps_to_resource_not_found() {
        let err = GatewayError::not_found("s1");
        let mcp_err: rmcp::ErrorData = err.into();
        // resource_not_found uses -32002 in rmcp
        assert_eq!(mcp_err.code.0, -32002);
    }

    #[test]
    fn test_connection_maps_to_internal_error() {
        let err = GatewayError::connection("failed", "try again");
        let mcp_err: rmcp::ErrorData = err.into();
        // internal_error uses -32603
        assert_eq!(mcp_err.code.0, -32603);
    }

    #[test]
    fn test_database_error_includes_sql_state() {
        let err = GatewayError::database("syntax error", Some("42601".to_string()));
        let mcp_err: rmcp::ErrorData = err.into();
        assert!(mcp_err.message.contains("42601"));
    }

    #[test]
    fn test_connection_error_includes_suggestion_in_data() {
        let err = GatewayError::connection("failed", "try reconnecting");
        let mcp_err: rmcp::ErrorData = err.into();
        let data = mcp_err.data.unwrap();
        assert_eq!(data["suggestion"], "try reconnecting");
    }

    #[test]
    fn test_storage_has_no_suggestion() {
        let err = GatewayError::storage("locked");
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32603);
        assert!(mcp_err.data.is_none());
    }
}
