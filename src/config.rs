//! Configuration handling for the query gateway.
//!
//! Options come from CLI arguments and environment variables; the binary turns
//! them into a [`GatewayConfig`] handed to every component.

use clap::Parser;
use std::time::Duration;

use crate::models::{DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_CAP};

pub const DEFAULT_STORE_URL: &str = "sqlite:db_query.db";
pub const MEMORY_STORE_URL: &str = "memory";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_SCHEMA_TABLES: usize = 50;

// LLM defaults
pub const DEFAULT_LLM_MODEL: &str = "gpt-4";
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_LLM_MAX_RETRIES: u32 = 3;
pub const DEFAULT_LLM_RETRY_BASE_MS: u64 = 1000;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Settings shared by the registry, executor and NL-to-SQL bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Rows returned before truncation when the statement has no LIMIT
    pub row_cap: u32,
    pub query_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Upper bound on LLM attempts, including the first one
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Tables serialized into the generation prompt
    pub max_schema_tables: usize,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            row_cap: DEFAULT_ROW_CAP,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_retries: DEFAULT_LLM_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_LLM_RETRY_BASE_MS,
            max_schema_tables: DEFAULT_MAX_SCHEMA_TABLES,
            model: DEFAULT_LLM_MODEL.to_string(),
            temperature: DEFAULT_LLM_TEMPERATURE,
            max_tokens: DEFAULT_LLM_MAX_TOKENS,
        }
    }
}

impl GatewayConfig {
    /// Get the query timeout as a Duration.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Get the connection timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Endpoint settings for the OpenAI-compatible completion service.
#[derive(Debug, Clone)]
pub struct LlmEndpoint {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-query-gateway",
    about = "MCP server that runs read-only SQL and natural-language queries against registered databases",
    version,
    author
)]
pub struct Config {
    /// Where registered connections and schema snapshots are kept.
    /// Use "memory" to keep them in-process only.
    #[arg(
        long,
        value_name = "URL",
        default_value = DEFAULT_STORE_URL,
        env = "DB_QUERY_STORE_URL"
    )]
    pub store_url: String,

    /// Maximum rows returned when a query carries no LIMIT
    #[arg(long, default_value_t = DEFAULT_ROW_CAP, env = "DB_QUERY_ROW_CAP")]
    pub row_cap: u32,

    /// Query timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "DB_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "DB_QUERY_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Tables included in the schema context sent to the LLM
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_SCHEMA_TABLES,
        env = "DB_QUERY_MAX_SCHEMA_TABLES"
    )]
    pub max_schema_tables: usize,

    /// Model identifier sent to the completion service
    #[arg(long, default_value = DEFAULT_LLM_MODEL, env = "LLM_MODEL")]
    pub llm_model: String,

    #[arg(long, default_value_t = DEFAULT_LLM_TEMPERATURE, env = "LLM_TEMPERATURE")]
    pub llm_temperature: f32,

    #[arg(long, default_value_t = DEFAULT_LLM_MAX_TOKENS, env = "LLM_MAX_TOKENS")]
    pub llm_max_tokens: u32,

    /// Attempts made against the completion service before giving up
    #[arg(long, default_value_t = DEFAULT_LLM_MAX_RETRIES, env = "LLM_MAX_RETRIES")]
    pub llm_max_retries: u32,

    /// Base backoff in milliseconds, doubled after every failed attempt
    #[arg(long, default_value_t = DEFAULT_LLM_RETRY_BASE_MS, env = "LLM_RETRY_BASE_MS")]
    pub llm_retry_base_ms: u64,

    /// Per-request timeout for the completion service in seconds
    #[arg(long, default_value_t = DEFAULT_LLM_TIMEOUT_SECS, env = "LLM_TIMEOUT")]
    pub llm_timeout: u64,

    /// API key for the completion service. SQL generation is disabled without it.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, default_value = DEFAULT_OPENAI_BASE_URL, env = "OPENAI_BASE_URL")]
    pub openai_base_url: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DB_QUERY_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DB_QUERY_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            store_url: DEFAULT_STORE_URL.to_string(),
            row_cap: DEFAULT_ROW_CAP,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            max_schema_tables: DEFAULT_MAX_SCHEMA_TABLES,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_temperature: DEFAULT_LLM_TEMPERATURE,
            llm_max_tokens: DEFAULT_LLM_MAX_TOKENS,
            llm_max_retries: DEFAULT_LLM_MAX_RETRIES,
            llm_retry_base_ms: DEFAULT_LLM_RETRY_BASE_MS,
            llm_timeout: DEFAULT_LLM_TIMEOUT_SECS,
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Build the component configuration.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            row_cap: self.row_cap.max(1),
            query_timeout_secs: self.query_timeout,
            connect_timeout_secs: self.connect_timeout,
            max_retries: self.llm_max_retries.max(1),
            retry_base_delay_ms: self.llm_retry_base_ms,
            max_schema_tables: self.max_schema_tables,
            model: self.llm_model.clone(),
            temperature: self.llm_temperature,
            max_tokens: self.llm_max_tokens,
        }
    }

    /// Completion endpoint settings, or None when no API key is configured.
    pub fn llm_endpoint(&self) -> Option<LlmEndpoint> {
        let api_key = self
            .openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())?;

        Some(LlmEndpoint {
            api_key: api_key.to_string(),
            base_url: self.openai_base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(self.llm_timeout),
        })
    }

    /// Whether snapshots should be kept in-process only.
    pub fn uses_memory_store(&self) -> bool {
        self.store_url.eq_ignore_ascii_case(MEMORY_STORE_URL)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
