//! Natural-language to SQL bridge.
//!
//! Builds a schema-grounded prompt from a cached snapshot, asks the
//! completion service for one statement, and refuses to hand back anything
//! the classifier would not run.

use super::retry::{RetryPolicy, call_with_retry};
use super::{Completion, CompletionRequest, LlmClient};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::models::generation::validate_prompt;
use crate::models::{ConnectionRecord, DatabaseType, GenerationRecord, SchemaSnapshot};
use crate::sql::SqlClassifier;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CANCELLED_MESSAGE: &str = "Generation cancelled";

/// Sleep used between retry attempts.
pub type Sleeper = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

fn tokio_sleeper() -> Sleeper {
    Arc::new(|delay| tokio::time::sleep(delay).boxed())
}

pub struct SqlGenerator {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_schema_tables: usize,
    retry: RetryPolicy,
    sleeper: Sleeper,
}

impl SqlGenerator {
    pub fn new(client: Arc<dyn LlmClient>, config: &GatewayConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_schema_tables: config.max_schema_tables,
            retry: RetryPolicy::new(config.max_retries, config.retry_base_delay()),
            sleeper: tokio_sleeper(),
        }
    }

    /// Replace the backoff sleep.
    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Compact JSON description of at most `max_schema_tables` tables.
    pub fn schema_context(&self, snapshot: &SchemaSnapshot, db_type: DatabaseType) -> Value {
        let total = snapshot.tables.len();
        let tables: Vec<Value> = snapshot
            .tables
            .iter()
            .take(self.max_schema_tables)
            .map(|table| {
                let columns: Vec<Value> = table
                    .columns
                    .iter()
                    .map(|col| {
                        json!({
                            "name": col.name,
                            "type": col.data_type,
                            "nullable": col.nullable,
                            "is_primary_key": col.is_primary_key
                                || table.primary_key.contains(&col.name),
                        })
                    })
                    .collect();
                json!({ "name": table.name, "columns": columns })
            })
            .collect();

        let mut context = json!({
            "database": snapshot.database_name,
            "database_type": db_type.as_str(),
            "total_tables": total,
            "showing_tables": tables.len(),
            "tables": tables,
        });
        if total > self.max_schema_tables {
            context["note"] = Value::String(format!(
                "Showing first {} tables out of {} total tables",
                self.max_schema_tables, total
            ));
        }
        context
    }

    /// Generate a statement for `prompt` against the record's snapshot.
    pub async fn generate(
        &self,
        record: &ConnectionRecord,
        snapshot: Option<&SchemaSnapshot>,
        prompt: &str,
    ) -> GatewayResult<GenerationRecord> {
        self.generate_with_cancel(record, snapshot, prompt, std::future::pending::<()>())
            .await
    }

    /// Like [`generate`](Self::generate), abandoned as soon as `cancel`
    /// resolves. The in-flight request or backoff sleep is dropped.
    pub async fn generate_with_cancel<C>(
        &self,
        record: &ConnectionRecord,
        snapshot: Option<&SchemaSnapshot>,
        prompt: &str,
        cancel: C,
    ) -> GatewayResult<GenerationRecord>
    where
        C: Future<Output = ()>,
    {
        validate_prompt(prompt).map_err(GatewayError::validation)?;
        let snapshot = snapshot.ok_or_else(|| {
            GatewayError::validation(format!(
                "No metadata found for database '{}'. Refresh metadata first",
                record.name
            ))
        })?;

        let db_type = record.database_type;
        let context = self.schema_context(snapshot, db_type);
        let request = CompletionRequest {
            model: self.model.clone(),
            system: system_prompt(&context, db_type),
            user: prompt.trim().to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut generation = GenerationRecord::new(&record.name, prompt);
        generation.start();
        info!(
            id = %generation.id,
            name = %record.name,
            model = %self.model,
            "Generating SQL"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel => Err(CANCELLED_MESSAGE.to_string()),
            result = self.request_sql(&request, db_type) => result,
        };

        match outcome {
            Ok((sql, completion)) => {
                generation.model_used = Some(completion.model.unwrap_or_else(|| self.model.clone()));
                generation.tokens_used = completion.total_tokens;
                generation.complete(sql);
                info!(id = %generation.id, tokens = ?generation.tokens_used, "SQL generated");
                Ok(generation)
            }
            Err(message) => {
                warn!(id = %generation.id, error = %message, "SQL generation failed");
                generation.fail(&message);
                Err(GatewayError::llm_service(message, Some(generation)))
            }
        }
    }

    async fn request_sql(
        &self,
        request: &CompletionRequest,
        db_type: DatabaseType,
    ) -> Result<(String, Completion), String> {
        let completion = call_with_retry(
            &self.retry,
            |attempt| {
                debug!(attempt, "Calling completion service");
                self.client.complete(request)
            },
            |delay| (self.sleeper)(delay),
        )
        .await
        .map_err(|failure| failure.message())?;

        let sql = strip_code_fence(&completion.text);
        if sql.is_empty() {
            return Err("LLM returned an empty response".to_string());
        }

        let check = SqlClassifier::for_database(db_type).classify_and_limit(&sql, 1);
        if !check.ok {
            return Err(format!("Generated SQL failed validation: {}", check.message));
        }
        Ok((sql, completion))
    }
}

fn system_prompt(context: &Value, db_type: DatabaseType) -> String {
    let schema = serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
    format!(
        r#"You translate questions into SQL for a {dialect} database. Reply with exactly one read-only SELECT statement and nothing else.

Database schema:
{schema}

Rules:
1. Only SELECT. Never INSERT, UPDATE, DELETE, DROP, CREATE, ALTER or any other statement.
2. Output the SQL text only: no explanation, no prose, no markdown code fences.
3. Use only tables and columns that appear in the schema above.
4. Do not ask follow-up questions; make the best query the schema allows.
5. Leave out LIMIT unless the question asks for a specific number of rows.
6. Use syntax valid for {dialect}.

Example:
Question: Show me all users with their email addresses
Answer: SELECT name, email FROM users"#,
        dialect = db_type.display_name(),
        schema = schema,
    )
}

/// Remove a surrounding markdown code fence, if any.
///
/// Text starting with a triple backtick loses its first line, and every later
/// line starting with a triple backtick is dropped. That covers the closing
/// fence and any fence nested inside the reply.
pub fn strip_code_fence(text: &str) -> String {
    let text = text.trim();
    if !text.starts_with("```") {
        return text.to_string();
    }

    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < 2 {
        // ```SELECT 1```
        return text.trim_matches('`').trim().to_string();
    }

    lines[1..]
        .iter()
        .filter(|line| !line.trim_start().starts_with("```"))
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnInfo, TableInfo};

    struct NeverCalled;

    #[async_trait::async_trait]
    impl LlmClient for NeverCalled {
        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<Completion, super::super::LlmError> {
            panic!("completion service must not be called");
        }
    }

    fn generator(max_tables: usize) -> SqlGenerator {
        let config = GatewayConfig {
            max_schema_tables: max_tables,
            ..GatewayConfig::default()
        };
        SqlGenerator::new(Arc::new(NeverCalled), &config)
    }

    fn snapshot(tables: usize) -> SchemaSnapshot {
        let mut snapshot = SchemaSnapshot::new("s1");
        snapshot.tables = (0..tables)
            .map(|i| {
                let mut table = TableInfo::new(format!("t{}", i));
                table.columns = vec![ColumnInfo::new("id", "INTEGER", false)];
                table.primary_key = vec!["id".to_string()];
                table
            })
            .collect();
        snapshot
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(
            strip_code_fence("```sql\nSELECT * FROM users\n```"),
            "SELECT * FROM users"
        );
        assert_eq!(strip_code_fence("```\nSELECT 1\n```\n"), "SELECT 1");
        assert_eq!(strip_code_fence("  SELECT 1  "), "SELECT 1");
        assert_eq!(strip_code_fence("```SELECT 1```"), "SELECT 1");
        assert_eq!(
            strip_code_fence("```sql\nSELECT id\nFROM users\n```"),
            "SELECT id\nFROM users"
        );
        assert_eq!(
            strip_code_fence("```sql\nSELECT 1\n```\n```sql\nSELECT 2\n```"),
            "SELECT 1\nSELECT 2"
        );
    }

    #[test]
    fn test_schema_context_truncation_note() {
        let context = generator(2).schema_context(&snapshot(5), DatabaseType::PostgreSQL);
        assert_eq!(context["total_tables"], 5);
        assert_eq!(context["showing_tables"], 2);
        assert_eq!(context["database_type"], "postgresql");
        assert_eq!(
            context["note"],
            "Showing first 2 tables out of 5 total tables"
        );
        assert_eq!(context["tables"][0]["columns"][0]["is_primary_key"], true);
    }

    #[test]
    fn test_schema_context_without_note() {
        let context = generator(50).schema_context(&snapshot(3), DatabaseType::SQLite);
        assert_eq!(context["showing_tables"], 3);
        assert!(context.get("note").is_none());
    }

    #[test]
    fn test_system_prompt_mentions_dialect_and_schema() {
        let gen_ = generator(50);
        let context = gen_.schema_context(&snapshot(1), DatabaseType::MySQL);
        let prompt = system_prompt(&context, DatabaseType::MySQL);
        assert!(prompt.contains("MySQL"));
        assert!(prompt.contains("\"t0\""));
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_validation_error() {
        let record = ConnectionRecord::new("s1", "sqlite:x.db").unwrap();
        let err = generator(50)
            .generate(&record, None, "show all users")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation { .. }));
        assert!(err.to_string().contains("Refresh metadata"));
    }

    #[tokio::test]
    async fn test_short_prompt_rejected() {
        let record = ConnectionRecord::new("s1", "sqlite:x.db").unwrap();
        let err = generator(50)
            .generate(&record, Some(&snapshot(1)), "hi")
            .await
            .unwrap_err();
        assert!(err.is_client_fault());
    }
}
