//! Query gateway facade.
//!
//! [`QueryGateway`] is the single entry point used by request-handling code:
//! connection management, read-only execution and SQL generation.

use crate::config::GatewayConfig;
use crate::db::{ConnectionRegistry, EngineTimeouts, MetadataStore, QueryExecutor};
use crate::error::{GatewayError, GatewayResult};
use crate::llm::{LlmClient, SqlGenerator};
use crate::models::{
    ConnectionRecord, GenerationRecord, ResultSet, SchemaSnapshot, StatementRecord,
};
use std::future::Future;
use std::sync::Arc;

pub struct QueryGateway {
    config: GatewayConfig,
    registry: ConnectionRegistry,
    executor: QueryExecutor,
    generator: Option<SqlGenerator>,
}

impl QueryGateway {
    /// Gateway without SQL generation; attach one with [`with_llm`](Self::with_llm).
    pub fn new(store: Arc<dyn MetadataStore>, config: GatewayConfig) -> Self {
        let timeouts = EngineTimeouts::new(config.connect_timeout(), config.query_timeout());
        Self {
            registry: ConnectionRegistry::new(store, timeouts),
            executor: QueryExecutor::with_defaults(config.query_timeout_secs, config.row_cap),
            generator: None,
            config,
        }
    }

    pub fn with_llm(self, client: Arc<dyn LlmClient>) -> Self {
        let generator = SqlGenerator::new(client, &self.config);
        self.with_generator(generator)
    }

    pub fn with_generator(mut self, generator: SqlGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn generation_enabled(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn register_database(&self, name: &str, url: &str) -> GatewayResult<ConnectionRecord> {
        self.registry.register(name, url).await
    }

    pub async fn list_databases(&self) -> GatewayResult<Vec<ConnectionRecord>> {
        self.registry.list().await
    }

    pub async fn get_database(
        &self,
        name: &str,
    ) -> GatewayResult<(ConnectionRecord, Option<SchemaSnapshot>)> {
        self.registry.get_with_snapshot(name).await
    }

    pub async fn delete_database(&self, name: &str) -> GatewayResult<()> {
        self.registry.delete(name).await
    }

    pub async fn refresh_metadata(&self, name: &str) -> GatewayResult<SchemaSnapshot> {
        self.registry.refresh_metadata(name).await
    }

    /// Validate and run `sql` against the named database.
    pub async fn run_query(
        &self,
        name: &str,
        sql: &str,
    ) -> GatewayResult<(StatementRecord, Option<ResultSet>)> {
        let record = self.registry.get(name).await?;
        let engine = self.registry.engine(&record);
        self.executor.execute(engine.as_ref(), &record, sql).await
    }

    /// Generate a read-only statement from a natural-language prompt.
    ///
    /// The returned statement has not been executed and carries no injected
    /// row cap.
    pub async fn generate_sql(&self, name: &str, prompt: &str) -> GatewayResult<GenerationRecord> {
        self.generate_sql_with_cancel(name, prompt, std::future::pending::<()>())
            .await
    }

    pub async fn generate_sql_with_cancel<C>(
        &self,
        name: &str,
        prompt: &str,
        cancel: C,
    ) -> GatewayResult<GenerationRecord>
    where
        C: Future<Output = ()>,
    {
        let (record, snapshot) = self.registry.get_with_snapshot(name).await?;
        let generator = self.generator.as_ref().ok_or_else(|| {
            GatewayError::llm_service(
                "SQL generation is not configured. Set OPENAI_API_KEY to enable it",
                None,
            )
        })?;

        generator
            .generate_with_cancel(&record, snapshot.as_ref(), prompt, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[tokio::test]
    async fn test_generation_disabled_without_llm() {
        let gateway = QueryGateway::new(Arc::new(MemoryStore::new()), GatewayConfig::default());
        assert!(!gateway.generation_enabled());

        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("absent.db").display());
        gateway.register_database("s1", &url).await.unwrap();

        let err = gateway.generate_sql("s1", "show all users").await.unwrap_err();
        assert!(matches!(err, GatewayError::LlmService { .. }));
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let gateway = QueryGateway::new(Arc::new(MemoryStore::new()), GatewayConfig::default());
        assert!(matches!(
            gateway.run_query("missing", "SELECT 1").await,
            Err(GatewayError::NotFound { .. })
        ));
        assert!(matches!(
            gateway.generate_sql("missing", "show all users").await,
            Err(GatewayError::NotFound { .. })
        ));
    }
}
