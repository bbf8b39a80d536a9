//! Persistence for connection records and schema snapshots.
//!
//! Records and snapshots share the connection name as key. Writes that touch
//! both happen in one transaction so a snapshot never outlives its record.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{ConnectionRecord, ConnectionStatus, DatabaseType, SchemaSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Maximum connections held by the store's own pool.
const STORE_MAX_CONNECTIONS: u32 = 4;

/// Durable storage used by the connection registry.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_connection(&self, name: &str) -> GatewayResult<Option<ConnectionRecord>>;

    /// All records ordered by name.
    async fn list_connections(&self) -> GatewayResult<Vec<ConnectionRecord>>;

    /// Insert or update the record, replacing the snapshot when one is given.
    ///
    /// `created_at` of an existing record is preserved.
    async fn upsert(
        &self,
        record: &ConnectionRecord,
        snapshot: Option<&SchemaSnapshot>,
    ) -> GatewayResult<()>;

    async fn get_snapshot(&self, name: &str) -> GatewayResult<Option<SchemaSnapshot>>;

    /// Remove the record and its snapshot. Returns whether a record existed.
    async fn delete(&self, name: &str) -> GatewayResult<bool>;
}

// =============================================================================
// SQLite-backed store
// =============================================================================

mod queries {
    pub const CREATE_CONNECTIONS: &str = r#"
        CREATE TABLE IF NOT EXISTS database_connections (
            name TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            database_type TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            last_connected_at TEXT,
            last_metadata_refresh TEXT,
            error_message TEXT
        )
    "#;

    pub const CREATE_METADATA: &str = r#"
        CREATE TABLE IF NOT EXISTS database_metadata (
            name TEXT PRIMARY KEY
                REFERENCES database_connections(name) ON DELETE CASCADE,
            snapshot TEXT NOT NULL,
            extracted_at TEXT NOT NULL
        )
    "#;

    pub const SELECT_CONNECTION: &str = r#"
        SELECT name, url, database_type, status, created_at,
               last_connected_at, last_metadata_refresh, error_message
        FROM database_connections
        WHERE name = ?
    "#;

    pub const LIST_CONNECTIONS: &str = r#"
        SELECT name, url, database_type, status, created_at,
               last_connected_at, last_metadata_refresh, error_message
        FROM database_connections
        ORDER BY name
    "#;

    pub const UPSERT_CONNECTION: &str = r#"
        INSERT INTO database_connections (
            name, url, database_type, status, created_at,
            last_connected_at, last_metadata_refresh, error_message
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            url = excluded.url,
            database_type = excluded.database_type,
            status = excluded.status,
            last_connected_at = excluded.last_connected_at,
            last_metadata_refresh = excluded.last_metadata_refresh,
            error_message = excluded.error_message
    "#;

    pub const UPSERT_METADATA: &str = r#"
        INSERT INTO database_metadata (name, snapshot, extracted_at)
        VALUES (?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            snapshot = excluded.snapshot,
            extracted_at = excluded.extracted_at
    "#;

    pub const SELECT_METADATA: &str = "SELECT snapshot FROM database_metadata WHERE name = ?";
    pub const DELETE_METADATA: &str = "DELETE FROM database_metadata WHERE name = ?";
    pub const DELETE_CONNECTION: &str = "DELETE FROM database_connections WHERE name = ?";
}

/// Store backed by the gateway's own SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the state file and its tables.
    pub async fn connect(url: &str) -> GatewayResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| GatewayError::storage(format!("Invalid store URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(STORE_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(storage_error)?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Metadata store ready");
        Ok(store)
    }

    async fn migrate(&self) -> GatewayResult<()> {
        sqlx::query(queries::CREATE_CONNECTIONS)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        sqlx::query(queries::CREATE_METADATA)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn get_connection(&self, name: &str) -> GatewayResult<Option<ConnectionRecord>> {
        let row = sqlx::query(queries::SELECT_CONNECTION)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_connections(&self) -> GatewayResult<Vec<ConnectionRecord>> {
        let rows = sqlx::query(queries::LIST_CONNECTIONS)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn upsert(
        &self,
        record: &ConnectionRecord,
        snapshot: Option<&SchemaSnapshot>,
    ) -> GatewayResult<()> {
        let snapshot_json = snapshot
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| GatewayError::storage(format!("Failed to encode snapshot: {}", e)))?;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        write_record(&mut tx, record).await?;

        if let (Some(snapshot), Some(json)) = (snapshot, snapshot_json) {
            sqlx::query(queries::UPSERT_METADATA)
                .bind(&record.name)
                .bind(json)
                .bind(snapshot.extracted_at)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        debug!(name = %record.name, with_snapshot = snapshot.is_some(), "Record stored");
        Ok(())
    }

    async fn get_snapshot(&self, name: &str) -> GatewayResult<Option<SchemaSnapshot>> {
        let json: Option<String> = sqlx::query_scalar(queries::SELECT_METADATA)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        json.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| GatewayError::storage(format!("Corrupt snapshot for {}: {}", name, e)))
        })
        .transpose()
    }

    async fn delete(&self, name: &str) -> GatewayResult<bool> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(queries::DELETE_METADATA)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        let deleted = sqlx::query(queries::DELETE_CONNECTION)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?
            .rows_affected();

        tx.commit().await.map_err(storage_error)?;
        Ok(deleted > 0)
    }
}

async fn write_record(conn: &mut SqliteConnection, record: &ConnectionRecord) -> GatewayResult<()> {
    sqlx::query(queries::UPSERT_CONNECTION)
        .bind(&record.name)
        .bind(&record.url)
        .bind(record.database_type.as_str())
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.last_connected_at)
        .bind(record.last_metadata_refresh)
        .bind(&record.error_message)
        .execute(conn)
        .await
        .map_err(storage_error)?;
    Ok(())
}

fn record_from_row(row: &SqliteRow) -> GatewayResult<ConnectionRecord> {
    let name: String = row.try_get("name").map_err(storage_error)?;
    let db_tag: String = row.try_get("database_type").map_err(storage_error)?;
    let status_tag: String = row.try_get("status").map_err(storage_error)?;

    let database_type = DatabaseType::parse_tag(&db_tag).ok_or_else(|| {
        GatewayError::storage(format!("Unknown database type '{}' for {}", db_tag, name))
    })?;
    let status = ConnectionStatus::parse_tag(&status_tag).ok_or_else(|| {
        GatewayError::storage(format!("Unknown status '{}' for {}", status_tag, name))
    })?;

    Ok(ConnectionRecord {
        url: row.try_get("url").map_err(storage_error)?,
        database_type,
        status,
        created_at: row.try_get("created_at").map_err(storage_error)?,
        last_connected_at: row
            .try_get::<Option<DateTime<Utc>>, _>("last_connected_at")
            .map_err(storage_error)?,
        last_metadata_refresh: row
            .try_get::<Option<DateTime<Utc>>, _>("last_metadata_refresh")
            .map_err(storage_error)?,
        error_message: row.try_get("error_message").map_err(storage_error)?,
        name,
    })
}

fn storage_error(err: sqlx::Error) -> GatewayError {
    GatewayError::storage(err.to_string())
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, ConnectionRecord>,
    snapshots: HashMap<String, SchemaSnapshot>,
}

/// Process-local store; contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get_connection(&self, name: &str) -> GatewayResult<Option<ConnectionRecord>> {
        Ok(self.state.read().await.records.get(name).cloned())
    }

    async fn list_connections(&self) -> GatewayResult<Vec<ConnectionRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state.records.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    async fn upsert(
        &self,
        record: &ConnectionRecord,
        snapshot: Option<&SchemaSnapshot>,
    ) -> GatewayResult<()> {
        let mut state = self.state.write().await;

        let mut stored = record.clone();
        if let Some(existing) = state.records.get(&record.name) {
            stored.created_at = existing.created_at;
        }
        state.records.insert(record.name.clone(), stored);

        if let Some(snapshot) = snapshot {
            state
                .snapshots
                .insert(record.name.clone(), snapshot.clone());
        }
        Ok(())
    }

    async fn get_snapshot(&self, name: &str) -> GatewayResult<Option<SchemaSnapshot>> {
        Ok(self.state.read().await.snapshots.get(name).cloned())
    }

    async fn delete(&self, name: &str) -> GatewayResult<bool> {
        let mut state = self.state.write().await;
        state.snapshots.remove(name);
        Ok(state.records.remove(name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TableInfo;
    use std::sync::Arc;

    async fn sqlite_store() -> (SqliteStore, std::path::PathBuf) {
        let path = tempfile::NamedTempFile::new()
            .unwrap()
            .into_temp_path()
            .keep()
            .unwrap();
        let store = SqliteStore::connect(&format!("sqlite:{}", path.display()))
            .await
            .unwrap();
        (store, path)
    }

    fn snapshot(name: &str, tables: &[&str]) -> SchemaSnapshot {
        let mut snapshot = SchemaSnapshot::new(name);
        snapshot.tables = tables.iter().map(|t| TableInfo::new(*t)).collect();
        snapshot
    }

    async fn exercise_store(store: Arc<dyn MetadataStore>) {
        let mut record = ConnectionRecord::new("beta", "sqlite:beta.db").unwrap();
        store
            .upsert(&record, Some(&snapshot("beta", &["users"])))
            .await
            .unwrap();
        let original_created = store.get_connection("beta").await.unwrap().unwrap().created_at;

        // A later upsert keeps created_at and the old snapshot when none is given
        record.created_at = Utc::now() + chrono::Duration::hours(1);
        record.mark_error("connection refused");
        store.upsert(&record, None).await.unwrap();

        let stored = store.get_connection("beta").await.unwrap().unwrap();
        assert_eq!(stored.created_at, original_created);
        assert_eq!(stored.status, ConnectionStatus::Error);
        assert_eq!(stored.error_message.as_deref(), Some("connection refused"));
        assert!(store.get_snapshot("beta").await.unwrap().unwrap().table("users").is_some());

        let alpha = ConnectionRecord::new("alpha", "postgres://u:p@h/db").unwrap();
        store.upsert(&alpha, None).await.unwrap();
        let names: Vec<_> = store
            .list_connections()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        assert!(store.delete("beta").await.unwrap());
        assert!(!store.delete("beta").await.unwrap());
        assert!(store.get_connection("beta").await.unwrap().is_none());
        assert!(store.get_snapshot("beta").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise_store(Arc::new(MemoryStore::new())).await;
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let (store, path) = sqlite_store().await;
        exercise_store(Arc::new(store.clone())).await;
        store.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_sqlite_store_survives_reopen() {
        let (store, path) = sqlite_store().await;
        let record = ConnectionRecord::new("keep", "mysql://u:p@h/db").unwrap();
        store
            .upsert(&record, Some(&snapshot("keep", &["orders", "users"])))
            .await
            .unwrap();
        store.close().await;

        let reopened = SqliteStore::connect(&format!("sqlite:{}", path.display()))
            .await
            .unwrap();
        let stored = reopened.get_connection("keep").await.unwrap().unwrap();
        assert_eq!(stored.database_type, DatabaseType::MySQL);
        assert_eq!(stored.url, "mysql://u:p@h/db");
        let snap = reopened.get_snapshot("keep").await.unwrap().unwrap();
        assert_eq!(snap.tables.len(), 2);

        reopened.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
