//! Connection registry.
//!
//! Owns the named connection records and their cached schema snapshots.
//! Writers for the same name are serialized; different names never wait on
//! each other.

use crate::db::engine::{Engine, EngineTimeouts, engine_for};
use crate::db::store::MetadataStore;
use crate::error::{GatewayError, GatewayResult};
use crate::models::{ConnectionRecord, SchemaSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

type LockMap = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

pub struct ConnectionRegistry {
    store: Arc<dyn MetadataStore>,
    timeouts: EngineTimeouts,
    /// One write lock per connection name with a holder or waiter
    locks: LockMap,
}

/// Exclusive write access to one connection name.
///
/// Handles to a name's mutex are only cloned while the map is locked, so the
/// last handle to let go (holder or cancelled waiter) removes the entry.
struct NameLock<'a> {
    locks: &'a LockMap,
    name: String,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NameLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // The map entry plus this handle
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.name);
        }
    }
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn MetadataStore>, timeouts: EngineTimeouts) -> Self {
        Self {
            store,
            timeouts,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Engine for the record's detected kind.
    pub fn engine(&self, record: &ConnectionRecord) -> Arc<dyn Engine> {
        engine_for(record.database_type, self.timeouts)
    }

    async fn write_lock(&self, name: &str) -> NameLock<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(name.to_string()).or_default().clone()
        };
        let mut held = NameLock {
            locks: &self.locks,
            name: name.to_string(),
            lock,
            guard: None,
        };
        held.guard = Some(held.lock.clone().lock_owned().await);
        held
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Register or update a connection, then probe and introspect it.
    ///
    /// A failed probe or extraction does not fail the call: the record is
    /// stored with status error and the previous snapshot, if any, is kept.
    pub async fn register(&self, name: &str, url: &str) -> GatewayResult<ConnectionRecord> {
        let mut record = ConnectionRecord::new(name, url)?;
        let _guard = self.write_lock(name).await;

        if let Some(existing) = self.store.get_connection(name).await? {
            record.created_at = existing.created_at;
            record.last_connected_at = existing.last_connected_at;
            record.last_metadata_refresh = existing.last_metadata_refresh;
        }

        info!(
            name = %name,
            db_type = %record.database_type,
            url = %record.masked_url(),
            "Registering database"
        );

        match self.connect_and_extract(&record).await {
            Ok(snapshot) => {
                record.mark_connected(snapshot.extracted_at);
                self.store.upsert(&record, Some(&snapshot)).await?;
                info!(
                    name = %name,
                    tables = snapshot.tables.len(),
                    views = snapshot.views.len(),
                    "Database registered"
                );
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Database registered with connection error");
                record.mark_error(&e.to_string());
                self.store.upsert(&record, None).await?;
            }
        }

        Ok(record)
    }

    pub async fn get(&self, name: &str) -> GatewayResult<ConnectionRecord> {
        self.store
            .get_connection(name)
            .await?
            .ok_or_else(|| GatewayError::not_found(name))
    }

    /// Record and its cached snapshot, if one has been extracted.
    pub async fn get_with_snapshot(
        &self,
        name: &str,
    ) -> GatewayResult<(ConnectionRecord, Option<SchemaSnapshot>)> {
        let record = self.get(name).await?;
        let snapshot = self.store.get_snapshot(name).await?;
        Ok((record, snapshot))
    }

    pub async fn snapshot(&self, name: &str) -> GatewayResult<Option<SchemaSnapshot>> {
        self.store.get_snapshot(name).await
    }

    pub async fn list(&self) -> GatewayResult<Vec<ConnectionRecord>> {
        self.store.list_connections().await
    }

    /// Remove the record together with its snapshot.
    pub async fn delete(&self, name: &str) -> GatewayResult<()> {
        let guard = self.write_lock(name).await;
        let existed = self.store.delete(name).await?;
        drop(guard);

        if !existed {
            return Err(GatewayError::not_found(name));
        }
        info!(name = %name, "Database deleted");
        Ok(())
    }

    /// Reconnect and replace the cached snapshot whole.
    ///
    /// On failure the record is marked error, the previous snapshot stays,
    /// and a connection error is returned.
    pub async fn refresh_metadata(&self, name: &str) -> GatewayResult<SchemaSnapshot> {
        let _guard = self.write_lock(name).await;
        let mut record = self.get(name).await?;

        match self.connect_and_extract(&record).await {
            Ok(snapshot) => {
                record.mark_connected(snapshot.extracted_at);
                self.store.upsert(&record, Some(&snapshot)).await?;
                info!(name = %name, tables = snapshot.tables.len(), "Metadata refreshed");
                Ok(snapshot)
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Metadata refresh failed");
                record.mark_error(&e.to_string());
                self.store.upsert(&record, None).await?;
                Err(match e {
                    GatewayError::Connection { .. } => e,
                    other => GatewayError::connection(
                        other.to_string(),
                        "Check the target database and refresh again",
                    ),
                })
            }
        }
    }

    async fn connect_and_extract(&self, record: &ConnectionRecord) -> GatewayResult<SchemaSnapshot> {
        let engine = self.engine(record);
        engine.probe(&record.url).await?;
        engine.extract(&record.url, &record.name).await
    }
}
