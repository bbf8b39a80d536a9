//! Query execution.
//!
//! [`QueryExecutor`] gates every statement through the classifier before a
//! connection to the target is opened, then hands the rewritten statement to
//! the record's [`Engine`](crate::db::engine::Engine).
//!
//! The database-specific submodules run one statement on an already open
//! connection. The code structure is intentionally parallel to make
//! differences obvious.

use crate::db::engine::Engine;
use crate::db::types::{RowToScalars, declared_type};
use crate::error::{GatewayError, GatewayResult};
use crate::models::query::MAX_SQL_LEN;
use crate::models::{
    ColumnDef, ConnectionRecord, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_CAP, ResultSet, Row,
    StatementRecord,
};
use crate::sql::SqlClassifier;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Rows fetched by an engine together with the time spent fetching them.
#[derive(Debug, Clone, Default)]
pub struct FetchedRows {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Row>,
    /// Measured from issuing the statement until the last row arrived
    pub elapsed: Duration,
}

/// Validates and runs read-only statements against registered databases.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    row_cap: u32,
    query_timeout: Duration,
}

impl QueryExecutor {
    /// Create a new query executor with default settings.
    pub fn new() -> Self {
        Self::with_defaults(DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_CAP)
    }

    /// Create a new query executor with custom settings.
    pub fn with_defaults(timeout_secs: u64, row_cap: u32) -> Self {
        Self {
            row_cap: row_cap.max(1),
            query_timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn row_cap(&self) -> u32 {
        self.row_cap
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Execute one statement against the record's database.
    ///
    /// A statement rejected by the classifier comes back as a failed record
    /// with no result set and no connection attempt. Failures at the target
    /// are returned as [`GatewayError::QueryExecution`] carrying the failed
    /// record.
    pub async fn execute(
        &self,
        engine: &dyn Engine,
        record: &ConnectionRecord,
        sql: &str,
    ) -> GatewayResult<(StatementRecord, Option<ResultSet>)> {
        let mut statement = StatementRecord::new(sql);

        if sql.chars().count() > MAX_SQL_LEN {
            statement.reject(format!("SQL text exceeds {} characters", MAX_SQL_LEN));
            return Ok((statement, None));
        }

        let classifier = SqlClassifier::for_database(record.database_type);
        let classification = classifier.classify_and_limit(sql, self.row_cap);
        let Some(rewritten) = classification.rewritten_sql.filter(|_| classification.ok) else {
            debug!(
                name = %record.name,
                kind = %classifier.statement_kind(sql),
                "Statement rejected"
            );
            statement.reject(classification.message);
            return Ok((statement, None));
        };
        let was_limited = !classifier.has_row_limit(sql);

        statement.start(rewritten.as_str());
        debug!(
            name = %record.name,
            db_type = %record.database_type,
            timeout_secs = self.query_timeout.as_secs(),
            "Executing query"
        );

        match engine.execute(&record.url, &rewritten, self.query_timeout).await {
            Ok(fetched) => {
                let execution_time_ms = fetched.elapsed.as_millis() as u64;
                let row_count = fetched.rows.len();
                statement.complete(row_count, execution_time_ms);

                info!(
                    name = %record.name,
                    rows = row_count,
                    elapsed_ms = execution_time_ms,
                    was_limited,
                    "Query completed"
                );

                let result = ResultSet {
                    columns: fetched.columns,
                    rows: fetched.rows,
                    row_count,
                    execution_time_ms,
                    was_limited,
                };
                Ok((statement, Some(result)))
            }
            Err(err) => {
                let message = err.to_string();
                warn!(name = %record.name, error = %message, "Query failed");
                statement.fail(&message);
                Err(GatewayError::query_execution(message, statement))
            }
        }
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

/// Convert fetched rows, taking column metadata from the first row.
fn process_rows<R: RowToScalars>(rows: Vec<R>, start: Instant) -> FetchedRows {
    let elapsed = start.elapsed();
    let columns = rows.first().map(|r| r.column_defs()).unwrap_or_default();
    let rows = rows.iter().map(|r| r.to_result_row()).collect();

    FetchedRows {
        columns,
        rows,
        elapsed,
    }
}

fn statement_columns<C: sqlx::Column>(columns: &[C]) -> Vec<ColumnDef> {
    columns
        .iter()
        .map(|col| ColumnDef::new(col.name(), declared_type(col.type_info())))
        .collect()
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

pub mod mysql {
    use super::*;
    use futures_util::TryStreamExt;
    use sqlx::mysql::MySqlRow;
    use sqlx::{Executor, MySqlConnection, Statement};

    pub async fn fetch_rows(
        conn: &mut MySqlConnection,
        sql: &str,
        deadline: Duration,
    ) -> GatewayResult<FetchedRows> {
        // MAX_EXECUTION_TIME only exists on MySQL 5.7+; MariaDB rejects it.
        let set_timeout = format!("SET SESSION MAX_EXECUTION_TIME = {}", deadline.as_millis());
        if let Err(e) = (&mut *conn).execute(set_timeout.as_str()).await {
            debug!(error = %e, "Statement timeout not applied");
        }

        let start = Instant::now();
        let rows: Vec<MySqlRow> = (&mut *conn).fetch(sql).try_collect().await?;
        let mut fetched = process_rows(rows, start);

        if fetched.columns.is_empty() {
            match (&mut *conn).prepare(sql).await {
                Ok(prepared) => fetched.columns = statement_columns(prepared.columns()),
                Err(e) => debug!(error = %e, "Column metadata unavailable"),
            }
        }
        Ok(fetched)
    }
}

pub mod postgres {
    use super::*;
    use futures_util::TryStreamExt;
    use sqlx::postgres::PgRow;
    use sqlx::{Executor, PgConnection, Statement};

    pub async fn fetch_rows(
        conn: &mut PgConnection,
        sql: &str,
        deadline: Duration,
    ) -> GatewayResult<FetchedRows> {
        let set_timeout = format!("SET statement_timeout = {}", deadline.as_millis());
        if let Err(e) = (&mut *conn).execute(set_timeout.as_str()).await {
            debug!(error = %e, "Statement timeout not applied");
        }

        let start = Instant::now();
        let rows: Vec<PgRow> = (&mut *conn).fetch(sql).try_collect().await?;
        let mut fetched = process_rows(rows, start);

        if fetched.columns.is_empty() {
            match (&mut *conn).prepare(sql).await {
                Ok(prepared) => fetched.columns = statement_columns(prepared.columns()),
                Err(e) => debug!(error = %e, "Column metadata unavailable"),
            }
        }
        Ok(fetched)
    }
}

pub mod sqlite {
    use super::*;
    use futures_util::TryStreamExt;
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Executor, SqliteConnection, Statement};

    /// Margin past the caller's deadline before the statement is interrupted,
    /// so the caller's own timeout is what the client sees.
    const INTERRUPT_GRACE: Duration = Duration::from_millis(250);

    /// SQLite has no server-side statement timeout. A progress handler
    /// interrupts the statement once the deadline has passed, which frees
    /// the connection worker for `close_hard`.
    pub async fn fetch_rows(
        conn: &mut SqliteConnection,
        sql: &str,
        deadline: Duration,
    ) -> GatewayResult<FetchedRows> {
        let start = Instant::now();
        let cutoff = start + deadline + INTERRUPT_GRACE;
        conn.lock_handle()
            .await?
            .set_progress_handler(1000, move || Instant::now() < cutoff);

        let rows: Vec<SqliteRow> = (&mut *conn).fetch(sql).try_collect().await?;
        let mut fetched = process_rows(rows, start);

        if fetched.columns.is_empty() {
            match (&mut *conn).prepare(sql).await {
                Ok(prepared) => fetched.columns = statement_columns(prepared.columns()),
                Err(e) => debug!(error = %e, "Column metadata unavailable"),
            }
        }
        Ok(fetched)
    }
}
