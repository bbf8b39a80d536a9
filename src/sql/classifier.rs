//! Read-only statement classification and row cap injection.
//!
//! Statements are parsed with [sqlparser](https://docs.rs/sqlparser/) using the
//! dialect of the target engine. Only a single plain query is accepted; the
//! row cap is injected into the AST and the statement reserialized, so the
//! limit always lands after ORDER BY / GROUP BY / set operations.

use sqlparser::ast::{Expr, LimitClause, Query, SetExpr, Statement, Value};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

use crate::error::{GatewayError, GatewayResult};
use crate::models::DatabaseType;

/// Fixed messages returned to callers.
pub mod messages {
    pub const VALID: &str = "SQL validation successful";
    pub const READ_ONLY: &str = "Only SELECT statements are allowed. INSERT, UPDATE, DELETE, and other DML/DDL statements are not permitted.";
    pub const EMPTY: &str = "SQL syntax error: statement is empty";
}

/// Coarse statement kind, for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Unknown,
    Invalid,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Ddl => "DDL",
            Self::Unknown => "UNKNOWN",
            Self::Invalid => "INVALID",
        }
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`SqlClassifier::classify_and_limit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub ok: bool,
    pub message: String,
    /// Reserialized statement with the row cap applied; None when rejected
    pub rewritten_sql: Option<String>,
}

impl Classification {
    fn accepted(rewritten_sql: String) -> Self {
        Self {
            ok: true,
            message: messages::VALID.to_string(),
            rewritten_sql: Some(rewritten_sql),
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            rewritten_sql: None,
        }
    }

    /// The rewritten statement, or a validation error carrying the message.
    pub fn into_result(self) -> GatewayResult<String> {
        match self.rewritten_sql {
            Some(sql) if self.ok => Ok(sql),
            _ => Err(GatewayError::validation(self.message)),
        }
    }
}

/// Parses statements with the dialect of one engine kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlClassifier {
    db_type: Option<DatabaseType>,
}

impl SqlClassifier {
    /// Classifier using the generic dialect.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_database(db_type: DatabaseType) -> Self {
        Self {
            db_type: Some(db_type),
        }
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        match self.db_type {
            Some(DatabaseType::PostgreSQL) => Box::new(PostgreSqlDialect {}),
            Some(DatabaseType::MySQL) => Box::new(MySqlDialect {}),
            Some(DatabaseType::SQLite) => Box::new(SQLiteDialect {}),
            None => Box::new(GenericDialect {}),
        }
    }

    /// Parse exactly one statement, or return the rejection message.
    fn parse_single(&self, sql: &str) -> Result<Statement, String> {
        let dialect = self.dialect();
        let mut statements = Parser::parse_sql(dialect.as_ref(), sql)
            .map_err(|e| format!("SQL syntax error: {}", e))?;

        match statements.len() {
            0 => Err(messages::EMPTY.to_string()),
            1 => Ok(statements.remove(0)),
            _ => Err(messages::READ_ONLY.to_string()),
        }
    }

    /// Accept a single read-only query and make sure it carries a row limit.
    ///
    /// An explicit limit already present is kept as written; otherwise
    /// `LIMIT row_cap` is injected.
    pub fn classify_and_limit(&self, sql: &str, row_cap: u32) -> Classification {
        let mut statement = match self.parse_single(sql) {
            Ok(statement) => statement,
            Err(message) => return Classification::rejected(message),
        };

        let Statement::Query(query) = &mut statement else {
            return Classification::rejected(messages::READ_ONLY);
        };
        if !is_read_only_query(query) {
            return Classification::rejected(messages::READ_ONLY);
        }
        if !query_has_limit(query) {
            inject_limit(query, row_cap);
        }

        Classification::accepted(statement.to_string())
    }

    /// Whether the statement already carries an explicit row limit.
    pub fn has_row_limit(&self, sql: &str) -> bool {
        match self.parse_single(sql) {
            Ok(Statement::Query(query)) => query_has_limit(&query),
            _ => false,
        }
    }

    /// Classify the statement without validating it.
    pub fn statement_kind(&self, sql: &str) -> StatementKind {
        match self.parse_single(sql) {
            Ok(statement) => kind_of(&statement),
            Err(message) if message == messages::READ_ONLY => StatementKind::Unknown,
            Err(_) => StatementKind::Invalid,
        }
    }
}

fn kind_of(statement: &Statement) -> StatementKind {
    match statement {
        Statement::Query(_) => StatementKind::Select,
        Statement::Insert(_) => StatementKind::Insert,
        Statement::Update { .. } => StatementKind::Update,
        Statement::Delete(_) => StatementKind::Delete,

        Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateIndex(_)
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::AlterTable { .. }
        | Statement::AlterView { .. }
        | Statement::AlterIndex { .. }
        | Statement::Drop { .. }
        | Statement::Truncate { .. } => StatementKind::Ddl,

        _ => StatementKind::Unknown,
    }
}

/// A query is read-only when neither it nor any CTE writes, selects INTO a
/// table, or takes row locks.
fn is_read_only_query(query: &Query) -> bool {
    if !query.locks.is_empty() {
        return false;
    }
    if let Some(with) = &query.with {
        if !with.cte_tables.iter().all(|cte| is_read_only_query(&cte.query)) {
            return false;
        }
    }
    is_read_only_body(&query.body)
}

fn is_read_only_body(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(inner) => is_read_only_query(inner),
        SetExpr::SetOperation { left, right, .. } => {
            is_read_only_body(left) && is_read_only_body(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        // INSERT / UPDATE / DELETE / MERGE bodies
        _ => false,
    }
}

fn query_has_limit(query: &Query) -> bool {
    let explicit = match &query.limit_clause {
        Some(LimitClause::LimitOffset { limit, .. }) => limit.is_some(),
        Some(LimitClause::OffsetCommaLimit { .. }) => true,
        None => false,
    };
    let top = matches!(&*query.body, SetExpr::Select(select) if select.top.is_some());
    explicit || top || query.fetch.is_some()
}

fn inject_limit(query: &mut Query, row_cap: u32) {
    let cap = Expr::value(Value::Number(row_cap.to_string(), false));

    // Keep an existing OFFSET
    if let Some(LimitClause::LimitOffset { limit, .. }) = &mut query.limit_clause {
        *limit = Some(cap);
        return;
    }
    query.limit_clause = Some(LimitClause::LimitOffset {
        limit: Some(cap),
        offset: None,
        limit_by: Vec::new(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: u32 = 1000;

    fn classifier() -> SqlClassifier {
        SqlClassifier::for_database(DatabaseType::PostgreSQL)
    }

    // =========================================================================
    // Tests for classify_and_limit
    // =========================================================================

    #[test]
    fn test_select_gets_limit() {
        let result = classifier().classify_and_limit("SELECT * FROM users", CAP);
        assert!(result.ok);
        assert_eq!(result.message, messages::VALID);
        assert_eq!(
            result.rewritten_sql.as_deref(),
            Some("SELECT * FROM users LIMIT 1000")
        );
    }

    #[test]
    fn test_limit_lands_after_order_by() {
        let result = classifier().classify_and_limit(
            "SELECT user_id, COUNT(*) FROM orders GROUP BY user_id ORDER BY 2 DESC",
            CAP,
        );
        let sql = result.rewritten_sql.unwrap();
        assert!(sql.ends_with("ORDER BY 2 DESC LIMIT 1000"), "{sql}");
    }

    #[test]
    fn test_existing_limit_is_preserved() {
        let result = classifier().classify_and_limit("SELECT * FROM users LIMIT 5", CAP);
        assert!(result.ok);
        assert_eq!(
            result.rewritten_sql.as_deref(),
            Some("SELECT * FROM users LIMIT 5")
        );
    }

    #[test]
    fn test_offset_without_limit_gets_limit() {
        let result = classifier().classify_and_limit("SELECT * FROM users OFFSET 10", CAP);
        let sql = result.rewritten_sql.unwrap();
        assert!(sql.contains("LIMIT 1000"), "{sql}");
        assert!(sql.contains("OFFSET 10"), "{sql}");
    }

    #[test]
    fn test_union_is_limited_as_a_whole() {
        let result =
            classifier().classify_and_limit("SELECT a FROM t1 UNION ALL SELECT b FROM t2", CAP);
        assert!(result.ok);
        let sql = result.rewritten_sql.unwrap();
        assert_eq!(sql.matches("LIMIT").count(), 1);
        assert!(sql.ends_with("LIMIT 1000"));
    }

    #[test]
    fn test_cte_select_allowed() {
        let result = classifier()
            .classify_and_limit("WITH recent AS (SELECT * FROM orders) SELECT * FROM recent", CAP);
        assert!(result.ok, "{}", result.message);
    }

    #[test]
    fn test_mysql_comma_limit_preserved() {
        let classifier = SqlClassifier::for_database(DatabaseType::MySQL);
        assert!(classifier.has_row_limit("SELECT * FROM users LIMIT 10, 5"));
        let result = classifier.classify_and_limit("SELECT * FROM users LIMIT 10, 5", CAP);
        assert!(!result.rewritten_sql.unwrap().contains("1000"));
    }

    // =========================================================================
    // Rejections
    // =========================================================================

    #[test]
    fn test_writes_rejected() {
        for sql in [
            "INSERT INTO users VALUES (1)",
            "UPDATE users SET name = 'test'",
            "DELETE FROM users",
            "CREATE TABLE test (id INT)",
            "DROP TABLE users",
            "TRUNCATE users",
        ] {
            let result = classifier().classify_and_limit(sql, CAP);
            assert!(!result.ok, "{sql} should be rejected");
            assert_eq!(result.message, messages::READ_ONLY);
            assert!(result.rewritten_sql.is_none());
        }
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let result = classifier().classify_and_limit("SELECT 1; SELECT 2", CAP);
        assert!(!result.ok);
        assert_eq!(result.message, messages::READ_ONLY);
    }

    #[test]
    fn test_select_into_rejected() {
        let result = classifier().classify_and_limit("SELECT * INTO backup FROM users", CAP);
        assert!(!result.ok);
    }

    #[test]
    fn test_locking_select_rejected() {
        let result = classifier().classify_and_limit("SELECT * FROM users FOR UPDATE", CAP);
        assert!(!result.ok);
    }

    #[test]
    fn test_data_modifying_cte_rejected() {
        let result = classifier().classify_and_limit(
            "WITH gone AS (DELETE FROM users RETURNING id) SELECT * FROM gone",
            CAP,
        );
        assert!(!result.ok);
        assert!(result.rewritten_sql.is_none());
    }

    #[test]
    fn test_syntax_error_message() {
        let result = classifier().classify_and_limit("SELEC * FORM users", CAP);
        assert!(!result.ok);
        assert!(result.message.starts_with("SQL syntax error:"));
        assert!(result.rewritten_sql.is_none());
    }

    #[test]
    fn test_empty_input_rejected() {
        let result = classifier().classify_and_limit("   ", CAP);
        assert!(!result.ok);
        assert_eq!(result.message, messages::EMPTY);
    }

    #[test]
    fn test_into_result() {
        let ok = classifier().classify_and_limit("SELECT 1", CAP).into_result();
        assert_eq!(ok.unwrap(), "SELECT 1 LIMIT 1000");

        let err = classifier()
            .classify_and_limit("DELETE FROM users", CAP)
            .into_result()
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation { .. }));
    }

    // =========================================================================
    // has_row_limit / statement_kind
    // =========================================================================

    #[test]
    fn test_has_row_limit() {
        let c = classifier();
        assert!(c.has_row_limit("SELECT * FROM users LIMIT 3"));
        assert!(c.has_row_limit("SELECT * FROM users FETCH FIRST 3 ROWS ONLY"));
        assert!(!c.has_row_limit("SELECT * FROM users"));
        assert!(!c.has_row_limit("SELECT * FROM users OFFSET 3"));
        assert!(!c.has_row_limit("not sql"));
    }

    #[test]
    fn test_statement_kind() {
        let c = classifier();
        assert_eq!(c.statement_kind("SELECT 1"), StatementKind::Select);
        assert_eq!(c.statement_kind("INSERT INTO t VALUES (1)"), StatementKind::Insert);
        assert_eq!(c.statement_kind("UPDATE t SET a = 1"), StatementKind::Update);
        assert_eq!(c.statement_kind("DELETE FROM t"), StatementKind::Delete);
        assert_eq!(c.statement_kind("CREATE TABLE t (id INT)"), StatementKind::Ddl);
        assert_eq!(c.statement_kind("ALTER TABLE t ADD COLUMN b INT"), StatementKind::Ddl);
        assert_eq!(c.statement_kind("GRANT SELECT ON t TO bob"), StatementKind::Unknown);
        assert_eq!(c.statement_kind("SELECT 1; SELECT 2"), StatementKind::Unknown);
        assert_eq!(c.statement_kind("garbage here"), StatementKind::Invalid);
    }

    #[test]
    fn test_generic_dialect() {
        let result = SqlClassifier::new().classify_and_limit("select id from t", 10);
        assert_eq!(result.rewritten_sql.as_deref(), Some("SELECT id FROM t LIMIT 10"));
    }
}
