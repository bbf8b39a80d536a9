//! Query-related data models.
//!
//! This module defines the per-execution [`StatementRecord`] and the
//! [`ResultSet`] it produces, along with the typed cell value.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use schemars::JsonSchema;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::connection::truncate_chars;

/// Default row cap injected into statements without a limit.
pub const DEFAULT_ROW_CAP: u32 = 1000;

/// Default per-execution deadline.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Longest SQL text accepted for execution.
pub const MAX_SQL_LEN: usize = 10_000;

/// Maximum stored length of an execution error.
pub const MAX_STATEMENT_ERROR_LEN: usize = 1000;

/// Type tag used when the driver cannot report a column type.
pub const UNKNOWN_TYPE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One execution attempt of a caller-supplied statement.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct StatementRecord {
    pub sql_text: String,
    /// Statement actually sent to the target; None when validation failed
    pub validated_sql: Option<String>,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StatementRecord {
    pub fn new(sql_text: impl Into<String>) -> Self {
        Self {
            sql_text: sql_text.into(),
            validated_sql: None,
            is_valid: false,
            validation_error: None,
            status: ExecutionStatus::Pending,
            executed_at: None,
            completed_at: None,
            execution_time_ms: None,
            row_count: None,
            error_message: None,
        }
    }

    /// Mark the statement as rejected before execution.
    pub fn reject(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.validated_sql = None;
        self.validation_error = Some(message.into());
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Accept the validated statement and mark it running.
    pub fn start(&mut self, validated_sql: impl Into<String>) {
        self.is_valid = true;
        self.validated_sql = Some(validated_sql.into());
        self.status = ExecutionStatus::Running;
        self.executed_at = Some(Utc::now());
    }

    pub fn complete(&mut self, row_count: usize, execution_time_ms: u64) {
        self.status = ExecutionStatus::Completed;
        self.row_count = Some(row_count);
        self.execution_time_ms = Some(execution_time_ms);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, message: &str) {
        self.status = ExecutionStatus::Failed;
        self.error_message = Some(truncate_chars(message, MAX_STATEMENT_ERROR_LEN));
        self.completed_at = Some(Utc::now());
    }
}

/// Column metadata in a result set.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_table: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            data_type: if data_type.is_empty() {
                UNKNOWN_TYPE.to_string()
            } else {
                data_type
            },
            source_table: None,
        }
    }
}

/// A date/time cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum TemporalValue {
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
}

impl fmt::Display for TemporalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            Self::DateTimeUtc(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

/// A single result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Integer(i64),
    Float(f64),
    /// Exact numeric kept as text to avoid precision loss
    Decimal(String),
    Text(String),
    Boolean(bool),
    Binary(Vec<u8>),
    Temporal(TemporalValue),
    Json(serde_json::Value),
}

impl ScalarValue {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Boolean(_) => "boolean",
            Self::Binary(_) => "binary",
            Self::Temporal(_) => "temporal",
            Self::Json(_) => "json",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// JSON rendering: binary as base64, temporal as ISO 8601 text.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null => Value::Null,
            Self::Integer(v) => Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Decimal(v) | Self::Text(v) => Value::String(v.clone()),
            Self::Boolean(v) => Value::Bool(*v),
            Self::Binary(bytes) => Value::String(BASE64.encode(bytes)),
            Self::Temporal(t) => Value::String(t.to_string()),
            Self::Json(v) => v.clone(),
        }
    }
}

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// One result row, keeping the column order of the statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Vec<(String, ScalarValue)>);

impl Row {
    pub fn new(cells: Vec<(String, ScalarValue)>) -> Self {
        Self(cells)
    }

    /// First cell with the given column name.
    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.0.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    pub fn cells(&self) -> &[(String, ScalarValue)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.0
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Rows and column metadata captured from one execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    /// True when the gateway injected the row cap
    pub was_limited: bool,
}
