//! Row decoding into typed cell values.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders extract a [`ScalarValue`]
//!
//! Statements run without bind parameters, so PostgreSQL and MySQL return
//! text-format values; any column the typed decoders cannot handle falls back
//! to its text rendering rather than being dropped.

use crate::models::query::UNKNOWN_TYPE;
use crate::models::{ColumnDef, DatabaseType, Row as ResultRow, ScalarValue, TemporalValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Names that contain "int" without being integers
    if lower == "interval" || lower.contains("point") {
        return TypeCategory::Text;
    }

    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.starts_with("timestamp")
        || lower.contains("datetime")
        || lower == "date"
        || lower == "time"
    {
        return TypeCategory::Temporal;
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" || lower == "uuid" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// Declared column type, or the unknown tag when the driver reports none.
pub(crate) fn declared_type(info: &impl TypeInfo) -> String {
    let name = info.name();
    if name.is_empty() || info.is_null() {
        UNKNOWN_TYPE.to_string()
    } else {
        name.to_string()
    }
}

fn float_value(v: f64) -> ScalarValue {
    ScalarValue::Float(v)
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Row Conversion Trait
// =============================================================================

/// Trait for converting driver rows into result rows.
pub trait RowToScalars {
    fn to_result_row(&self) -> ResultRow;
    fn column_defs(&self) -> Vec<ColumnDef>;
}

impl RowToScalars for MySqlRow {
    fn to_result_row(&self) -> ResultRow {
        ResultRow::new(
            self.columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    let type_name = col.type_info().name();
                    let category = categorize_type(type_name, DatabaseType::MySQL);
                    let value = mysql::decode_column(self, idx, type_name, category);
                    (col.name().to_string(), value)
                })
                .collect(),
        )
    }

    fn column_defs(&self) -> Vec<ColumnDef> {
        self.columns()
            .iter()
            .map(|col| ColumnDef::new(col.name(), declared_type(col.type_info())))
            .collect()
    }
}

impl RowToScalars for PgRow {
    fn to_result_row(&self) -> ResultRow {
        ResultRow::new(
            self.columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    let type_name = col.type_info().name();
                    let category = categorize_type(type_name, DatabaseType::PostgreSQL);
                    let value = postgres::decode_column(self, idx, type_name, category);
                    (col.name().to_string(), value)
                })
                .collect(),
        )
    }

    fn column_defs(&self) -> Vec<ColumnDef> {
        self.columns()
            .iter()
            .map(|col| ColumnDef::new(col.name(), declared_type(col.type_info())))
            .collect()
    }
}

impl RowToScalars for SqliteRow {
    fn to_result_row(&self) -> ResultRow {
        ResultRow::new(
            self.columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    let declared = col.type_info().name();
                    (col.name().to_string(), sqlite::decode_column(self, idx, declared))
                })
                .collect(),
        )
    }

    fn column_defs(&self) -> Vec<ColumnDef> {
        self.columns()
            .iter()
            .map(|col| ColumnDef::new(col.name(), declared_type(col.type_info())))
            .collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> ScalarValue {
        if let Ok(raw) = row.try_get_raw(idx) {
            if raw.is_null() {
                return ScalarValue::Null;
            }
        }
        let typed = match category {
            TypeCategory::Decimal => row
                .try_get::<RawDecimal, _>(idx)
                .ok()
                .map(|v| ScalarValue::Decimal(v.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(ScalarValue::Boolean),
            TypeCategory::Float => row
                .try_get::<f64, _>(idx)
                .or_else(|_| row.try_get::<f32, _>(idx).map(f64::from))
                .ok()
                .map(float_value),
            TypeCategory::Binary => row.try_get::<Vec<u8>, _>(idx).ok().map(ScalarValue::Binary),
            TypeCategory::Json => row
                .try_get::<serde_json::Value, _>(idx)
                .ok()
                .map(ScalarValue::Json),
            TypeCategory::Temporal => decode_temporal(row, idx, type_name),
            TypeCategory::Text | TypeCategory::Unknown => None,
        };
        typed.unwrap_or_else(|| decode_text(row, idx))
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Option<ScalarValue> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(ScalarValue::Integer(v));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(ScalarValue::Integer(v.into()));
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Some(ScalarValue::Integer(v.into()));
        }
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return Some(ScalarValue::Integer(v.into()));
        }
        // Unsigned values above i64::MAX are kept exact as decimals
        row.try_get::<u64, _>(idx).ok().map(|v| match i64::try_from(v) {
            Ok(v) => ScalarValue::Integer(v),
            Err(_) => ScalarValue::Decimal(v.to_string()),
        })
    }

    fn decode_temporal(row: &MySqlRow, idx: usize, type_name: &str) -> Option<ScalarValue> {
        let value = match type_name.to_uppercase().as_str() {
            "TIMESTAMP" => TemporalValue::DateTimeUtc(row.try_get::<DateTime<Utc>, _>(idx).ok()?),
            "DATETIME" => TemporalValue::DateTime(row.try_get::<NaiveDateTime, _>(idx).ok()?),
            "DATE" => TemporalValue::Date(row.try_get::<NaiveDate, _>(idx).ok()?),
            "TIME" => TemporalValue::Time(row.try_get::<NaiveTime, _>(idx).ok()?),
            _ => return None,
        };
        Some(ScalarValue::Temporal(value))
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> ScalarValue {
        match row.try_get_unchecked::<Option<String>, _>(idx) {
            Ok(Some(v)) => ScalarValue::Text(v),
            Ok(None) => ScalarValue::Null,
            Err(e) => {
                tracing::warn!(column = idx, error = %e, "Failed to decode MySQL column");
                ScalarValue::Null
            }
        }
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> ScalarValue {
        if let Ok(raw) = row.try_get_raw(idx) {
            if raw.is_null() {
                return ScalarValue::Null;
            }
        }
        let typed = match category {
            TypeCategory::Decimal => row
                .try_get::<RawDecimal, _>(idx)
                .ok()
                .map(|v| ScalarValue::Decimal(v.0)),
            TypeCategory::Integer => row
                .try_get::<i64, _>(idx)
                .or_else(|_| row.try_get::<i32, _>(idx).map(i64::from))
                .or_else(|_| row.try_get::<i16, _>(idx).map(i64::from))
                .ok()
                .map(ScalarValue::Integer),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(ScalarValue::Boolean),
            TypeCategory::Float => row
                .try_get::<f64, _>(idx)
                .or_else(|_| row.try_get::<f32, _>(idx).map(f64::from))
                .ok()
                .map(float_value),
            TypeCategory::Binary => row.try_get::<Vec<u8>, _>(idx).ok().map(ScalarValue::Binary),
            TypeCategory::Json => row
                .try_get::<serde_json::Value, _>(idx)
                .ok()
                .map(ScalarValue::Json),
            TypeCategory::Temporal => decode_temporal(row, idx, type_name),
            TypeCategory::Text | TypeCategory::Unknown => None,
        };
        typed.unwrap_or_else(|| decode_text(row, idx))
    }

    fn decode_temporal(row: &PgRow, idx: usize, type_name: &str) -> Option<ScalarValue> {
        let value = match type_name.to_uppercase().as_str() {
            "TIMESTAMPTZ" => TemporalValue::DateTimeUtc(row.try_get::<DateTime<Utc>, _>(idx).ok()?),
            "TIMESTAMP" => TemporalValue::DateTime(row.try_get::<NaiveDateTime, _>(idx).ok()?),
            "DATE" => TemporalValue::Date(row.try_get::<NaiveDate, _>(idx).ok()?),
            "TIME" => TemporalValue::Time(row.try_get::<NaiveTime, _>(idx).ok()?),
            _ => return None,
        };
        Some(ScalarValue::Temporal(value))
    }

    fn decode_text(row: &PgRow, idx: usize) -> ScalarValue {
        match row.try_get_unchecked::<Option<String>, _>(idx) {
            Ok(Some(v)) => ScalarValue::Text(v),
            Ok(None) => ScalarValue::Null,
            Err(e) => {
                tracing::warn!(column = idx, error = %e, "Failed to decode PostgreSQL column");
                ScalarValue::Null
            }
        }
    }
}

mod sqlite {
    use super::*;

    /// SQLite is dynamically typed: the storage class of the value decides
    /// the decoder, the declared type only refines text into temporal/json.
    pub fn decode_column(row: &SqliteRow, idx: usize, declared: &str) -> ScalarValue {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return ScalarValue::Null,
            Ok(raw) => raw.type_info().name().to_uppercase(),
            Err(_) => return ScalarValue::Null,
        };

        let category = categorize_type(declared, DatabaseType::SQLite);
        match storage.as_str() {
            "INTEGER" if category == TypeCategory::Boolean => row
                .try_get::<bool, _>(idx)
                .map(ScalarValue::Boolean)
                .unwrap_or(ScalarValue::Null),
            "INTEGER" => row
                .try_get::<i64, _>(idx)
                .map(ScalarValue::Integer)
                .unwrap_or(ScalarValue::Null),
            "REAL" => row
                .try_get::<f64, _>(idx)
                .map(float_value)
                .unwrap_or(ScalarValue::Null),
            "BLOB" => row
                .try_get::<Vec<u8>, _>(idx)
                .map(ScalarValue::Binary)
                .unwrap_or(ScalarValue::Null),
            _ => decode_text(row, idx, category),
        }
    }

    fn decode_text(row: &SqliteRow, idx: usize, category: TypeCategory) -> ScalarValue {
        let text = match row.try_get_unchecked::<Option<String>, _>(idx) {
            Ok(Some(v)) => v,
            _ => return ScalarValue::Null,
        };
        match category {
            TypeCategory::Json => serde_json::from_str(&text)
                .map(ScalarValue::Json)
                .unwrap_or(ScalarValue::Text(text)),
            TypeCategory::Temporal => parse_temporal(&text)
                .map(ScalarValue::Temporal)
                .unwrap_or(ScalarValue::Text(text)),
            _ => ScalarValue::Text(text),
        }
    }

    fn parse_temporal(text: &str) -> Option<TemporalValue> {
        if let Ok(v) = DateTime::parse_from_rfc3339(text) {
            return Some(TemporalValue::DateTimeUtc(v.with_timezone(&Utc)));
        }
        for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(v) = NaiveDateTime::parse_from_str(text, fmt) {
                return Some(TemporalValue::DateTime(v));
            }
        }
        if let Ok(v) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return Some(TemporalValue::Date(v));
        }
        NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
            .ok()
            .map(TemporalValue::Time)
    }

}
