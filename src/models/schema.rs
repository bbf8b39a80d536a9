//! Schema-related data models.
//!
//! A [`SchemaSnapshot`] is the result of one introspection pass over a target
//! database. It is always replaced whole, never merged.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaSnapshot {
    pub database_name: String,
    pub tables: Vec<TableInfo>,
    pub views: Vec<ViewInfo>,
    pub extracted_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            tables: Vec::new(),
            views: Vec::new(),
            extracted_at: Utc::now(),
        }
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub columns: Vec<ColumnInfo>,
    /// Primary key columns in key order
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexInfo>,
    /// Estimate only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

impl TableInfo {
    /// Create a new table info.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
            row_count: None,
        }
    }

    /// Set the schema name.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Set the estimated row count.
    pub fn with_row_count(mut self, row_count: u64) -> Self {
        self.row_count = Some(row_count);
        self
    }

    /// Set the column flags from the table-level key lists.
    pub fn apply_key_flags(&mut self, foreign_key_columns: &[String]) {
        for column in &mut self.columns {
            column.is_primary_key = self.primary_key.contains(&column.name);
            column.is_foreign_key = foreign_key_columns.contains(&column.name);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ViewInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub columns: Vec<ColumnInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            is_primary_key: false,
            is_foreign_key: false,
            comment: None,
        }
    }

    pub fn with_default(mut self, default_value: Option<String>) -> Self {
        self.default_value = default_value;
        self
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment.filter(|c| !c.is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    /// e.g., btree, hash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_table() -> TableInfo {
        let mut table = TableInfo::new("users");
        table.columns = vec![
            ColumnInfo::new("id", "INTEGER", false),
            ColumnInfo::new("team_id", "INTEGER", true),
            ColumnInfo::new("email", "TEXT", true),
        ];
        table.primary_key = vec!["id".to_string()];
        table
    }

    #[test]
    fn test_apply_key_flags() {
        let mut table = users_table();
        table.apply_key_flags(&["team_id".to_string()]);
        assert!(table.columns[0].is_primary_key);
        assert!(!table.columns[0].is_foreign_key);
        assert!(table.columns[1].is_foreign_key);
        assert!(!table.columns[2].is_primary_key);
    }

    #[test]
    fn test_empty_comment_is_dropped() {
        let column = ColumnInfo::new("id", "int", false).with_comment(Some(String::new()));
        assert!(column.comment.is_none());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut snapshot = SchemaSnapshot::new("s1");
        snapshot.tables.push(users_table());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["database_name"], "s1");
        assert_eq!(json["tables"][0]["primary_key"][0], "id");
        assert!(json["tables"][0].get("row_count").is_none());

        let back: SchemaSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
        assert!(back.table("users").is_some());
    }
}
