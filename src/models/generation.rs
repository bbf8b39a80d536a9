//! Natural-language generation records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::connection::truncate_chars;

/// Prompt length bounds, in characters.
pub const MIN_PROMPT_LEN: usize = 3;
pub const MAX_PROMPT_LEN: usize = 2000;

/// Maximum stored length of a generation error.
pub const MAX_GENERATION_ERROR_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

/// One natural-language to SQL request.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct GenerationRecord {
    pub id: Uuid,
    pub database_name: String,
    pub prompt: String,
    /// Statement as produced by the model, before row cap injection
    pub generated_sql: Option<String>,
    pub status: GenerationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
}

impl GenerationRecord {
    pub fn new(database_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            database_name: database_name.into(),
            prompt: prompt.into(),
            generated_sql: None,
            status: GenerationStatus::Pending,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
            model_used: None,
            tokens_used: None,
        }
    }

    pub fn start(&mut self) {
        self.status = GenerationStatus::Generating;
    }

    pub fn complete(&mut self, sql: impl Into<String>) {
        self.generated_sql = Some(sql.into());
        self.status = GenerationStatus::Completed;
        self.error_message = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, message: &str) {
        self.status = GenerationStatus::Failed;
        self.error_message = Some(truncate_chars(message, MAX_GENERATION_ERROR_LEN));
        self.completed_at = Some(Utc::now());
    }
}

/// Check a prompt against the accepted length bounds.
pub fn validate_prompt(prompt: &str) -> Result<(), String> {
    let len = prompt.trim().chars().count();
    if len < MIN_PROMPT_LEN {
        return Err(format!(
            "Prompt must be at least {} characters",
            MIN_PROMPT_LEN
        ));
    }
    if prompt.chars().count() > MAX_PROMPT_LEN {
        return Err(format!(
            "Prompt must be at most {} characters",
            MAX_PROMPT_LEN
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_lifecycle() {
        let mut record = GenerationRecord::new("s1", "show all users");
        assert_eq!(record.status, GenerationStatus::Pending);
        record.start();
        assert_eq!(record.status, GenerationStatus::Generating);
        record.complete("SELECT * FROM users");
        assert_eq!(record.status, GenerationStatus::Completed);
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn test_validate_prompt_bounds() {
        assert!(validate_prompt("ab").is_err());
        assert!(validate_prompt("   ab   ").is_err());
        assert!(validate_prompt("abc").is_ok());
        assert!(validate_prompt(&"x".repeat(2000)).is_ok());
        assert!(validate_prompt(&"x".repeat(2001)).is_err());
    }

    #[test]
    fn test_fail_truncates_message() {
        let mut record = GenerationRecord::new("s1", "show all users");
        record.fail(&"z".repeat(800));
        assert_eq!(record.status, GenerationStatus::Failed);
        assert_eq!(record.error_message.unwrap().len(), MAX_GENERATION_ERROR_LEN);
    }
}
