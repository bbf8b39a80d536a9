//! Connection-related data models.
//!
//! A [`ConnectionRecord`] is the registry's durable view of one target
//! database, keyed by its caller-chosen name.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maximum length of a connection name.
pub const MAX_NAME_LEN: usize = 100;

/// Maximum stored length of a connection error message.
pub const MAX_CONNECTION_ERROR_LEN: usize = 500;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// All supported engines, in display order.
    pub const ALL: [DatabaseType; 3] = [Self::MySQL, Self::PostgreSQL, Self::SQLite];

    /// Parse database type from a connection URL's scheme prefix.
    pub fn from_url(url: &str) -> Option<Self> {
        let lower = url.trim().to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Lowercase tag used in persistence.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }

    pub fn parse_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// Human-readable list of supported engines, e.g. for error messages.
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|t| t.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Live status of a registered database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }

    pub fn parse_tag(tag: &str) -> Option<Self> {
        match tag {
            "connected" => Some(Self::Connected),
            "disconnected" => Some(Self::Disconnected),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A registered target database.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ConnectionRecord {
    pub name: String,
    /// Contains credentials - never log or serialize
    #[serde(skip_serializing)]
    pub url: String,
    pub database_type: DatabaseType,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_metadata_refresh: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ConnectionRecord {
    /// Validate the name and URL and build a fresh, disconnected record.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self, ConnectionRecordError> {
        let name = name.into();
        let url = url.into().trim().to_string();
        validate_name(&name)?;

        if !url.contains("://") && !url.to_lowercase().starts_with("sqlite:") {
            return Err(ConnectionRecordError::MalformedUrl);
        }
        let database_type =
            DatabaseType::from_url(&url).ok_or(ConnectionRecordError::UnsupportedScheme)?;

        Ok(Self {
            name,
            url,
            database_type,
            status: ConnectionStatus::Disconnected,
            created_at: Utc::now(),
            last_connected_at: None,
            last_metadata_refresh: None,
            error_message: None,
        })
    }

    /// Record a successful probe and extraction.
    pub fn mark_connected(&mut self, refreshed_at: DateTime<Utc>) {
        self.status = ConnectionStatus::Connected;
        self.last_connected_at = Some(Utc::now());
        self.last_metadata_refresh = Some(refreshed_at);
        self.error_message = None;
    }

    /// Record a failed connect attempt. Timestamps of earlier successes are kept.
    pub fn mark_error(&mut self, message: &str) {
        self.status = ConnectionStatus::Error;
        self.error_message = Some(truncate_chars(message, MAX_CONNECTION_ERROR_LEN));
    }

    /// Get a display-safe version of the URL (password masked).
    ///
    /// The userinfo ends at the last `@` before the host, so passwords
    /// containing `@` are masked whole.
    pub fn masked_url(&self) -> String {
        if let Ok(mut parsed) = url::Url::parse(&self.url) {
            if parsed.password().is_none() {
                return self.url.clone();
            }
            if parsed.set_password(Some("****")).is_ok() {
                return parsed.to_string();
            }
        }

        // Unparseable URL: mask everything between the user and the last '@'
        let Some(at_pos) = self.url.rfind('@') else {
            return self.url.clone();
        };
        let scheme_end = self.url.find("://").map(|p| p + 3).unwrap_or(0);
        match self.url.get(scheme_end..at_pos).and_then(|userinfo| userinfo.find(':')) {
            Some(colon_pos) => format!(
                "{}****{}",
                &self.url[..scheme_end + colon_pos + 1],
                &self.url[at_pos..]
            ),
            None => self.url.clone(),
        }
    }
}

/// Check a connection name: 1-100 characters of `[A-Za-z0-9_]`.
pub fn validate_name(name: &str) -> Result<(), ConnectionRecordError> {
    if name.is_empty() {
        return Err(ConnectionRecordError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ConnectionRecordError::NameTooLong);
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConnectionRecordError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Errors that can occur when building a connection record.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionRecordError {
    #[error("Database name cannot be empty")]
    EmptyName,

    #[error("Database name must be at most 100 characters")]
    NameTooLong,

    #[error("Database name may only contain letters, digits and underscores: {0}")]
    InvalidName(String),

    #[error("Invalid connection URL format")]
    MalformedUrl,

    #[error("Unsupported database type. Supported: {}", DatabaseType::supported_list())]
    UnsupportedScheme,
}
