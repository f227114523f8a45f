//! Error types for the mute notification system
//!
//! Every failure the notify pipeline can produce is a variant of
//! [`NotifyError`]. Callers that need to group failures (for log fields or
//! user replies) use [`NotifyError::kind`].

use crate::notify::SUPPORTED_FORMATS;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading rules, rendering outputs, or
/// talking to the watched-user store
#[derive(Debug, Error)]
pub enum NotifyError {
    /// A status switch was built without one of its three slots
    #[error("'{0}' field may not be null in StatusSwitch")]
    MissingSwitchSlot(&'static str),

    /// A rule specification lacks a required field
    #[error("'{field}' is required in mute notify output specification{}", rule_suffix(.rule))]
    MissingField {
        field: &'static str,
        rule: Option<String>,
    },

    /// A rule specification names a format we cannot render
    #[error(
        "Unknown format '{format}' in mute notify output specification '{rule}'; supported formats are {}",
        supported_formats()
    )]
    UnsupportedFormat { format: String, rule: String },

    /// The `id` of a rule is not a user id
    #[error("Invalid user id '{value}' in mute notify output specification '{rule}'")]
    InvalidId { value: String, rule: String },

    /// A rule entry could not be read at all
    #[error("Malformed mute notify output specification: {0}")]
    MalformedRule(String),

    /// The bot configuration file could not be read or parsed
    #[error("Failed to load configuration: {0}")]
    ConfigFile(String),

    /// The source artifact selected for a status does not exist
    #[error("Render source not found: {}", .0.display())]
    SourceMissing(PathBuf),

    /// Filesystem error while rendering or persisting
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The watched-user store could not be decoded or encoded
    #[error("Storage error: {0}")]
    Storage(#[from] serde_yaml::Error),

    /// The invoking member lacks a staff role
    #[error("You must be staff to use this command :(")]
    NotStaff,

    /// A guild is not available in the cache
    #[error("Guild not available: {0}")]
    GuildUnavailable(u64),
}

fn rule_suffix(rule: &Option<String>) -> String {
    rule.as_ref()
        .map_or_else(String::new, |name| format!(" '{name}'"))
}

fn supported_formats() -> String {
    SUPPORTED_FORMATS
        .iter()
        .map(|format| format!("'{format}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl NotifyError {
    /// Static label used as a structured log field
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingField { .. }
            | Self::UnsupportedFormat { .. }
            | Self::InvalidId { .. }
            | Self::MalformedRule(_)
            | Self::ConfigFile(_) => "config",
            Self::MissingSwitchSlot(_) => "validation",
            Self::SourceMissing(_) | Self::Io(_) | Self::Storage(_) => "io",
            Self::NotStaff => "authorization",
            Self::GuildUnavailable(_) => "platform",
        }
    }
}

/// Result type for notify operations
pub type NotifyResult<T> = Result<T, NotifyError>;
