//! Error types for the binary and its tool calls.

use std::io;
use std::path::PathBuf;

use gcal_mcp_auth::AuthError;
use gcal_mcp_calendar::CalendarError;
use gcal_mcp_core::{TimeParseError, TracingError};
use thiserror::Error;

use crate::format;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or interpreting `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but cannot be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// A setting has an unusable value.
    #[error("invalid setting `{field}`: {message}")]
    Invalid { field: &'static str, message: String },

    /// A `pass::` or `env::` reference could not be resolved.
    #[error("failed to resolve `{field}`: {message}")]
    Secret { field: &'static str, message: String },
}

impl ConfigError {
    /// Creates an invalid setting error.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors surfaced by the `gcal-mcp` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Token lifecycle failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Calendar API failure.
    #[error(transparent)]
    Calendar(#[from] CalendarError),

    /// Logging could not be set up.
    #[error(transparent)]
    Tracing(#[from] TracingError),

    /// Terminal or socket IO failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The MCP transport failed.
    #[error("MCP server error: {0}")]
    Mcp(String),

    /// The OAuth redirect never delivered a usable code.
    #[error("authorization callback failed: {0}")]
    Callback(String),
}

impl CliError {
    /// Creates an MCP transport error.
    pub fn mcp(message: impl Into<String>) -> Self {
        Self::Mcp(message.into())
    }

    /// Creates a callback error.
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback(message.into())
    }
}

/// Why a tool call produced an error result.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The arguments do not match the tool's schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// A date/time argument could not be understood.
    #[error("invalid date/time: {0}")]
    Date(#[from] TimeParseError),

    /// The calendar operation failed.
    #[error(transparent)]
    Calendar(#[from] CalendarError),

    /// The token manager refused.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ToolError {
    /// Creates an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    /// Text returned to the MCP client.
    pub fn user_message(&self) -> String {
        match self {
            Self::Calendar(err) => format::describe_error(err),
            Self::Auth(err) => format::describe_auth_error(err),
            other => other.to_string(),
        }
    }
}
