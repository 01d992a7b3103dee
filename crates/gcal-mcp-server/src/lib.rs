//! MCP server and CLI for Google Calendar.
//!
//! This crate provides the `gcal-mcp` binary: calendar tools served over MCP
//! stdio plus the commands that set up and inspect authorization.

pub mod callback;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod format;
pub mod secret;
pub mod tools;

pub use cli::Cli;
pub use config::GcalConfig;
pub use error::{CliError, CliResult, ConfigError, ToolError};
pub use tools::{CalendarServer, ToolName};
