//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// gcal-mcp - Google Calendar for MCP clients
#[derive(Debug, Parser)]
#[command(name = "gcal-mcp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "GCAL_MCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The command to run; serving over stdio when none is given.
    pub fn selected_command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Serve)
    }
}

/// Available commands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Serve the calendar tools over MCP stdio (default)
    Serve,

    /// Authorization commands
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Authorization actions.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum AuthAction {
    /// Authorize Google Calendar access in the browser
    Login {
        /// Print the URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,

        /// Authorize again even if a token is stored
        #[arg(long, short)]
        force: bool,
    },

    /// Finish authorization with a code or redirect URL
    Code {
        /// Authorization code, or the full URL the browser was sent to
        code: String,
    },

    /// Show the authorization state
    Status,

    /// Revoke access and delete the stored token
    Logout,
}

/// Configuration actions.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum ConfigAction {
    /// Dump the effective configuration
    Dump,

    /// Show configuration, credentials and token paths
    Path,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serves_by_default() {
        let cli = Cli::try_parse_from(["gcal-mcp"]).unwrap();
        assert_eq!(cli.selected_command(), &Command::Serve);
        assert!(!cli.debug);
    }

    #[test]
    fn auth_subcommands() {
        let cli = Cli::try_parse_from(["gcal-mcp", "-v", "auth", "login", "--no-browser"]).unwrap();
        assert!(cli.debug);
        assert_eq!(
            cli.selected_command(),
            &Command::Auth {
                action: AuthAction::Login {
                    no_browser: true,
                    force: false
                }
            }
        );

        let cli = Cli::try_parse_from(["gcal-mcp", "auth", "code", "4/abc"]).unwrap();
        assert_eq!(
            cli.selected_command(),
            &Command::Auth {
                action: AuthAction::Code { code: "4/abc".into() }
            }
        );
    }

    #[test]
    fn config_flag() {
        let cli = Cli::try_parse_from(["gcal-mcp", "--config", "/tmp/g.toml", "config", "path"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/g.toml")));
        assert_eq!(
            cli.selected_command(),
            &Command::Config {
                action: ConfigAction::Path
            }
        );
    }
}
