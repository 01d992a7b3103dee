//! Serve command: the MCP server on stdio.

use gcal_mcp_calendar::CalendarService;
use rmcp::{ServiceExt, transport::stdio};
use tracing::{error, info, warn};

use crate::error::{CliError, CliResult};
use crate::tools::CalendarServer;

/// Serves the calendar tools until the client disconnects.
///
/// Missing credentials do not stop the server: the tools report them and
/// the auth tools stay usable.
pub async fn run(service: CalendarService) -> CliResult<()> {
    match service.tokens().initialize().await {
        Ok(()) => info!(state = %service.tokens().session_state(), "token manager ready"),
        Err(e) => warn!(error = %e, "starting without usable credentials"),
    }

    let server = CalendarServer::new(service);
    info!("serving MCP on stdio");
    let running = server
        .serve(stdio())
        .await
        .inspect_err(|e| error!(error = %e, "MCP handshake failed"))
        .map_err(|e| CliError::mcp(e.to_string()))?;

    let reason = running
        .waiting()
        .await
        .map_err(|e| CliError::mcp(e.to_string()))?;
    info!(?reason, "MCP client disconnected");
    Ok(())
}
