//! Authorization commands.

use chrono::Local;
use gcal_mcp_auth::TokenManager;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::callback::{self, CALLBACK_TIMEOUT, LoopbackTarget};
use crate::error::{CliError, CliResult};
use crate::format;

/// Runs the interactive authorization flow.
///
/// When the client's redirect points at a loopback port, the code is caught
/// there; otherwise the user pastes it into the terminal.
pub async fn login(tokens: &TokenManager, no_browser: bool, force: bool) -> CliResult<()> {
    tokens.initialize().await?;
    if tokens.status().authenticated && !force {
        println!("Already authorized with Google Calendar.");
        println!("Use --force to authorize again.");
        return Ok(());
    }

    let url = tokens.authorization_url()?;
    let listener = match loopback_target(&url) {
        Some(target) => match target.bind().await {
            Ok(listener) => Some((listener, target.path)),
            Err(e) => {
                warn!(error = %e, port = target.port, "cannot listen for the redirect, falling back to manual entry");
                None
            }
        },
        None => None,
    };

    println!("Open this URL to grant Google Calendar access:");
    println!();
    println!("  {}", url);
    println!();
    if !no_browser && let Err(e) = open::that(&url) {
        warn!(error = %e, "failed to open browser");
    }

    let code = match listener {
        Some((listener, path)) => {
            println!("Waiting for the browser to return...");
            callback::wait_for_code(&listener, &path, CALLBACK_TIMEOUT).await?
        }
        None => prompt_for_code().await?,
    };

    exchange(tokens, &code).await
}

/// Finishes authorization with a code obtained elsewhere.
pub async fn code(tokens: &TokenManager, input: &str) -> CliResult<()> {
    let code = callback::extract_code(input).map_err(CliError::callback)?;
    exchange(tokens, &code).await
}

/// Prints the authorization state.
pub async fn status(tokens: &TokenManager) -> CliResult<()> {
    if let Err(e) = tokens.initialize().await {
        warn!(error = %e, "credentials unavailable");
    }
    println!("{}", format::format_status(&tokens.status(), &Local));
    Ok(())
}

/// Revokes access and deletes the stored token.
pub async fn logout(tokens: &TokenManager) -> CliResult<()> {
    let report = tokens.clear_tokens().await?;
    println!("{}", format::format_clear_report(&report));
    Ok(())
}

async fn exchange(tokens: &TokenManager, code: &str) -> CliResult<()> {
    let grant = tokens.exchange_authorization_code(code).await?;
    info!(expires_at = %grant.expires_at(), "authorization complete");
    println!("Authorization successful.");
    println!(
        "Access token valid until {}; it will be renewed automatically.",
        grant.expires_at().with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

/// The loopback listener the authorization URL redirects to, if any.
fn loopback_target(auth_url: &str) -> Option<LoopbackTarget> {
    callback::redirect_of(auth_url).and_then(|redirect| LoopbackTarget::from_redirect(&redirect))
}

async fn prompt_for_code() -> CliResult<String> {
    println!("Paste the authorization code (or the URL you were redirected to):");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    callback::extract_code(&line).map_err(CliError::callback)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gcal_mcp_auth::{
        CredentialBundle, GoogleIdentityProvider, MemoryTokenStore, StaticCredentialSource,
    };

    use super::*;

    fn manager(redirect: &str) -> TokenManager {
        let bundle = CredentialBundle::new("client", "secret").with_redirect_uri(redirect);
        TokenManager::new(
            Arc::new(StaticCredentialSource::new(bundle, "test")),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(GoogleIdentityProvider::new(std::time::Duration::from_secs(1)).unwrap()),
        )
    }

    #[tokio::test]
    async fn loopback_follows_the_redirect() {
        let tokens = manager("http://127.0.0.1:3500/oauth2callback");
        tokens.initialize().await.unwrap();
        let url = tokens.authorization_url().unwrap();
        assert_eq!(
            loopback_target(&url),
            Some(LoopbackTarget {
                port: 3500,
                path: "/oauth2callback".into()
            })
        );

        let tokens = manager("urn:ietf:wg:oauth:2.0:oob");
        tokens.initialize().await.unwrap();
        assert_eq!(loopback_target(&tokens.authorization_url().unwrap()), None);
    }

    #[tokio::test]
    async fn denied_redirect_is_not_exchanged() {
        let tokens = manager("http://localhost:3500/cb");
        let err = code(&tokens, "http://localhost:3500/cb?error=access_denied")
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Callback(_)));
        assert!(err.to_string().contains("access_denied"));
    }
}
