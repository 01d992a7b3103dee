//! Subcommand implementations.

pub mod auth;
pub mod config;
pub mod serve;

use std::path::Path;
use std::sync::Arc;

use gcal_mcp_auth::{GoogleIdentityProvider, ManagerSettings, TokenManager};
use gcal_mcp_calendar::{CalendarService, GoogleCalendarClient};
use tracing::debug;

use crate::config::GcalConfig;
use crate::error::CliResult;

/// Wires the token manager and calendar client from configuration.
///
/// Nothing is loaded yet: credentials and the stored token are read on the
/// first call to [`TokenManager::initialize`].
pub fn build_service(config: &GcalConfig, config_path: &Path) -> CliResult<CalendarService> {
    let google = &config.google;
    let timeout = google.timeout()?;

    let credentials = google.credential_source(config_path)?;
    let store = Arc::new(google.token_store());
    let provider = Arc::new(GoogleIdentityProvider::new(timeout)?);
    debug!(
        credentials = %credentials.location(),
        token_path = %google.token_path().display(),
        "building calendar service"
    );

    let tokens = TokenManager::with_settings(
        credentials,
        store,
        provider,
        ManagerSettings::default().with_provider_timeout(timeout),
    );
    let client = GoogleCalendarClient::new(timeout)?;
    Ok(CalendarService::new(tokens, client).with_default_calendar(&google.default_calendar))
}

#[cfg(test)]
mod tests {
    use gcal_mcp_auth::SessionState;

    use super::*;

    #[tokio::test]
    async fn service_reads_inline_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let content = format!(
            "[google]\nclient_id = \"id.apps.googleusercontent.com\"\nclient_secret = \"s3cret\"\n\
             token_path = \"{}\"\ndefault_calendar = \"team@example.com\"\n",
            dir.path().join("tokens.json").display()
        );
        let config = GcalConfig::parse(&content, &config_path).unwrap();

        let service = build_service(&config, &config_path).unwrap();
        assert_eq!(service.default_calendar(), "team@example.com");
        assert!(service.tokens().credentials_location().contains("config.toml"));

        service.tokens().initialize().await.unwrap();
        assert_eq!(service.tokens().session_state(), SessionState::Unauthenticated);
        let url = service.tokens().authorization_url().unwrap();
        assert!(url.contains("client_id=id.apps.googleusercontent.com"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = GcalConfig::parse("[google]\ntimeout_secs = 0\n", Path::new("config.toml")).unwrap();
        let err = build_service(&config, Path::new("config.toml")).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }
}
