//! Google implementation of [`IdentityProvider`].

use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::BoxFuture;
use crate::credentials::CredentialBundle;
use crate::error::{AuthError, AuthResult};
use crate::identity::IdentityProvider;
use crate::token::TokenRecord;

/// Google's token revocation endpoint.
pub const GOOGLE_REVOKE_URI: &str = "https://oauth2.googleapis.com/revoke";

/// Default HTTP timeout for identity provider requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifetime assumed when a token response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Talks to Google's OAuth 2.0 endpoints.
#[derive(Debug, Clone)]
pub struct GoogleIdentityProvider {
    http_client: reqwest::Client,
    revoke_uri: String,
}

impl GoogleIdentityProvider {
    /// Creates a provider whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| AuthError::network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            revoke_uri: GOOGLE_REVOKE_URI.to_string(),
        })
    }

    /// Overrides the revocation endpoint.
    pub fn with_revoke_uri(mut self, revoke_uri: impl Into<String>) -> Self {
        self.revoke_uri = revoke_uri.into();
        self
    }

    async fn post_token(
        &self,
        bundle: &CredentialBundle,
        params: &[(&str, &str)],
        operation: &str,
    ) -> AuthResult<TokenRecord> {
        let response = self
            .http_client
            .post(&bundle.token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| transport_error(operation, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::network(format!("failed to read {} response: {}", operation, e)))?;

        if !status.is_success() {
            return Err(classify_failure(operation, status, &body));
        }

        let record = parse_token_response(&body)?;
        debug!(
            operation,
            has_refresh_token = record.refresh_token.is_some(),
            "token endpoint answered"
        );
        Ok(record)
    }
}

impl IdentityProvider for GoogleIdentityProvider {
    fn exchange_code<'a>(
        &'a self,
        bundle: &'a CredentialBundle,
        code: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenRecord>> {
        Box::pin(async move {
            let params = [
                ("client_id", bundle.client_id.as_str()),
                ("client_secret", bundle.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", bundle.redirect_uri.as_str()),
            ];
            let record = self.post_token(bundle, &params, "token exchange").await?;
            info!("obtained tokens from authorization code");
            Ok(record)
        })
    }

    fn refresh<'a>(
        &'a self,
        bundle: &'a CredentialBundle,
        record: &'a TokenRecord,
    ) -> BoxFuture<'a, AuthResult<TokenRecord>> {
        Box::pin(async move {
            let refresh_token = record
                .refresh_token
                .as_deref()
                .ok_or_else(|| AuthError::rejected("no refresh token stored"))?;
            let params = [
                ("client_id", bundle.client_id.as_str()),
                ("client_secret", bundle.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ];
            self.post_token(bundle, &params, "token refresh").await
        })
    }

    fn revoke<'a>(
        &'a self,
        _bundle: &'a CredentialBundle,
        record: &'a TokenRecord,
    ) -> BoxFuture<'a, AuthResult<()>> {
        Box::pin(async move {
            // Revoking the refresh token also invalidates its access tokens.
            let token = record
                .refresh_token
                .as_deref()
                .unwrap_or(record.access_token.as_str());
            let response = self
                .http_client
                .post(&self.revoke_uri)
                .form(&[("token", token)])
                .send()
                .await
                .map_err(|e| transport_error("token revocation", &e))?;

            let status = response.status();
            if status.is_success() {
                info!("revoked Google grant");
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(classify_failure("token revocation", status, &body))
        })
    }
}

/// Token endpoint success body.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    #[serde(default)]
    scope: String,
    token_type: Option<String>,
}

/// Token endpoint error body.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    error_description: Option<String>,
}

fn parse_token_response(body: &str) -> AuthResult<TokenRecord> {
    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| AuthError::invalid_response(format!("invalid token response: {}", e)))?;

    if response.access_token.is_empty() {
        return Err(AuthError::invalid_response("token response has no access_token"));
    }

    let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    TokenRecord::from_grant(
        response.access_token,
        response.refresh_token.filter(|token| !token.is_empty()),
        response.scope,
        response.token_type,
        expires_in,
        Utc::now(),
    )
    .ok_or_else(|| {
        AuthError::invalid_response(format!("token response has unusable expires_in: {}", expires_in))
    })
}

/// Maps a non-success HTTP answer onto the error taxonomy.
///
/// Server errors, throttling and request timeouts are transient; everything else, including
/// `invalid_grant`, is a rejection that retrying cannot fix.
fn classify_failure(operation: &str, status: StatusCode, body: &str) -> AuthError {
    let detail = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => match err.error_description {
            Some(description) => format!("{}: {}", err.error, description),
            None => err.error,
        },
        Err(_) => body.trim().chars().take(200).collect(),
    };
    let message = format!("{} failed ({}): {}", operation, status, detail);

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        AuthError::network(message)
    } else {
        AuthError::rejected(message)
    }
}

fn transport_error(operation: &str, err: &reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::network(format!("{} timed out: {}", operation, err))
    } else {
        AuthError::network(format!("{} request failed: {}", operation, err))
    }
}
