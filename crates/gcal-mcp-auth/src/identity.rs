//! The identity provider contract.

use crate::BoxFuture;
use crate::credentials::CredentialBundle;
use crate::error::AuthResult;
use crate::token::TokenRecord;

/// Scopes requested for calendar access.
pub const CALENDAR_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/calendar.events",
];

/// Flags appended to the authorization URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthUrlOptions {
    /// Request a refresh token (`access_type=offline`).
    pub offline_access: bool,
    /// Always show the consent screen (`prompt=consent`), which makes Google
    /// reissue a refresh token even for a returning user.
    pub force_consent: bool,
    /// Opaque value echoed back on the redirect.
    pub state: Option<String>,
}

impl AuthUrlOptions {
    /// Offline access with forced consent, the flags the manager always uses.
    pub fn offline_consent() -> Self {
        Self {
            offline_access: true,
            force_consent: true,
            state: None,
        }
    }

    /// Sets the state parameter.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }
}

/// OAuth identity provider.
///
/// Implementations perform a single attempt per call; timeouts and retries
/// are applied by the token manager.
pub trait IdentityProvider: Send + Sync {
    /// Builds the URL a human visits to grant access.
    fn authorization_url(
        &self,
        bundle: &CredentialBundle,
        scopes: &[&str],
        options: &AuthUrlOptions,
    ) -> String {
        build_authorization_url(bundle, scopes, options)
    }

    /// Trades a one-time authorization code for a token record.
    fn exchange_code<'a>(
        &'a self,
        bundle: &'a CredentialBundle,
        code: &'a str,
    ) -> BoxFuture<'a, AuthResult<TokenRecord>>;

    /// Obtains a new access token using the record's refresh token.
    ///
    /// The returned record may lack a refresh token; the manager merges it
    /// with the current one.
    fn refresh<'a>(
        &'a self,
        bundle: &'a CredentialBundle,
        record: &'a TokenRecord,
    ) -> BoxFuture<'a, AuthResult<TokenRecord>>;

    /// Revokes the grant behind the record.
    fn revoke<'a>(
        &'a self,
        bundle: &'a CredentialBundle,
        record: &'a TokenRecord,
    ) -> BoxFuture<'a, AuthResult<()>>;
}

/// Builds a standard OAuth 2.0 authorization code URL.
pub fn build_authorization_url(
    bundle: &CredentialBundle,
    scopes: &[&str],
    options: &AuthUrlOptions,
) -> String {
    let separator = if bundle.auth_uri.contains('?') { '&' } else { '?' };
    let mut url = format!(
        "{}{}client_id={}&redirect_uri={}&response_type=code&scope={}",
        bundle.auth_uri,
        separator,
        urlencoding::encode(&bundle.client_id),
        urlencoding::encode(&bundle.redirect_uri),
        urlencoding::encode(&scopes.join(" ")),
    );
    if options.offline_access {
        url.push_str("&access_type=offline");
    }
    if options.force_consent {
        url.push_str("&prompt=consent");
    }
    if let Some(ref state) = options.state {
        url.push_str("&state=");
        url.push_str(&urlencoding::encode(state));
    }
    url
}
