//! Error types for the token lifecycle.
//!
//! Every error is tagged with an [`AuthErrorKind`] so callers can tell
//! "needs interactive authorization" from "transient, retry" from "fatal
//! misconfiguration" without matching on individual variants.

use std::fmt;

use thiserror::Error;

/// Coarse classification of an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// Credentials are missing or malformed; an operator must fix config.
    Misconfiguration,
    /// No usable token; a human has to complete the authorization flow.
    NeedsAuthorization,
    /// Network trouble talking to the identity provider.
    Transient,
    /// The identity provider refused the request.
    Rejected,
    /// The persisted token store could not be read or written.
    Storage,
}

impl AuthErrorKind {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns a stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Misconfiguration => "misconfiguration",
            Self::NeedsAuthorization => "needs_authorization",
            Self::Transient => "transient",
            Self::Rejected => "rejected",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the token manager and its collaborators.
///
/// The type is `Clone` because a single refresh result is handed to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No credential bundle, or an unreadable one.
    #[error("OAuth credentials are not configured ({message}); expected them at {location}")]
    NotConfigured { location: String, message: String },

    /// No token yet; the user must visit `auth_url` and grant access.
    #[error("not authenticated with Google Calendar; authorize at {auth_url}")]
    NotAuthenticated { auth_url: String },

    /// The authorization code could not be traded for a token.
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The refresh token was refused; the session has been cleared.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Remote revocation failed (best effort, never fatal).
    #[error("token revocation failed: {0}")]
    RevokeFailed(String),

    /// Reading or writing the token store failed.
    #[error("token store error: {0}")]
    Persistence(String),

    /// Connection failure or timeout talking to the identity provider.
    #[error("identity provider unreachable: {0}")]
    Network(String),

    /// The identity provider answered with an error status.
    #[error("identity provider rejected the request: {0}")]
    Rejected(String),

    /// The identity provider answered with something unparseable.
    #[error("invalid response from identity provider: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// Creates a not-configured error.
    pub fn not_configured(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotConfigured {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Creates a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::NotConfigured { .. } => AuthErrorKind::Misconfiguration,
            Self::NotAuthenticated { .. } | Self::RefreshFailed(_) => {
                AuthErrorKind::NeedsAuthorization
            }
            Self::TokenExchangeFailed(_) | Self::RevokeFailed(_) | Self::Rejected(_) => {
                AuthErrorKind::Rejected
            }
            Self::InvalidResponse(_) => AuthErrorKind::Rejected,
            Self::Persistence(_) => AuthErrorKind::Storage,
            Self::Network(_) => AuthErrorKind::Transient,
        }
    }

    /// Returns true if the operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Returns the authorization URL carried by a `NotAuthenticated` error.
    pub fn auth_url(&self) -> Option<&str> {
        match self {
            Self::NotAuthenticated { auth_url } => Some(auth_url),
            _ => None,
        }
    }
}

/// A specialized Result type for token lifecycle operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_classification() {
        assert_eq!(
            AuthError::not_configured("/x", "missing").kind(),
            AuthErrorKind::Misconfiguration
        );
        assert_eq!(
            AuthError::NotAuthenticated {
                auth_url: "https://example".into()
            }
            .kind(),
            AuthErrorKind::NeedsAuthorization
        );
        assert_eq!(
            AuthError::RefreshFailed("invalid_grant".into()).kind(),
            AuthErrorKind::NeedsAuthorization
        );
        assert_eq!(AuthError::network("timeout").kind(), AuthErrorKind::Transient);
        assert_eq!(AuthError::persistence("disk full").kind(), AuthErrorKind::Storage);
    }

    #[test]
    fn only_network_errors_are_retryable() {
        assert!(AuthError::network("reset").is_retryable());
        assert!(!AuthError::rejected("invalid_client").is_retryable());
        assert!(!AuthError::TokenExchangeFailed("bad code".into()).is_retryable());
        assert!(!AuthError::RefreshFailed("revoked".into()).is_retryable());
    }

    #[test]
    fn not_authenticated_exposes_url() {
        let err = AuthError::NotAuthenticated {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth?x=1".into(),
        };
        assert_eq!(
            err.auth_url(),
            Some("https://accounts.google.com/o/oauth2/v2/auth?x=1")
        );
        assert!(err.to_string().contains("authorize at https://accounts.google.com"));
        assert!(AuthError::network("x").auth_url().is_none());
    }

    #[test]
    fn not_configured_mentions_location() {
        let err = AuthError::not_configured("/home/me/.config/gcal-mcp/keys.json", "file not found");
        let display = err.to_string();
        assert!(display.contains("/home/me/.config/gcal-mcp/keys.json"));
        assert!(display.contains("file not found"));
    }

    #[test]
    fn kind_display() {
        assert_eq!(AuthErrorKind::NeedsAuthorization.to_string(), "needs_authorization");
        assert_eq!(AuthErrorKind::Transient.as_str(), "transient");
    }
}
