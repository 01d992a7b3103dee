//! Error types for calendar operations.

use gcal_mcp_auth::{AuthError, AuthErrorKind};
use thiserror::Error;

/// An error raised by a calendar operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    /// Acquiring an access token failed. The auth taxonomy is preserved so
    /// callers can surface the authorization URL or credentials location.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The calendar or event does not exist (404/410).
    #[error("not found: {0}")]
    NotFound(String),

    /// The API answered with an error status.
    #[error("Google Calendar API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Connection failure or timeout.
    #[error("network error: {0}")]
    Network(String),

    /// The API answered with something unparseable.
    #[error("invalid response from Google Calendar: {0}")]
    InvalidResponse(String),

    /// The caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CalendarError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Returns true if the operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Auth(err) => err.is_retryable(),
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::NotFound(_) | Self::InvalidResponse(_) | Self::InvalidArgument(_) => false,
        }
    }

    /// Returns true when a human has to (re)authorize.
    pub fn needs_authorization(&self) -> bool {
        match self {
            Self::Auth(err) => err.kind() == AuthErrorKind::NeedsAuthorization,
            Self::Api { status, .. } => *status == 401,
            _ => false,
        }
    }

    /// Returns the authorization URL carried by an auth error.
    pub fn auth_url(&self) -> Option<&str> {
        match self {
            Self::Auth(err) => err.auth_url(),
            _ => None,
        }
    }
}

/// A specialized Result type for calendar operations.
pub type CalendarResult<T> = Result<T, CalendarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_keep_their_url() {
        let err: CalendarError = AuthError::NotAuthenticated {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth?client_id=x".into(),
        }
        .into();
        assert!(err.needs_authorization());
        assert_eq!(
            err.auth_url(),
            Some("https://accounts.google.com/o/oauth2/v2/auth?client_id=x")
        );
        assert!(err.to_string().starts_with("not authenticated"));
    }

    #[test]
    fn retryable_statuses() {
        let api = |status| CalendarError::Api {
            status,
            message: String::new(),
        };
        assert!(api(503).is_retryable());
        assert!(api(429).is_retryable());
        assert!(!api(400).is_retryable());
        assert!(CalendarError::Network("reset".into()).is_retryable());
        assert!(!CalendarError::NotFound("event".into()).is_retryable());
        assert!(CalendarError::from(AuthError::network("timeout")).is_retryable());
    }
}
