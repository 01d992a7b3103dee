//! The persisted OAuth token record.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Lead time, in seconds, before hard expiry at which a token is
/// proactively refreshed.
pub const REFRESH_WINDOW_SECS: i64 = 5 * 60;

/// The refresh safety window as a duration.
pub fn refresh_window() -> Duration {
    Duration::seconds(REFRESH_WINDOW_SECS)
}

/// The access/refresh token pair plus metadata.
///
/// Field names match the JSON written by Google's own client libraries so
/// stores written by earlier runs, or by other tools, load unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Bearer token for API requests.
    pub access_token: String,

    /// Long-lived token for obtaining new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Granted scopes, space separated.
    #[serde(default)]
    pub scope: String,

    /// Token type, normally `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Absolute expiry in epoch milliseconds.
    pub expiry_date: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenRecord {
    /// Builds a record from a token endpoint response received at `now`.
    ///
    /// A negative lifetime counts as already expired. Returns `None` when
    /// the expiry cannot be represented.
    pub fn from_grant(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        scope: impl Into<String>,
        token_type: Option<String>,
        expires_in_secs: i64,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let lifetime = Duration::try_seconds(expires_in_secs.max(0))?;
        let expires_at = now.checked_add_signed(lifetime)?;
        Some(Self {
            access_token: access_token.into(),
            refresh_token,
            scope: scope.into(),
            token_type: token_type.unwrap_or_else(default_token_type),
            expiry_date: expires_at.timestamp_millis(),
        })
    }

    /// Returns the expiry as a timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.expiry_date).single()
    }

    /// Returns true once the hard expiry has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() >= self.expiry_date
    }

    /// Returns true when the token is inside the refresh window.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        (now + refresh_window()).timestamp_millis() >= self.expiry_date
    }

    /// Returns the granted scopes as a list.
    pub fn scopes(&self) -> Vec<&str> {
        self.scope.split_whitespace().collect()
    }

    /// Applies a refresh response on top of this record.
    ///
    /// Google does not always reissue the refresh token; when the response
    /// lacks one the previous token is kept. An empty scope in the
    /// response keeps the previous scope too.
    pub fn merge_refresh(&self, refreshed: TokenRecord) -> TokenRecord {
        TokenRecord {
            refresh_token: refreshed.refresh_token.or_else(|| self.refresh_token.clone()),
            scope: if refreshed.scope.is_empty() {
                self.scope.clone()
            } else {
                refreshed.scope
            },
            ..refreshed
        }
    }
}
