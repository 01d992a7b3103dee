//! The token lifecycle manager.
//!
//! [`TokenManager`] owns the in-memory token record and is the only writer of
//! the token store. Every calendar call goes through
//! [`TokenManager::acquire_client`], which refreshes near-expiry tokens with a
//! single-flight guarantee: however many callers arrive while a refresh is
//! running, they all await one spawned task and observe its result.
//!
//! Locking:
//!
//! - `state` is a `std::sync::Mutex` and is never held across an `.await`.
//! - `store_gate` is a `tokio::sync::Mutex` taken around every store write
//!   (load at startup, exchange, refresh, clear), so writes reach the store in
//!   the order they become authoritative in memory.
//! - `generation` is bumped by exchange and clear. A refresh that started
//!   before either discards its result instead of overwriting newer state.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::Shared;
use tracing::{debug, info, warn};

use crate::BoxFuture;
use crate::credentials::{CredentialBundle, CredentialSource};
use crate::error::{AuthError, AuthErrorKind, AuthResult};
use crate::identity::{AuthUrlOptions, CALENDAR_SCOPES, IdentityProvider};
use crate::store::TokenStore;
use crate::token::TokenRecord;

/// Attempts per provider call: the first try plus one retry.
const MAX_PROVIDER_ATTEMPTS: u32 = 2;

type SharedRefresh = Shared<BoxFuture<'static, AuthResult<AccessGrant>>>;

/// Where the session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No credential bundle loaded.
    Unconfigured,
    /// Credentials loaded, no token.
    Unauthenticated,
    /// Token present and outside the refresh window.
    Authenticated,
    /// Token present and inside the refresh window.
    ExpiringSoon,
    /// Token present and past its hard expiry.
    Expired,
}

impl SessionState {
    /// Returns a stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticated => "authenticated",
            Self::ExpiringSoon => "expiring_soon",
            Self::Expired => "expired",
        }
    }

    fn derive(credentials: bool, token: Option<&TokenRecord>, now: DateTime<Utc>) -> Self {
        match (credentials, token) {
            (false, _) => Self::Unconfigured,
            (true, None) => Self::Unauthenticated,
            (true, Some(token)) if token.is_expired_at(now) => Self::Expired,
            (true, Some(token)) if token.needs_refresh_at(now) => Self::ExpiringSoon,
            (true, Some(_)) => Self::Authenticated,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only handle to a usable access token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessGrant {
    access_token: String,
    token_type: String,
    expires_at: DateTime<Utc>,
}

impl AccessGrant {
    fn from_record(record: &TokenRecord) -> Self {
        Self {
            access_token: record.access_token.clone(),
            token_type: record.token_type.clone(),
            expires_at: record.expires_at().unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// The bearer token.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The token type, normally `Bearer`.
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// When the token stops working.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Value for the HTTP `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGrant")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Snapshot returned by [`TokenManager::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStatus {
    /// Current session state.
    pub state: SessionState,
    /// True when a token record is held.
    pub authenticated: bool,
    /// True when the token is inside the refresh window.
    pub needs_refresh: bool,
    /// Token expiry, if a token is held.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes, if a token is held.
    pub scopes: Vec<String>,
    /// Authorization URL, only when credentials are loaded and no token is held.
    pub auth_url: Option<String>,
    /// Where the credential bundle is expected.
    pub credentials_location: String,
}

/// Result of [`TokenManager::clear_tokens`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClearReport {
    /// True when a token was held and removed.
    pub had_token: bool,
    /// True when remote revocation was attempted.
    pub revoke_attempted: bool,
    /// The revocation failure, if any. Never fatal.
    pub revoke_error: Option<AuthError>,
}

/// Timing knobs for provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Upper bound on a single provider call.
    pub provider_timeout: Duration,
    /// Pause before retrying a transient failure.
    pub retry_backoff: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl ManagerSettings {
    /// Sets the provider call timeout.
    #[must_use]
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Sets the retry backoff.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

#[derive(Default)]
struct ManagerState {
    initialized: bool,
    credentials: Option<Arc<CredentialBundle>>,
    token: Option<TokenRecord>,
    generation: u64,
    inflight: Option<SharedRefresh>,
}

struct ManagerInner {
    credentials: Arc<dyn CredentialSource>,
    store: Arc<dyn TokenStore>,
    provider: Arc<dyn IdentityProvider>,
    settings: ManagerSettings,
    state: Mutex<ManagerState>,
    store_gate: tokio::sync::Mutex<()>,
}

/// Process-wide token lifecycle manager.
///
/// Cloning is cheap and every clone shares the same session.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("credentials", &self.inner.credentials.location())
            .field("store", &self.inner.store.describe())
            .field("state", &self.session_state())
            .finish()
    }
}

impl TokenManager {
    /// Creates a manager with default settings.
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        store: Arc<dyn TokenStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self::with_settings(credentials, store, provider, ManagerSettings::default())
    }

    /// Creates a manager with explicit settings.
    pub fn with_settings(
        credentials: Arc<dyn CredentialSource>,
        store: Arc<dyn TokenStore>,
        provider: Arc<dyn IdentityProvider>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                credentials,
                store,
                provider,
                settings,
                state: Mutex::new(ManagerState::default()),
                store_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Loads the credential bundle and any stored token.
    ///
    /// A missing or corrupt token store is not an error: the session simply
    /// starts unauthenticated. Calling this again after success does nothing.
    pub async fn initialize(&self) -> AuthResult<()> {
        if self.inner.lock_state().initialized {
            return Ok(());
        }

        let _gate = self.inner.store_gate.lock().await;
        if self.inner.lock_state().initialized {
            return Ok(());
        }

        let bundle = self.inner.credentials.load().await?;
        let token = match self.inner.store.load().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, store = %self.inner.store.describe(), "ignoring unreadable token store");
                None
            }
        };

        let mut state = self.inner.lock_state();
        state.credentials = Some(Arc::new(bundle));
        state.token = token;
        state.initialized = true;
        let session = SessionState::derive(true, state.token.as_ref(), Utc::now());
        info!(state = %session, "token manager initialized");
        Ok(())
    }

    /// Returns the URL a human visits to grant calendar access.
    pub fn authorization_url(&self) -> AuthResult<String> {
        let bundle = self.inner.bundle()?;
        Ok(self.inner.auth_url_for(&bundle))
    }

    /// Trades a one-time authorization code for a token and persists it.
    pub async fn exchange_authorization_code(&self, code: &str) -> AuthResult<AccessGrant> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::TokenExchangeFailed(
                "authorization code is empty".to_string(),
            ));
        }

        self.initialize().await?;
        let bundle = self.inner.bundle()?;

        let record = self
            .inner
            .with_retry("token exchange", || {
                self.inner.provider.exchange_code(&bundle, code)
            })
            .await
            .map_err(|e| match e.kind() {
                AuthErrorKind::Transient => e,
                _ => AuthError::TokenExchangeFailed(e.to_string()),
            })?;

        if record.access_token.is_empty() {
            return Err(AuthError::TokenExchangeFailed(
                "provider returned no access token".to_string(),
            ));
        }
        if record.refresh_token.is_none() {
            warn!("authorization granted without a refresh token; the session will not survive expiry");
        }

        let _gate = self.inner.store_gate.lock().await;
        if let Err(e) = self.inner.store.save(&record).await {
            warn!(error = %e, "new token could not be persisted; it will be lost on restart");
        }
        let grant = AccessGrant::from_record(&record);
        let mut state = self.inner.lock_state();
        state.token = Some(record);
        state.generation += 1;
        info!(expires_at = %grant.expires_at(), "authorization code exchanged");
        Ok(grant)
    }

    /// Returns a grant backed by a token that is not about to expire.
    ///
    /// Fails with [`AuthError::NotAuthenticated`] (carrying the authorization
    /// URL) when no token is held.
    pub async fn acquire_client(&self) -> AuthResult<AccessGrant> {
        self.initialize().await?;

        let flight = {
            let mut state = self.inner.lock_state();
            let bundle = match state.credentials {
                Some(ref bundle) => Arc::clone(bundle),
                None => return Err(self.inner.not_configured()),
            };
            let token = match state.token {
                Some(ref token) => token.clone(),
                None => {
                    return Err(AuthError::NotAuthenticated {
                        auth_url: self.inner.auth_url_for(&bundle),
                    });
                }
            };
            if !token.needs_refresh_at(Utc::now()) {
                return Ok(AccessGrant::from_record(&token));
            }

            if let Some(flight) = state.inflight.clone() {
                debug!("joining in-flight token refresh");
                flight
            } else {
                let flight = self.spawn_refresh(bundle, token, state.generation);
                state.inflight = Some(flight.clone());
                flight
            }
        };

        flight.await
    }

    /// Returns a snapshot of the session. Never loads, refreshes or writes.
    pub fn status(&self) -> AuthStatus {
        let state = self.inner.lock_state();
        let now = Utc::now();
        let token = state.token.as_ref();
        let auth_url = match (state.credentials.as_ref(), token) {
            (Some(bundle), None) => Some(self.inner.auth_url_for(bundle)),
            _ => None,
        };

        AuthStatus {
            state: SessionState::derive(state.credentials.is_some(), token, now),
            authenticated: token.is_some(),
            needs_refresh: token.is_some_and(|t| t.needs_refresh_at(now)),
            expires_at: token.and_then(TokenRecord::expires_at),
            scopes: token
                .map(|t| t.scopes().into_iter().map(str::to_string).collect())
                .unwrap_or_default(),
            auth_url,
            credentials_location: self.inner.credentials.location(),
        }
    }

    /// Returns the current session state.
    pub fn session_state(&self) -> SessionState {
        let state = self.inner.lock_state();
        SessionState::derive(state.credentials.is_some(), state.token.as_ref(), Utc::now())
    }

    /// Where the credential bundle is expected.
    pub fn credentials_location(&self) -> String {
        self.inner.credentials.location()
    }

    /// Revokes the grant (best effort) and forgets the token.
    ///
    /// Calling this without a token succeeds and does nothing remotely.
    pub async fn clear_tokens(&self) -> AuthResult<ClearReport> {
        if let Err(e) = self.initialize().await {
            debug!(error = %e, "clearing tokens without loaded credentials");
        }

        let (bundle, token) = {
            let state = self.inner.lock_state();
            (state.credentials.clone(), state.token.clone())
        };

        let mut report = ClearReport {
            had_token: token.is_some(),
            ..ClearReport::default()
        };

        if let (Some(bundle), Some(token)) = (bundle, token.as_ref()) {
            report.revoke_attempted = true;
            let revoked = self
                .inner
                .with_retry("token revocation", || {
                    self.inner.provider.revoke(&bundle, token)
                })
                .await;
            if let Err(e) = revoked {
                let err = AuthError::RevokeFailed(e.to_string());
                warn!(error = %err, "continuing with local sign-out");
                report.revoke_error = Some(err);
            }
        }

        let _gate = self.inner.store_gate.lock().await;
        let cleared = self.inner.store.clear().await;
        {
            let mut state = self.inner.lock_state();
            state.token = None;
            state.generation += 1;
        }
        cleared?;
        info!("signed out");
        Ok(report)
    }

    fn spawn_refresh(
        &self,
        bundle: Arc<CredentialBundle>,
        token: TokenRecord,
        generation: u64,
    ) -> SharedRefresh {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = inner.refresh(&bundle, &token, generation).await;
            inner.lock_state().inflight = None;
            result
        });

        let flight: BoxFuture<'static, AuthResult<AccessGrant>> = Box::pin(async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(AuthError::network(format!("refresh task did not complete: {}", e))),
            }
        });
        flight.shared()
    }
}

impl ManagerInner {
    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bundle(&self) -> AuthResult<Arc<CredentialBundle>> {
        let bundle = self.lock_state().credentials.clone();
        bundle.ok_or_else(|| self.not_configured())
    }

    fn not_configured(&self) -> AuthError {
        AuthError::not_configured(
            self.credentials.location(),
            "credentials have not been loaded",
        )
    }

    fn auth_url_for(&self, bundle: &CredentialBundle) -> String {
        self.provider
            .authorization_url(bundle, CALENDAR_SCOPES, &AuthUrlOptions::offline_consent())
    }

    /// Runs a provider call under the timeout, retrying once on transient
    /// failure.
    async fn with_retry<'f, T, F>(&self, operation: &'static str, mut call: F) -> AuthResult<T>
    where
        F: FnMut() -> BoxFuture<'f, AuthResult<T>>,
    {
        let timeout = self.settings.provider_timeout;
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(AuthError::network(format!(
                    "{} timed out after {:?}",
                    operation, timeout
                ))),
            };
            match result {
                Err(e) if e.is_retryable() && attempt < MAX_PROVIDER_ATTEMPTS => {
                    warn!(operation, attempt, error = %e, "transient failure, retrying");
                    tokio::time::sleep(self.settings.retry_backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Body of the spawned refresh task.
    async fn refresh(
        &self,
        bundle: &CredentialBundle,
        token: &TokenRecord,
        generation: u64,
    ) -> AuthResult<AccessGrant> {
        if token.refresh_token.is_none() {
            let err = AuthError::RefreshFailed(
                "no refresh token stored; authorize again".to_string(),
            );
            warn!(error = %err, "dropping token that cannot be refreshed");
            self.discard(generation).await;
            return Err(err);
        }

        info!("refreshing access token");
        let refreshed = self
            .with_retry("token refresh", || self.provider.refresh(bundle, token))
            .await;

        match refreshed {
            Ok(fresh) => {
                let merged = token.merge_refresh(fresh);
                self.commit_refresh(merged, generation).await
            }
            Err(AuthError::Rejected(reason)) => {
                let err = AuthError::RefreshFailed(reason);
                warn!(error = %err, "refresh refused, clearing session");
                self.discard(generation).await;
                Err(err)
            }
            Err(e) => {
                if token.is_expired_at(Utc::now()) {
                    return Err(e);
                }
                warn!(error = %e, "refresh failed, using current token until it expires");
                Ok(AccessGrant::from_record(token))
            }
        }
    }

    async fn commit_refresh(&self, record: TokenRecord, generation: u64) -> AuthResult<AccessGrant> {
        let _gate = self.store_gate.lock().await;
        let current = self.lock_state().generation;
        if current != generation {
            debug!("session changed during refresh, discarding refreshed token");
            return self.current_grant();
        }

        if let Err(e) = self.store.save(&record).await {
            warn!(error = %e, "refreshed token could not be persisted; continuing with in-memory token");
        }

        let grant = AccessGrant::from_record(&record);
        self.lock_state().token = Some(record);
        info!(expires_at = %grant.expires_at(), "access token refreshed");
        Ok(grant)
    }

    /// Forgets the token in memory and in the store, unless the session
    /// changed since `generation`.
    async fn discard(&self, generation: u64) {
        let _gate = self.store_gate.lock().await;
        let current = self.lock_state().generation;
        if current != generation {
            return;
        }
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "stale token could not be removed from the store");
        }
        let mut state = self.lock_state();
        state.token = None;
        state.generation += 1;
    }

    fn current_grant(&self) -> AuthResult<AccessGrant> {
        let state = self.lock_state();
        match (state.token.as_ref(), state.credentials.as_ref()) {
            (Some(token), _) => Ok(AccessGrant::from_record(token)),
            (None, Some(bundle)) => Err(AuthError::NotAuthenticated {
                auth_url: self.auth_url_for(bundle),
            }),
            (None, None) => Err(self.not_configured()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::credentials::StaticCredentialSource;
    use crate::store::{FileTokenStore, MemoryTokenStore};

    #[derive(Default)]
    struct MockProvider {
        refresh_calls: AtomicUsize,
        exchange_calls: AtomicUsize,
        revoke_calls: AtomicUsize,
        refresh_delay: Duration,
        refresh_failures: Mutex<VecDeque<AuthError>>,
        reissue_refresh_token: bool,
        revoke_fails: bool,
    }

    impl MockProvider {
        fn failing_refresh(errors: impl IntoIterator<Item = AuthError>) -> Self {
            Self {
                refresh_failures: Mutex::new(errors.into_iter().collect()),
                ..Self::default()
            }
        }

        fn refreshes(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }
    }

    fn fresh_record(access: &str, refresh: Option<&str>, lifetime: ChronoDuration) -> TokenRecord {
        TokenRecord {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            scope: CALENDAR_SCOPES.join(" "),
            token_type: "Bearer".to_string(),
            expiry_date: (Utc::now() + lifetime).timestamp_millis(),
        }
    }

    impl IdentityProvider for MockProvider {
        fn exchange_code<'a>(
            &'a self,
            _bundle: &'a CredentialBundle,
            code: &'a str,
        ) -> BoxFuture<'a, AuthResult<TokenRecord>> {
            Box::pin(async move {
                self.exchange_calls.fetch_add(1, Ordering::SeqCst);
                match code {
                    "validcode" => Ok(fresh_record(
                        "exchanged-access",
                        Some("exchanged-refresh"),
                        ChronoDuration::hours(1),
                    )),
                    _ => Err(AuthError::rejected("invalid_grant: Malformed auth code.")),
                }
            })
        }

        fn refresh<'a>(
            &'a self,
            _bundle: &'a CredentialBundle,
            _record: &'a TokenRecord,
        ) -> BoxFuture<'a, AuthResult<TokenRecord>> {
            Box::pin(async move {
                let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
                if !self.refresh_delay.is_zero() {
                    tokio::time::sleep(self.refresh_delay).await;
                }
                let failure = self
                    .refresh_failures
                    .lock()
                    .unwrap()
                    .pop_front();
                if let Some(err) = failure {
                    return Err(err);
                }
                let refresh = self.reissue_refresh_token.then_some("rotated-refresh");
                let mut record =
                    fresh_record(&format!("refreshed-{call}"), refresh, ChronoDuration::hours(1));
                record.scope = String::new();
                Ok(record)
            })
        }

        fn revoke<'a>(
            &'a self,
            _bundle: &'a CredentialBundle,
            _record: &'a TokenRecord,
        ) -> BoxFuture<'a, AuthResult<()>> {
            Box::pin(async move {
                self.revoke_calls.fetch_add(1, Ordering::SeqCst);
                if self.revoke_fails {
                    Err(AuthError::rejected("invalid_token"))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn credentials() -> Arc<StaticCredentialSource> {
        Arc::new(StaticCredentialSource::new(
            CredentialBundle::new("client", "secret"),
            "test credentials",
        ))
    }

    fn manager(provider: &Arc<MockProvider>, store: &Arc<MemoryTokenStore>) -> TokenManager {
        TokenManager::with_settings(
            credentials(),
            Arc::clone(store) as Arc<dyn TokenStore>,
            Arc::clone(provider) as Arc<dyn IdentityProvider>,
            ManagerSettings::default()
                .with_retry_backoff(Duration::from_millis(5))
                .with_provider_timeout(Duration::from_secs(5)),
        )
    }

    fn stored(lifetime: ChronoDuration) -> Arc<MemoryTokenStore> {
        Arc::new(MemoryTokenStore::with_record(fresh_record(
            "original-access",
            Some("original-refresh"),
            lifetime,
        )))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquires_share_one_refresh() {
        let provider = Arc::new(MockProvider {
            refresh_delay: Duration::from_millis(100),
            ..MockProvider::default()
        });
        let store = stored(ChronoDuration::minutes(4));
        let manager = manager(&provider, &store);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.acquire_client().await })
            })
            .collect();

        for handle in handles {
            let grant = handle.await.unwrap().unwrap();
            assert_eq!(grant.access_token(), "refreshed-1");
        }
        assert_eq!(provider.refreshes(), 1);
        assert_eq!(store.save_count(), 1);
        assert_eq!(manager.session_state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn refresh_keeps_previous_refresh_token() {
        let provider = Arc::new(MockProvider::default());
        let store = stored(ChronoDuration::minutes(1));
        let manager = manager(&provider, &store);

        manager.acquire_client().await.unwrap();

        let saved = store.snapshot().unwrap();
        assert_eq!(saved.access_token, "refreshed-1");
        assert_eq!(saved.refresh_token.as_deref(), Some("original-refresh"));
        assert_eq!(saved.scope, CALENDAR_SCOPES.join(" "));
    }

    #[tokio::test]
    async fn refresh_adopts_rotated_refresh_token() {
        let provider = Arc::new(MockProvider {
            reissue_refresh_token: true,
            ..MockProvider::default()
        });
        let store = stored(ChronoDuration::minutes(1));
        let manager = manager(&provider, &store);

        manager.acquire_client().await.unwrap();
        assert_eq!(
            store.snapshot().unwrap().refresh_token.as_deref(),
            Some("rotated-refresh")
        );
    }

    #[tokio::test]
    async fn status_never_mutates() {
        let provider = Arc::new(MockProvider::default());
        let store = stored(ChronoDuration::minutes(4));
        let manager = manager(&provider, &store);

        let before_init = manager.status();
        assert_eq!(before_init.state, SessionState::Unconfigured);
        assert!(!before_init.authenticated);
        assert!(before_init.auth_url.is_none());

        manager.initialize().await.unwrap();
        for _ in 0..10 {
            let status = manager.status();
            assert!(status.authenticated);
            assert!(status.needs_refresh);
            assert_eq!(status.state, SessionState::ExpiringSoon);
            assert!(status.auth_url.is_none());
        }
        assert_eq!(provider.refreshes(), 0);
        assert_eq!(provider.exchange_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.save_count(), 0);
        assert_eq!(store.clear_count(), 0);
    }

    #[tokio::test]
    async fn acquire_after_clear_is_not_authenticated() {
        let provider = Arc::new(MockProvider::default());
        let store = stored(ChronoDuration::hours(1));
        let manager = manager(&provider, &store);
        manager.acquire_client().await.unwrap();

        let report = manager.clear_tokens().await.unwrap();
        assert!(report.had_token);
        assert!(report.revoke_attempted);
        assert!(report.revoke_error.is_none());
        assert_eq!(provider.revoke_calls.load(Ordering::SeqCst), 1);
        assert!(store.snapshot().is_none());

        let err = manager.acquire_client().await.unwrap_err();
        let url = err.auth_url().expect("NotAuthenticated carries a URL");
        assert!(!url.is_empty());
        assert!(url.contains("client_id=client"));
        assert_eq!(manager.session_state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn four_minutes_left_triggers_one_refresh() {
        let provider = Arc::new(MockProvider::default());
        let store = stored(ChronoDuration::minutes(4));
        let manager = manager(&provider, &store);

        let grant = manager.acquire_client().await.unwrap();
        assert_eq!(grant.access_token(), "refreshed-1");
        assert_eq!(provider.refreshes(), 1);

        manager.acquire_client().await.unwrap();
        assert_eq!(provider.refreshes(), 1);
    }

    #[tokio::test]
    async fn ten_minutes_left_needs_no_refresh() {
        let provider = Arc::new(MockProvider::default());
        let store = stored(ChronoDuration::minutes(10));
        let manager = manager(&provider, &store);

        let grant = manager.acquire_client().await.unwrap();
        assert_eq!(grant.access_token(), "original-access");
        assert_eq!(grant.authorization_header(), "Bearer original-access");
        assert_eq!(provider.refreshes(), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn refused_refresh_clears_session() {
        let provider = Arc::new(MockProvider::failing_refresh([AuthError::rejected(
            "invalid_grant: Token has been expired or revoked.",
        )]));
        let store = stored(ChronoDuration::minutes(2));
        let manager = manager(&provider, &store);

        let err = manager.acquire_client().await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed(_)));
        assert_eq!(err.kind(), AuthErrorKind::NeedsAuthorization);
        assert_eq!(provider.refreshes(), 1);
        assert_eq!(manager.session_state(), SessionState::Unauthenticated);
        assert!(store.snapshot().is_none());

        let err = manager.acquire_client().await.unwrap_err();
        assert!(err.auth_url().is_some());
        assert_eq!(provider.refreshes(), 1);
    }

    #[tokio::test]
    async fn exchange_then_acquire_without_refresh() {
        let provider = Arc::new(MockProvider::default());
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager(&provider, &store);

        manager.initialize().await.unwrap();
        assert_eq!(manager.session_state(), SessionState::Unauthenticated);
        assert!(manager.status().auth_url.is_some());

        let grant = manager.exchange_authorization_code("validcode").await.unwrap();
        assert_eq!(manager.session_state(), SessionState::Authenticated);
        let saved = store.snapshot().unwrap();
        assert_eq!(saved.access_token, "exchanged-access");
        assert_eq!(saved.expires_at(), Some(grant.expires_at()));

        let acquired = manager.acquire_client().await.unwrap();
        assert_eq!(acquired.access_token(), "exchanged-access");
        assert_eq!(provider.refreshes(), 0);
    }

    #[tokio::test]
    async fn transient_refresh_failure_is_retried_once() {
        let provider = Arc::new(MockProvider::failing_refresh([AuthError::network(
            "connection reset",
        )]));
        let store = stored(ChronoDuration::minutes(1));
        let manager = manager(&provider, &store);

        let grant = manager.acquire_client().await.unwrap();
        assert_eq!(grant.access_token(), "refreshed-2");
        assert_eq!(provider.refreshes(), 2);
    }

    #[tokio::test]
    async fn transient_failure_falls_back_to_unexpired_token() {
        let provider = Arc::new(MockProvider::failing_refresh([
            AuthError::network("timeout"),
            AuthError::network("timeout"),
        ]));
        let store = stored(ChronoDuration::minutes(3));
        let manager = manager(&provider, &store);

        let grant = manager.acquire_client().await.unwrap();
        assert_eq!(grant.access_token(), "original-access");
        assert_eq!(provider.refreshes(), 2);
        assert_eq!(manager.session_state(), SessionState::ExpiringSoon);
        assert!(store.snapshot().is_some());
    }

    #[tokio::test]
    async fn transient_failure_with_expired_token_surfaces() {
        let provider = Arc::new(MockProvider::failing_refresh([
            AuthError::network("timeout"),
            AuthError::network("timeout"),
        ]));
        let store = stored(ChronoDuration::minutes(-1));
        let manager = manager(&provider, &store);

        let err = manager.acquire_client().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(manager.session_state(), SessionState::Expired);
    }

    #[tokio::test]
    async fn garbled_refresh_response_keeps_session() {
        let provider = Arc::new(MockProvider::failing_refresh([AuthError::invalid_response(
            "invalid token response: expected value at line 1 column 1",
        )]));
        let store = stored(ChronoDuration::minutes(3));
        let manager = manager(&provider, &store);

        let grant = manager.acquire_client().await.unwrap();
        assert_eq!(grant.access_token(), "original-access");
        assert_eq!(provider.refreshes(), 1);
        assert_eq!(manager.session_state(), SessionState::ExpiringSoon);
        assert_eq!(store.snapshot().unwrap().refresh_token.as_deref(), Some("original-refresh"));
    }

    #[tokio::test]
    async fn garbled_refresh_response_with_expired_token_surfaces() {
        let provider = Arc::new(MockProvider::failing_refresh([AuthError::invalid_response(
            "token response has no access_token",
        )]));
        let store = stored(ChronoDuration::minutes(-1));
        let manager = manager(&provider, &store);

        let err = manager.acquire_client().await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)));
        assert_eq!(manager.session_state(), SessionState::Expired);
        assert!(store.snapshot().is_some());

        let grant = manager.acquire_client().await.unwrap();
        assert_eq!(grant.access_token(), "refreshed-2");
    }

    #[tokio::test]
    async fn unpersisted_refresh_still_updates_memory() {
        let provider = Arc::new(MockProvider::default());
        let store = stored(ChronoDuration::minutes(1));
        store.fail_saves(true);
        let manager = manager(&provider, &store);

        let grant = manager.acquire_client().await.unwrap();
        assert_eq!(grant.access_token(), "refreshed-1");
        assert_eq!(store.snapshot().unwrap().access_token, "original-access");

        manager.acquire_client().await.unwrap();
        assert_eq!(provider.refreshes(), 1);
    }

    #[tokio::test]
    async fn token_without_refresh_token_is_dropped() {
        let provider = Arc::new(MockProvider::default());
        let store = Arc::new(MemoryTokenStore::with_record(fresh_record(
            "short-lived",
            None,
            ChronoDuration::minutes(2),
        )));
        let manager = manager(&provider, &store);

        let err = manager.acquire_client().await.unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed(_)));
        assert_eq!(provider.refreshes(), 0);
        assert!(store.snapshot().is_none());
    }

    #[tokio::test]
    async fn missing_credentials_are_not_configured() {
        let store = Arc::new(MemoryTokenStore::new());
        let manager = TokenManager::new(
            Arc::new(StaticCredentialSource::missing("/etc/gcal/keys.json")),
            store,
            Arc::new(MockProvider::default()),
        );

        let err = manager.acquire_client().await.unwrap_err();
        match err {
            AuthError::NotConfigured { ref location, .. } => {
                assert_eq!(location, "/etc/gcal/keys.json")
            }
            ref other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.kind(), AuthErrorKind::Misconfiguration);
        assert_eq!(manager.session_state(), SessionState::Unconfigured);
        assert!(matches!(
            manager.authorization_url(),
            Err(AuthError::NotConfigured { .. })
        ));
    }

    #[tokio::test]
    async fn corrupt_store_starts_unauthenticated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "{\"access_token\": ").unwrap();

        let manager = TokenManager::new(
            credentials(),
            Arc::new(FileTokenStore::new(&path)),
            Arc::new(MockProvider::default()),
        );
        manager.initialize().await.unwrap();
        assert_eq!(manager.session_state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let provider = Arc::new(MockProvider::default());
        let store = stored(ChronoDuration::hours(1));
        let manager = manager(&provider, &store);

        manager.initialize().await.unwrap();
        store.clear().await.unwrap();
        manager.initialize().await.unwrap();
        assert_eq!(manager.session_state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn blank_code_never_reaches_provider() {
        let provider = Arc::new(MockProvider::default());
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager(&provider, &store);

        let err = manager.exchange_authorization_code("   ").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExchangeFailed(_)));
        assert_eq!(provider.exchange_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_code_is_exchange_failure() {
        let provider = Arc::new(MockProvider::default());
        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager(&provider, &store);

        let err = manager.exchange_authorization_code("stale").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExchangeFailed(_)));
        assert_eq!(provider.exchange_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.save_count(), 0);
        assert_eq!(manager.session_state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn failed_revoke_still_signs_out() {
        let provider = Arc::new(MockProvider {
            revoke_fails: true,
            ..MockProvider::default()
        });
        let store = stored(ChronoDuration::hours(1));
        let manager = manager(&provider, &store);

        let report = manager.clear_tokens().await.unwrap();
        assert!(matches!(report.revoke_error, Some(AuthError::RevokeFailed(_))));
        assert_eq!(provider.revoke_calls.load(Ordering::SeqCst), 1);
        assert!(store.snapshot().is_none());

        let again = manager.clear_tokens().await.unwrap();
        assert!(!again.had_token);
        assert!(!again.revoke_attempted);
        assert_eq!(provider.revoke_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn exchange_during_refresh_wins() {
        let provider = Arc::new(MockProvider {
            refresh_delay: Duration::from_millis(150),
            ..MockProvider::default()
        });
        let store = stored(ChronoDuration::minutes(2));
        let manager = manager(&provider, &store);
        manager.initialize().await.unwrap();

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire_client().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.exchange_authorization_code("validcode").await.unwrap();

        let grant = pending.await.unwrap().unwrap();
        assert_eq!(grant.access_token(), "exchanged-access");
        assert_eq!(store.snapshot().unwrap().access_token, "exchanged-access");
        assert_eq!(
            manager.acquire_client().await.unwrap().access_token(),
            "exchanged-access"
        );
    }

    #[test]
    fn grant_debug_redacts_token() {
        let grant = AccessGrant::from_record(&fresh_record("secret-token", None, ChronoDuration::hours(1)));
        let debug = format!("{grant:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }
}
