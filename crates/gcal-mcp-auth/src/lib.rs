//! OAuth2 token lifecycle for Google Calendar.
//!
//! The [`TokenManager`] is constructed once per process from three
//! collaborators:
//!
//! - a [`CredentialSource`] supplying the client id and secret,
//! - a [`TokenStore`] persisting the [`TokenRecord`] between runs,
//! - an [`IdentityProvider`] talking to the OAuth endpoints.
//!
//! Consumers call [`TokenManager::acquire_client`] before every API request
//! and receive an [`AccessGrant`]; refreshes happen behind that call.

use std::future::Future;
use std::pin::Pin;

pub mod credentials;
pub mod error;
pub mod google;
pub mod identity;
pub mod manager;
pub mod store;
pub mod token;

pub use credentials::{CredentialBundle, CredentialSource, FileCredentialSource, StaticCredentialSource};
pub use error::{AuthError, AuthErrorKind, AuthResult};
pub use google::GoogleIdentityProvider;
pub use identity::{AuthUrlOptions, CALENDAR_SCOPES, IdentityProvider};
pub use manager::{AccessGrant, AuthStatus, ClearReport, ManagerSettings, SessionState, TokenManager};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use token::{REFRESH_WINDOW_SECS, TokenRecord};

/// A boxed future that is `Send`, used for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
