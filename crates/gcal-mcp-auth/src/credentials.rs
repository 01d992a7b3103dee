//! OAuth client credentials and where they come from.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::BoxFuture;

/// Google's authorization endpoint.
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google's token endpoint.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Redirect target used when the credentials file lists none.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// Client identity issued by the identity provider.
///
/// Loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    /// The OAuth 2.0 client ID.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
    /// Authorization endpoint.
    pub auth_uri: String,
    /// Token endpoint.
    pub token_uri: String,
    /// Redirect target registered for this client.
    pub redirect_uri: String,
}

impl CredentialBundle {
    /// Creates a bundle for Google's endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_uri: GOOGLE_AUTH_URI.to_string(),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        }
    }

    /// Sets the redirect target.
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    /// Sets both endpoints (used to point tests at a local server).
    pub fn with_endpoints(mut self, auth_uri: impl Into<String>, token_uri: impl Into<String>) -> Self {
        self.auth_uri = auth_uri.into();
        self.token_uri = token_uri.into();
        self
    }

    /// Parses a Google credentials JSON document.
    ///
    /// Accepts the Cloud Console layouts (`{"installed": {...}}` or
    /// `{"web": {...}}`) and the flat `{"client_id", "client_secret"}`
    /// layout written by gcloud.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: CredentialsFile = serde_json::from_str(json)
            .map_err(|e| format!("failed to parse credentials JSON: {}", e))?;

        let section = match (file.installed, file.web) {
            (Some(section), _) | (None, Some(section)) => section,
            (None, None) => match (file.client_id, file.client_secret) {
                (Some(client_id), Some(client_secret)) => CredentialsSection {
                    client_id,
                    client_secret,
                    auth_uri: None,
                    token_uri: None,
                    redirect_uris: file.redirect_uris,
                },
                _ => {
                    return Err("credentials must contain an 'installed'/'web' section or \
                                'client_id'/'client_secret' at the root"
                        .to_string());
                }
            },
        };

        let mut bundle = Self::new(section.client_id, section.client_secret);
        if let Some(auth_uri) = section.auth_uri {
            bundle.auth_uri = auth_uri;
        }
        if let Some(token_uri) = section.token_uri {
            bundle.token_uri = token_uri;
        }
        if let Some(redirect) = section.redirect_uris.into_iter().next() {
            bundle.redirect_uri = redirect;
        }
        bundle.validate()?;
        Ok(bundle)
    }

    /// Checks that the bundle is usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.trim().is_empty() {
            return Err("client_id is empty".to_string());
        }
        if self.client_secret.trim().is_empty() {
            return Err("client_secret is empty".to_string());
        }
        for (name, value) in [
            ("auth_uri", &self.auth_uri),
            ("token_uri", &self.token_uri),
            ("redirect_uri", &self.redirect_uri),
        ] {
            url::Url::parse(value).map_err(|e| format!("{} {:?} is not a URL: {}", name, value, e))?;
        }
        Ok(())
    }
}

/// Layout of a Google OAuth credentials file.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<CredentialsSection>,
    web: Option<CredentialsSection>,
    client_id: Option<String>,
    client_secret: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialsSection {
    client_id: String,
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

/// Where the credential bundle is loaded from.
pub trait CredentialSource: Send + Sync {
    /// Loads the bundle, failing with [`AuthError::NotConfigured`] when it
    /// is absent or malformed.
    fn load(&self) -> BoxFuture<'_, AuthResult<CredentialBundle>>;

    /// Human-readable location, shown when configuration is missing.
    fn location(&self) -> String;
}

/// Reads a Google credentials JSON file.
#[derive(Debug, Clone)]
pub struct FileCredentialSource {
    path: PathBuf,
    redirect_override: Option<String>,
}

impl FileCredentialSource {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            redirect_override: None,
        }
    }

    /// Overrides the redirect target found in the file.
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_override = Some(redirect_uri.into());
        self
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialSource for FileCredentialSource {
    fn load(&self) -> BoxFuture<'_, AuthResult<CredentialBundle>> {
        Box::pin(async move {
            let location = self.location();
            let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
                AuthError::not_configured(&location, format!("cannot read credentials file: {}", e))
            })?;
            let mut bundle = CredentialBundle::from_json(&content)
                .map_err(|e| AuthError::not_configured(&location, e))?;
            if let Some(ref redirect) = self.redirect_override {
                bundle.redirect_uri = redirect.clone();
            }
            debug!("loaded OAuth credentials from {}", location);
            Ok(bundle)
        })
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// A bundle supplied directly (config values, environment, tests).
#[derive(Debug, Clone)]
pub struct StaticCredentialSource {
    bundle: Option<CredentialBundle>,
    location: String,
}

impl StaticCredentialSource {
    /// Wraps an already resolved bundle.
    pub fn new(bundle: CredentialBundle, location: impl Into<String>) -> Self {
        Self {
            bundle: Some(bundle),
            location: location.into(),
        }
    }

    /// A source that never has credentials.
    pub fn missing(location: impl Into<String>) -> Self {
        Self {
            bundle: None,
            location: location.into(),
        }
    }
}

impl CredentialSource for StaticCredentialSource {
    fn load(&self) -> BoxFuture<'_, AuthResult<CredentialBundle>> {
        let result = match self.bundle {
            Some(ref bundle) => bundle
                .validate()
                .map(|()| bundle.clone())
                .map_err(|e| AuthError::not_configured(&self.location, e)),
            None => Err(AuthError::not_configured(&self.location, "no client credentials provided")),
        };
        Box::pin(async move { result })
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}
