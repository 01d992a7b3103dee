//! Configuration.
//!
//! Everything lives in one `config.toml`, by default at
//! `~/.config/gcal-mcp/config.toml`. Every field has a default, so an
//! absent file is the same as an empty one.
//!
//! `client_id` and `client_secret` accept secret references
//! (`pass::entry`, `env::NAME`, see [`crate::secret`]). When both are set
//! they take precedence over `credentials_file`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use gcal_mcp_auth::{
    CredentialBundle, CredentialSource, FileCredentialSource, FileTokenStore,
    StaticCredentialSource,
};
use gcal_mcp_calendar::DEFAULT_CALENDAR;
use gcal_mcp_core::{TracingConfig, TracingOutputFormat};
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::error::{ConfigError, ConfigResult};
use crate::secret;

/// Environment variable naming the credentials JSON file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_OAUTH_CREDENTIALS";

/// Environment variable naming the token file.
pub const TOKEN_PATH_ENV: &str = "GCAL_MCP_TOKEN_PATH";

const APP_DIR: &str = "gcal-mcp";
const CREDENTIALS_FILE_NAME: &str = "gcp-oauth.keys.json";
const TOKEN_FILE_NAME: &str = "tokens.json";

/// Top-level `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GcalConfig {
    /// Google OAuth and Calendar settings.
    pub google: GoogleSettings,

    /// Log output settings.
    pub logging: LoggingSettings,
}

/// The `[google]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// Google Cloud Console credentials JSON.
    pub credentials_file: Option<PathBuf>,

    /// OAuth client ID (supports `pass::` and `env::`).
    pub client_id: Option<String>,

    /// OAuth client secret (supports `pass::` and `env::`).
    pub client_secret: Option<String>,

    /// Redirect target registered with the OAuth client.
    pub redirect_uri: Option<String>,

    /// Where the token record is persisted.
    pub token_path: Option<PathBuf>,

    /// Calendar used when a tool call names none.
    pub default_calendar: String,

    /// Timeout for each Google request, in seconds.
    pub timeout_secs: u64,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            credentials_file: None,
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            token_path: None,
            default_calendar: DEFAULT_CALENDAR.to_string(),
            timeout_secs: 30,
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `pretty`, `compact` or `json`.
    pub format: String,

    /// Default level when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: "compact".to_string(),
            level: "info".to_string(),
        }
    }
}

impl LoggingSettings {
    /// Applies these settings on top of a tracing preset.
    pub fn apply(&self, base: TracingConfig) -> ConfigResult<TracingConfig> {
        let format = TracingOutputFormat::from_str(&self.format)
            .map_err(|e| ConfigError::invalid("logging.format", e.to_string()))?;
        let level = Level::from_str(self.level.trim())
            .map_err(|e| ConfigError::invalid("logging.level", e.to_string()))?;
        Ok(base.with_format(format).with_level(level))
    }
}

impl GcalConfig {
    /// Loads `path`, treating a missing file as defaults.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&content, path)
    }

    /// Parses TOML text; `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Applies `GOOGLE_OAUTH_CREDENTIALS` and `GCAL_MCP_TOKEN_PATH`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(path) = set(CREDENTIALS_ENV) {
            self.google.credentials_file = Some(PathBuf::from(path));
        }
        if let Some(path) = set(TOKEN_PATH_ENV) {
            self.google.token_path = Some(PathBuf::from(path));
        }
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Returns the default data directory.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Serializes the effective configuration.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::invalid("config", e.to_string()))
    }
}

impl GoogleSettings {
    /// Request timeout for Google endpoints.
    pub fn timeout(&self) -> ConfigResult<Duration> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid("google.timeout_secs", "must be positive"));
        }
        Ok(Duration::from_secs(self.timeout_secs))
    }

    /// Path of the credentials JSON file.
    pub fn credentials_path(&self) -> PathBuf {
        match self.credentials_file {
            Some(ref path) => expand_home(path),
            None => GcalConfig::default_config_dir().join(CREDENTIALS_FILE_NAME),
        }
    }

    /// Path of the token file.
    pub fn token_path(&self) -> PathBuf {
        match self.token_path {
            Some(ref path) => expand_home(path),
            None => GcalConfig::default_data_dir().join(TOKEN_FILE_NAME),
        }
    }

    /// The token store backing the token manager.
    pub fn token_store(&self) -> FileTokenStore {
        FileTokenStore::new(self.token_path())
    }

    /// Builds the credential source.
    ///
    /// Inline `client_id`/`client_secret` win over the credentials file.
    /// Setting only one of them is an error.
    pub fn credential_source(&self, config_path: &Path) -> ConfigResult<Arc<dyn CredentialSource>> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) => {
                let bundle = self.inline_bundle(id, secret)?;
                let location = format!("[google] client_id/client_secret in {}", config_path.display());
                Ok(Arc::new(StaticCredentialSource::new(bundle, location)))
            }
            (Some(_), None) => Err(ConfigError::invalid(
                "google.client_secret",
                "client_id is set but client_secret is missing",
            )),
            (None, Some(_)) => Err(ConfigError::invalid(
                "google.client_id",
                "client_secret is set but client_id is missing",
            )),
            (None, None) => {
                let mut source = FileCredentialSource::new(self.credentials_path());
                if let Some(ref redirect) = self.redirect_uri {
                    source = source.with_redirect_uri(redirect);
                }
                Ok(Arc::new(source))
            }
        }
    }

    fn inline_bundle(&self, raw_id: &str, raw_secret: &str) -> ConfigResult<CredentialBundle> {
        let client_id = secret::resolve(raw_id).map_err(|message| ConfigError::Secret {
            field: "google.client_id",
            message,
        })?;
        let client_secret = secret::resolve(raw_secret).map_err(|message| ConfigError::Secret {
            field: "google.client_secret",
            message,
        })?;

        let mut bundle = CredentialBundle::new(client_id, client_secret);
        if let Some(ref redirect) = self.redirect_uri {
            bundle = bundle.with_redirect_uri(redirect);
        }
        Ok(bundle)
    }
}

/// Expands a leading `~/` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
