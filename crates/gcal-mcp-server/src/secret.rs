//! Secret references in configuration values.
//!
//! `client_id` and `client_secret` may point outside `config.toml`:
//! `pass::entry` reads the first line of `pass show entry` and `env::NAME`
//! reads an environment variable. Anything else is taken literally.

/// A configuration value, classified by its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretRef<'a> {
    /// An entry in the `pass` password store.
    Pass(&'a str),
    /// An environment variable.
    Env(&'a str),
    /// A literal value.
    Plain(&'a str),
}

impl<'a> SecretRef<'a> {
    /// Classifies `value` by prefix.
    pub fn parse(value: &'a str) -> Self {
        if let Some(entry) = value.strip_prefix("pass::") {
            Self::Pass(entry.trim())
        } else if let Some(var) = value.strip_prefix("env::") {
            Self::Env(var.trim())
        } else {
            Self::Plain(value)
        }
    }

    /// Returns true when the value lives outside the config file.
    pub fn is_reference(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }

    /// Produces the secret value.
    pub fn resolve(&self) -> Result<String, String> {
        match *self {
            Self::Pass(entry) => resolve_pass(entry),
            Self::Env(var) => resolve_env(var),
            Self::Plain(value) => Ok(value.to_string()),
        }
    }
}

/// Resolves a value that may carry a `pass::` or `env::` prefix.
pub fn resolve(value: &str) -> Result<String, String> {
    SecretRef::parse(value).resolve()
}

fn resolve_pass(entry: &str) -> Result<String, String> {
    if entry.is_empty() {
        return Err("`pass::` reference names no entry".to_string());
    }

    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(entry)
        .output()
        .map_err(|e| format!("failed to run `pass show {}`: {}", entry, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "`pass show {}` failed ({}): {}",
            entry,
            output.status,
            stderr.trim()
        ));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .ok_or_else(|| format!("`pass show {}` produced no output", entry))
}

fn resolve_env(var: &str) -> Result<String, String> {
    if var.is_empty() {
        return Err("`env::` reference names no variable".to_string());
    }
    std::env::var(var).map_err(|_| format!("environment variable `{}` is not set", var))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_prefixes() {
        assert_eq!(SecretRef::parse("pass::google/secret"), SecretRef::Pass("google/secret"));
        assert_eq!(SecretRef::parse("env:: GCAL_ID"), SecretRef::Env("GCAL_ID"));
        assert_eq!(
            SecretRef::parse("123.apps.googleusercontent.com"),
            SecretRef::Plain("123.apps.googleusercontent.com")
        );
        assert!(SecretRef::parse("env::X").is_reference());
        assert!(!SecretRef::parse("literal").is_reference());
    }

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(resolve("GOCSPX-abc").unwrap(), "GOCSPX-abc");
        assert_eq!(resolve("").unwrap(), "");
    }

    #[test]
    fn env_reference_reads_variable() {
        unsafe {
            std::env::set_var("_GCAL_MCP_SECRET_TEST", "from-env");
        }
        assert_eq!(resolve("env::_GCAL_MCP_SECRET_TEST").unwrap(), "from-env");
        unsafe {
            std::env::remove_var("_GCAL_MCP_SECRET_TEST");
        }
    }

    #[test]
    fn missing_env_variable_errors() {
        let err = resolve("env::_GCAL_MCP_SURELY_UNSET_4711").unwrap_err();
        assert!(err.contains("not set"));
        assert!(resolve("env::").unwrap_err().contains("no variable"));
    }

    #[test]
    fn empty_pass_entry_errors() {
        assert!(resolve("pass::").unwrap_err().contains("no entry"));
        assert!(resolve("pass::gcal-mcp/no/such/entry/4711").is_err());
    }
}
