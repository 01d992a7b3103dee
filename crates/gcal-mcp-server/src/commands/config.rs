//! Configuration commands.

use std::path::Path;

use crate::config::GcalConfig;
use crate::error::CliResult;
use crate::secret::SecretRef;

const REDACTED: &str = "<redacted>";

/// Dump the effective configuration to stdout.
pub fn dump(config: &GcalConfig, config_path: &Path) -> CliResult<()> {
    let toml_str = redacted(config).to_toml()?;
    println!("# config.toml ({})", config_path.display());
    println!("{}", toml_str);
    Ok(())
}

/// Show where configuration, credentials and tokens live.
pub fn path(config: &GcalConfig, config_path: &Path) -> CliResult<()> {
    println!("config: {}", config_path.display());
    println!("credentials: {}", config.google.credentials_path().display());
    println!("tokens: {}", config.google.token_path().display());
    Ok(())
}

/// Copy of `config` with literal secrets masked. `pass::`/`env::` references are kept.
fn redacted(config: &GcalConfig) -> GcalConfig {
    let mut config = config.clone();
    if let Some(ref mut secret) = config.google.client_secret
        && !SecretRef::parse(secret).is_reference()
    {
        *secret = REDACTED.to_string();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_secrets_are_masked() {
        let config = GcalConfig::parse(
            "[google]\nclient_id = \"id\"\nclient_secret = \"hunter2\"\n",
            Path::new("config.toml"),
        )
        .unwrap();
        let dumped = redacted(&config).to_toml().unwrap();
        assert!(!dumped.contains("hunter2"));
        assert!(dumped.contains("client_secret = \"<redacted>\""));
        assert!(dumped.contains("client_id = \"id\""));
    }

    #[test]
    fn secret_references_are_shown() {
        let config = GcalConfig::parse(
            "[google]\nclient_id = \"id\"\nclient_secret = \"pass::google/calendar\"\n",
            Path::new("config.toml"),
        )
        .unwrap();
        let dumped = redacted(&config).to_toml().unwrap();
        assert!(dumped.contains("pass::google/calendar"));
    }
}
