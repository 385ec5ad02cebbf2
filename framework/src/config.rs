use serde::de::DeserializeOwned;

use crate::ErrorKind;

#[derive(Debug, thiserror::Error, ErrorKind)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    #[error_kind(Config)]
    Missing(Vec<String>),

    #[error("invalid configuration: {0}")]
    #[error_kind(Config)]
    Invalid(#[from] config::ConfigError),
}

/// Deserialize a settings struct from environment variables.
///
/// Variable names are matched case-insensitively against field names, so `SMTP_PORT`
/// fills `smtp_port`.
pub trait EnvConfig: Sized {
    fn from_env() -> Result<Self, ConfigError>;
    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError>;
}

impl<D> EnvConfig for D
where
    D: DeserializeOwned,
{
    fn from_env() -> Result<Self, ConfigError> {
        let c = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;
        Ok(c.try_deserialize()?)
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let c = config::Config::builder()
            .add_source(config::Environment::with_prefix(prefix))
            .build()?;
        Ok(c.try_deserialize()?)
    }
}

/// Load `.env` from the working directory (or a parent) if one exists.
///
/// Variables already present in the process environment win.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
}

/// Fail fast unless every listed variable is set to a non-blank value.
///
/// An entry may list alternatives separated by `|` (`"SMTP_PASSWORD|APP_PASSWORD"`);
/// any one of them satisfies it. All unmet entries are reported together.
pub fn require_env(keys: &[&str]) -> Result<(), ConfigError> {
    let missing: Vec<String> = keys
        .iter()
        .filter(|entry| !entry.split('|').any(is_set))
        .map(|entry| entry.replace('|', " or "))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Missing(missing))
    }
}

fn is_set(key: &str) -> bool {
    std::env::var(key)
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false)
}
