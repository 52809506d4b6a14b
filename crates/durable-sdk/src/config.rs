//! Shared environment-variable configuration helpers.
//!
//! Grounded on `EncryptionService::from_env` and the worker binary's
//! `DATABASE_URL`-from-environment bootstrap in the reference corpus: each
//! options type gets a `from_env` constructor that loads a `.env` file if
//! present, reads its required fields, and reports exactly which field was
//! missing rather than panicking.

use std::env::VarError;

/// A field was required by an options type's `from_env` constructor but
/// absent from both explicit construction and the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("environment variable {0} is not valid unicode")]
    NotUnicode(&'static str),

    #[error("environment variable {name} could not be parsed: {source}")]
    Parse {
        name: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Load a `.env` file if one is present; ignored if absent, matching
/// `dotenvy::dotenv().ok()` usage elsewhere in the corpus. Call once at
/// process start before any `from_env` constructor runs.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Read a required environment variable.
pub fn required_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|e| match e {
        VarError::NotPresent => ConfigError::MissingVar(name),
        VarError::NotUnicode(_) => ConfigError::NotUnicode(name),
    })
}

/// Read an optional environment variable.
pub fn optional_var(name: &'static str) -> Option<String> {
    std::env::var(name).ok()
}

/// Read an optional environment variable and parse it, surfacing parse
/// failures as [`ConfigError::Parse`].
pub fn optional_parsed<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::Parse { name, source: Box::new(e) }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_var_is_reported_by_name() {
        let err = required_var("DURABLE_SDK_TEST_DOES_NOT_EXIST").unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("DURABLE_SDK_TEST_DOES_NOT_EXIST")));
    }

    #[test]
    fn optional_var_absent_is_none() {
        assert_eq!(optional_var("DURABLE_SDK_TEST_DOES_NOT_EXIST"), None);
    }
}
</content>
