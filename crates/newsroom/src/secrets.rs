//! Secret resolution for credentials in the config file.
//!
//! A secret can be given three ways, checked in this order:
//!
//! 1. **Direct value**: `api_key: "pub_123"` (local experiments only)
//! 2. **File reference**: `api_key_file: /run/secrets/newsdata`
//! 3. **Env var reference**: `api_key_env: NEWSDATA_API_KEY`

use secrecy::SecretString;
use std::fs;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Secret from {origin} is empty")]
    Empty { origin: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from the first non-empty source: direct value, then
/// file contents, then environment variable. File and env values are trimmed.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        let content = fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
            path: expanded.clone(),
            source: e,
        })?;
        return non_empty(content.trim(), format!("file '{}'", expanded));
    }

    if let Some(name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(name) {
            Ok(value) => non_empty(value.trim(), format!("env var '{}'", name)),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Whether at least one source is configured, without reading it.
pub fn has_secret_source(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> bool {
    [direct, file_path, env_var]
        .iter()
        .any(|s| s.is_some_and(|s| !s.is_empty()))
}

fn non_empty(value: &str, origin: String) -> Result<SecretString> {
    if value.is_empty() {
        return Err(SecretError::Empty { origin });
    }
    Ok(SecretString::from(value.to_string()))
}

/// Expands a leading `~` or `~/` to the user's home directory.
pub(crate) fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy();
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // Tests touching the process environment run serially.
    #[test]
    #[serial]
    fn test_direct_value_takes_priority() {
        std::env::set_var("NEWSROOM_TEST_SECRET_1", "env_value");
        let result =
            resolve_secret(Some("direct_value"), None, Some("NEWSROOM_TEST_SECRET_1")).unwrap();
        assert_eq!(result.expose_secret(), "direct_value");
        std::env::remove_var("NEWSROOM_TEST_SECRET_1");
    }

    #[test]
    #[serial]
    fn test_file_takes_priority_over_env() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "  file_value  ").unwrap();
        std::env::set_var("NEWSROOM_TEST_SECRET_2", "env_value");

        let path = file.path().to_string_lossy().to_string();
        let result = resolve_secret(None, Some(&path), Some("NEWSROOM_TEST_SECRET_2")).unwrap();
        assert_eq!(result.expose_secret(), "file_value");
        std::env::remove_var("NEWSROOM_TEST_SECRET_2");
    }

    #[test]
    #[serial]
    fn test_env_var_fallback() {
        std::env::set_var("NEWSROOM_TEST_SECRET_3", "env_value\n");
        let result = resolve_secret(None, None, Some("NEWSROOM_TEST_SECRET_3")).unwrap();
        assert_eq!(result.expose_secret(), "env_value");
        std::env::remove_var("NEWSROOM_TEST_SECRET_3");
    }

    #[test]
    #[serial]
    fn test_empty_env_var_is_rejected() {
        std::env::set_var("NEWSROOM_TEST_SECRET_4", "   ");
        let result = resolve_secret(None, None, Some("NEWSROOM_TEST_SECRET_4"));
        assert!(matches!(result, Err(SecretError::Empty { .. })));
        std::env::remove_var("NEWSROOM_TEST_SECRET_4");
    }

    #[test]
    fn test_no_source_error() {
        let result = resolve_secret(None, Some(""), None);
        assert!(matches!(result, Err(SecretError::NoSourceProvided)));
    }

    #[test]
    fn test_file_not_found_error() {
        let result = resolve_secret(None, Some("/nonexistent/newsroom/secret"), None);
        assert!(matches!(result, Err(SecretError::FileReadError { .. })));
    }

    #[test]
    #[serial]
    fn test_env_var_not_set_error() {
        std::env::remove_var("NEWSROOM_TEST_MISSING");
        let result = resolve_secret(None, None, Some("NEWSROOM_TEST_MISSING"));
        assert!(matches!(result, Err(SecretError::EnvVarNotSet { .. })));
    }

    #[test]
    fn test_has_secret_source() {
        assert!(!has_secret_source(None, None, None));
        assert!(!has_secret_source(Some(""), Some(""), None));
        assert!(has_secret_source(None, None, Some("KEY")));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), "/abs/path");
        if let Some(home) = dirs::home_dir() {
            let expanded = expand_home("~/secret");
            assert!(expanded.starts_with(&*home.to_string_lossy()));
            assert!(expanded.ends_with("/secret"));
        }
    }
}
