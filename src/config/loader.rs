//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::GatewayConfig;
use crate::config::validation::ValidationError;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse configuration from a TOML file. Validation happens once CLI
/// overrides have been applied.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn loads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[listener]\nbind_address = \"0.0.0.0:3128\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3128");
    }

    #[test]
    fn errors_name_the_file() {
        let err = load_config(Path::new("/nonexistent/gateway.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/gateway.toml"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[listener").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = ConfigError::Validation(vec![
            ValidationError::EmptyOrigin,
            ValidationError::Zero("limits.max_body_bytes"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: rules.origin must not be empty, limits.max_body_bytes must be greater than zero"
        );
    }
}
