//! Loading the provisioner configuration from disk.

use meshroot_provisioner::{ConfigError, ProvisionerConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Failure loading a configuration file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
}

/// Read, parse and validate a TOML provisioner configuration.
pub fn load_config(path: &Path) -> Result<ProvisionerConfig, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ProvisionerConfig = toml::from_str(&text).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;

    info!(
        path = %path.display(),
        own_address = %config.own_address,
        max_node_num = config.max_node_num,
        "Loaded provisioner configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshroot_types::Address;
    use std::io::Write;
    use std::time::Duration;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_overrides() {
        let file = write_config(
            r#"
            max_node_num = 12
            own_address = 2
            message_timeout_ms = 1500
            "#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.max_node_num, 12);
        assert_eq!(config.own_address, Address(2));
        assert_eq!(config.message_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/meshroot.toml")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_invalid_range_rejected() {
        let file = write_config(
            r#"
            unicast_min = 512
            unicast_max = 256
            "#,
        );

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Invalid(ConfigError::EmptyRange { .. })
        ));
    }

    #[test]
    fn test_malformed_toml() {
        let file = write_config("max_node_num = \"many\"");
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            LoadError::Parse { .. }
        ));
    }
}
