//! Configuration file I/O for [`crate::config::ScannerConfig`].

use crate::config::ScannerConfig;
use std::fs;
use std::io;
use std::path::Path;

/// Error type for configuration file operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    ReadError(#[from] io::Error),

    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Loads configuration from the default location, or `ScannerConfig::default()`
/// if no file exists there yet.
pub fn load_config() -> Result<ScannerConfig, ConfigError> {
    load_config_from(&ScannerConfig::config_file())
}

/// Loads configuration from a specific path. A missing file is not an
/// error: it yields the default configuration.
pub fn load_config_from(path: &Path) -> Result<ScannerConfig, ConfigError> {
    if !path.exists() {
        return Ok(ScannerConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    let config: ScannerConfig = toml::from_str(&contents)?;
    Ok(config)
}

/// Saves configuration to the default location, creating parent
/// directories as needed.
pub fn save_config(config: &ScannerConfig) -> Result<(), ConfigError> {
    save_config_to(config, &ScannerConfig::config_file())
}

/// Saves configuration to a specific path, creating parent directories as
/// needed.
pub fn save_config_to(config: &ScannerConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config)?;
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = ScannerConfig::default();
        config.transport.address = "/dev/ttyUSB3".to_string();
        config.acquisition.pedantic = true;
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.transport.address, "/dev/ttyUSB3");
        assert!(loaded.acquisition.pedantic);
    }

    #[test]
    fn missing_file_yields_default() {
        let config = load_config_from(Path::new("/nonexistent/esci-scanner/config.toml")).unwrap();
        assert_eq!(config.transport.address, ScannerConfig::default().transport.address);
    }
}
