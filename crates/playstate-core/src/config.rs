use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PlaystateError, Result};

/// Top-level configuration for the playstate store.
///
/// The hosting application decides where the file lives; each section maps
/// to one concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaystateConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl PlaystateConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PlaystateConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PlaystateError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Full path of the dedicated user data file.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.general.data_dir).join(&self.storage.file_name)
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the data file.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Store handle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// File name of the user data database, relative to `data_dir`.
    pub file_name: String,
    /// How long a connection waits on a locked file before failing.
    pub busy_timeout_ms: u64,
    /// Read connections kept open between reads.
    pub max_idle_readers: usize,
    /// Use write-ahead logging for file databases.
    pub wal: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            file_name: "userdata_v2.db".to_string(),
            busy_timeout_ms: 5_000,
            max_idle_readers: 4,
            wal: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = PlaystateConfig::default();
        assert_eq!(config.general.data_dir, "data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.storage.file_name, "userdata_v2.db");
        assert_eq!(config.storage.busy_timeout_ms, 5_000);
        assert_eq!(config.storage.max_idle_readers, 4);
        assert!(config.storage.wal);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
data_dir = "/var/lib/media"
log_level = "debug"

[storage]
file_name = "playstate.db"
busy_timeout_ms = 250
max_idle_readers = 8
wal = false
"#;
        let file = create_temp_config(content);
        let config = PlaystateConfig::load(file.path()).unwrap();
        assert_eq!(config.general.data_dir, "/var/lib/media");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.storage.file_name, "playstate.db");
        assert_eq!(config.storage.busy_timeout_ms, 250);
        assert_eq!(config.storage.max_idle_readers, 8);
        assert!(!config.storage.wal);
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/media").join("playstate.db")
        );
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let file = create_temp_config("[storage]\nbusy_timeout_ms = 10\n");
        let config = PlaystateConfig::load(file.path()).unwrap();
        assert_eq!(config.storage.busy_timeout_ms, 10);
        assert_eq!(config.storage.file_name, "userdata_v2.db");
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_load_invalid_toml_is_config_error() {
        let file = create_temp_config("[storage\nwal = ");
        let err = PlaystateConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, PlaystateError::Config(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = PlaystateConfig::load_or_default(Path::new("/nonexistent/playstate.toml"));
        assert_eq!(config.storage.file_name, "userdata_v2.db");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("playstate.toml");

        let mut config = PlaystateConfig::default();
        config.storage.max_idle_readers = 2;
        config.save(&path).unwrap();

        let loaded = PlaystateConfig::load(&path).unwrap();
        assert_eq!(loaded.storage.max_idle_readers, 2);
    }
}
