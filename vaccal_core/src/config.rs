//! Configuration file support for vaccal.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/vaccal/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Catalog source configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Directory of `<CODE>.json` catalogs that override the bundled ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Country used when the requested one has no catalog; empty disables fallback
    #[serde(default = "default_fallback_country")]
    pub fallback_country: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            fallback_country: default_fallback_country(),
        }
    }
}

impl CatalogConfig {
    /// The fallback country, or `None` when fallback is disabled
    pub fn fallback(&self) -> Option<&str> {
        let code = self.fallback_country.trim();
        (!code.is_empty()).then_some(code)
    }
}

/// Schedule view configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_upcoming_months")]
    pub upcoming_months: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            upcoming_months: default_upcoming_months(),
        }
    }
}

// Default value functions
fn home_dir_or_cwd() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| home_dir_or_cwd().join(".local/share"));
    base.join("vaccal")
}

fn default_fallback_country() -> String {
    "RU".into()
}

fn default_upcoming_months() -> u32 {
    3
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| home_dir_or_cwd().join(".config"));
        base.join("vaccal").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.data.data_dir.ends_with("vaccal"));
        assert_eq!(config.catalog.fallback(), Some("RU"));
        assert!(config.catalog.dir.is_none());
        assert_eq!(config.schedule.upcoming_months, 3);
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.catalog.dir = Some(PathBuf::from("/tmp/catalogs"));
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.catalog.dir, config.catalog.dir);
        assert_eq!(parsed.catalog.fallback_country, "RU");
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[catalog]
fallback_country = "US"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.catalog.fallback(), Some("US"));
        assert_eq!(config.schedule.upcoming_months, 3); // default
    }

    #[test]
    fn test_empty_fallback_disables() {
        let config: Config = toml::from_str("[catalog]\nfallback_country = \"  \"\n").unwrap();
        assert_eq!(config.catalog.fallback(), None);
    }

    #[test]
    fn test_save_and_load_from() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.schedule.upcoming_months = 6;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.schedule.upcoming_months, 6);
    }
}
