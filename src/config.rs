//! Application configuration and persistence

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Display configuration for the synthesized document
    pub display: DisplaySettings,
    /// Persisted keyword highlights
    pub highlights: Vec<PersistedHighlight>,
}

/// Display settings for the synthesized document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisplaySettings {
    /// Substitute service tags with a deterministic emoji per service
    pub emoji_service_tags: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            emoji_service_tags: false,
        }
    }
}

/// A keyword highlight as persisted in configuration.
///
/// The stable identity is the keyword+color pair; UI-scoped ids are
/// regenerated when the store is rebuilt from config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedHighlight {
    pub keyword: String,
    pub color: String,
    pub is_checked: bool,
}

impl AppConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("logfold");

        Ok(dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let config = AppConfig {
            display: DisplaySettings {
                emoji_service_tags: true,
            },
            highlights: vec![PersistedHighlight {
                keyword: "token".to_string(),
                color: "#ff0000".to_string(),
                is_checked: true,
            }],
        };

        let serialized = toml::to_string(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(deserialized.display, config.display);
        assert_eq!(deserialized.highlights, config.highlights);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(!config.display.emoji_service_tags);
        assert!(config.highlights.is_empty());
    }
}
