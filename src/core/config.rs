use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::core::attachments::{StagingPolicy, MAX_FILES_PER_MESSAGE, MAX_FILE_SIZE};
use crate::core::tabs::MAX_VISIBLE_TABS;

/// Backend the client talks to. The service is a thin proxy in front of the
/// actual model providers, so there is no API key on this side.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    /// Base URL of the chat backend.
    pub base_url: Option<String>,
    /// Model id assigned to newly created sessions.
    pub default_model: Option<String>,
    /// How many tabs stay visible before sessions spill into the overflow
    /// list.
    pub visible_tabs: Option<usize>,
    pub max_attachment_bytes: Option<u64>,
    pub max_files_per_message: Option<usize>,
    /// Transcript log file, enabled at startup when set.
    pub log_file: Option<String>,
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        Self::load_from_path(&Self::config_path())
    }

    pub fn load_from_path(config_path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to_path(&Self::config_path())
    }

    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    fn config_path() -> PathBuf {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "tabchat")
            .expect("could not determine config directory");
        proj_dirs.config_dir().join("config.toml")
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn default_model(&self) -> &str {
        self.default_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn tab_capacity(&self) -> usize {
        self.visible_tabs.unwrap_or(MAX_VISIBLE_TABS).max(1)
    }

    pub fn staging_policy(&self) -> StagingPolicy {
        StagingPolicy {
            max_files: self.max_files_per_message.unwrap_or(MAX_FILES_PER_MESSAGE),
            max_bytes: self.max_attachment_bytes.unwrap_or(MAX_FILE_SIZE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let config = Config::load_from_path(&path).expect("load");
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.default_model(), DEFAULT_MODEL);
        assert_eq!(config.tab_capacity(), MAX_VISIBLE_TABS);
        assert_eq!(config.staging_policy().max_bytes, MAX_FILE_SIZE);
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            base_url: Some("http://example.invalid:9000".to_string()),
            default_model: Some("anthropic/claude-3.5-sonnet".to_string()),
            visible_tabs: Some(3),
            ..Default::default()
        };
        config.save_to_path(&path).expect("save");

        let loaded = Config::load_from_path(&path).expect("reload");
        assert_eq!(loaded.base_url(), "http://example.invalid:9000");
        assert_eq!(loaded.default_model(), "anthropic/claude-3.5-sonnet");
        assert_eq!(loaded.tab_capacity(), 3);
    }

    #[test]
    fn tab_capacity_never_drops_below_one() {
        let config = Config {
            visible_tabs: Some(0),
            ..Default::default()
        };
        assert_eq!(config.tab_capacity(), 1);
    }
}
