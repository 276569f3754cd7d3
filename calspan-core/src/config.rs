//! Global calspan configuration.

use std::path::{Path, PathBuf};

use chrono::Utc;
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_OCCURRENCES, DEFAULT_SYNC_DAYS};
use crate::error::{CalSpanError, CalSpanResult};
use crate::recurrence::SyncWindow;

static DEFAULT_DATA_DIR: &str = "~/.calspan";

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_sync_window_days() -> i64 {
    DEFAULT_SYNC_DAYS
}

fn default_max_occurrences() -> u16 {
    DEFAULT_MAX_OCCURRENCES
}

/// Configuration at ~/.config/calspan/config.toml
///
/// Every field can be overridden from the environment with a `CALSPAN_`
/// prefix, e.g. `CALSPAN_DATA_DIR`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CalSpanConfig {
    /// Where the event, busytime and alarm files live
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Recurring events are expanded this many days either side of now
    #[serde(default = "default_sync_window_days")]
    pub sync_window_days: i64,

    /// Cap on occurrences generated per recurring event
    #[serde(default = "default_max_occurrences")]
    pub max_occurrences: u16,
}

impl Default for CalSpanConfig {
    fn default() -> Self {
        CalSpanConfig {
            data_dir: default_data_dir(),
            sync_window_days: default_sync_window_days(),
            max_occurrences: default_max_occurrences(),
        }
    }
}

impl CalSpanConfig {
    pub fn config_path() -> CalSpanResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalSpanError::Config("Could not determine config directory".into()))?
            .join("calspan");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the global config, writing a commented default file on first use.
    pub fn load() -> CalSpanResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    /// Load from an explicit file (missing files fall back to defaults).
    pub fn load_from(path: &Path) -> CalSpanResult<Self> {
        Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(Environment::with_prefix("CALSPAN"))
            .build()
            .map_err(|e| CalSpanError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalSpanError::Config(e.to_string()))
    }

    /// `data_dir` with `~` and environment variables expanded.
    pub fn data_path(&self) -> PathBuf {
        let full_path_str = shellexpand::tilde(&self.data_dir.to_string_lossy()).into_owned();

        PathBuf::from(full_path_str)
    }

    pub fn sync_window(&self) -> SyncWindow {
        SyncWindow::around(Utc::now(), self.sync_window_days, self.max_occurrences)
    }

    pub fn save(&self, path: &Path) -> CalSpanResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| CalSpanError::Config(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| CalSpanError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> CalSpanResult<()> {
        let contents = format!(
            "\
# calspan configuration

# Where events and busytimes are stored:
# data_dir = \"{}\"

# Days either side of today in which recurring events are expanded:
# sync_window_days = {}

# Maximum occurrences generated per recurring event:
# max_occurrences = {}
",
            DEFAULT_DATA_DIR, DEFAULT_SYNC_DAYS, DEFAULT_MAX_OCCURRENCES
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CalSpanError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| CalSpanError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_file_parses_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calspan/config.toml");

        CalSpanConfig::create_default_config(&path).unwrap();
        let config = CalSpanConfig::load_from(&path).unwrap();

        assert_eq!(config.sync_window_days, DEFAULT_SYNC_DAYS);
        assert_eq!(config.max_occurrences, DEFAULT_MAX_OCCURRENCES);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = CalSpanConfig {
            data_dir: PathBuf::from("/tmp/calspan-data"),
            sync_window_days: 30,
            max_occurrences: 50,
        };

        config.save(&path).unwrap();
        let loaded = CalSpanConfig::load_from(&path).unwrap();

        assert_eq!(loaded.sync_window_days, 30);
        assert_eq!(loaded.max_occurrences, 50);
    }

    #[test]
    fn test_data_path_expands_tilde() {
        let config = CalSpanConfig::default();
        assert!(!config.data_path().to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_sync_window_spans_both_sides() {
        let config = CalSpanConfig {
            sync_window_days: 10,
            ..Default::default()
        };
        let window = config.sync_window();

        assert_eq!(window.span.duration(), chrono::Duration::days(20));
    }
}
