use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::evening::EveningSettings;

/// Application configuration loaded from TOML config file.
/// All fields have defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Ordering policy, passcode seed, retry and raffle settings.
    pub evening: EveningSettings,
}

impl AppConfig {
    /// Load config from `~/.config/openmic/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }),
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let config = toml::from_str::<AppConfig>(contents)?;
        log::info!("Loaded config ({:?} ordering)", config.evening.ordering);
        Ok(config)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("openmic.db")
    } else {
        // Fallback: current directory
        PathBuf::from("openmic.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::OrderingPolicy;

    #[test]
    fn test_empty_config_is_default() {
        let config = AppConfig::parse("").unwrap();
        assert!(config.db_path.is_none());
        assert_eq!(config.evening.ordering, OrderingPolicy::Chronological);
        assert_eq!(config.evening.raffle_song_limit, 1);
        assert!(config.evening.signup_open);
    }

    #[test]
    fn test_partial_evening_table() {
        let config = AppConfig::parse(
            r#"
            db_path = "/tmp/openmic.db"

            [evening]
            ordering = "alternating"
            passcode = "protests"
            max_retries = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/openmic.db")));
        assert_eq!(config.evening.ordering, OrderingPolicy::Alternating);
        assert_eq!(config.evening.passcode, "protests");
        assert_eq!(config.evening.max_retries, 5);
        assert_eq!(config.evening.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(AppConfig::parse("[evening]\nordering = \"random\"").is_err());
    }
}
