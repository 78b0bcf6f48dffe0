use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const CONFIG_FILE_PATH: &str = "onboarding.toml";
const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnboardingConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Assignee for steps whose template has no role and whose workflow has
    /// no assignee.
    #[serde(default)]
    pub default_assignee: Option<String>,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

pub fn onboarding_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".onboarding")
}

fn onboarding_config_json_path() -> PathBuf {
    onboarding_dir().join("config.json")
}

fn default_database_path() -> PathBuf {
    onboarding_dir().join("onboarding.db")
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            default_assignee: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl OnboardingConfig {
    /// `~/.onboarding/config.json`, else `./onboarding.toml`, then
    /// `ONBOARDING_*` environment variables.
    pub fn load() -> Self {
        let mut config =
            Self::from_files(&onboarding_config_json_path(), Path::new(CONFIG_FILE_PATH));
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn from_files(json_path: &Path, toml_path: &Path) -> Self {
        if json_path.exists() {
            match std::fs::read_to_string(json_path)
                .map_err(|error| error.to_string())
                .and_then(|content| {
                    serde_json::from_str::<Self>(&content).map_err(|error| error.to_string())
                }) {
                Ok(config) => return config,
                Err(error) => log::warn!(
                    "ignoring onboarding config {}: {}",
                    json_path.display(),
                    error
                ),
            }
        }

        if toml_path.exists() {
            match std::fs::read_to_string(toml_path)
                .map_err(|error| error.to_string())
                .and_then(|content| {
                    toml::from_str::<Self>(&content).map_err(|error| error.to_string())
                }) {
                Ok(config) => return config,
                Err(error) => log::warn!(
                    "ignoring onboarding config {}: {}",
                    toml_path.display(),
                    error
                ),
            }
        }

        Self::default()
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("ONBOARDING_DB_PATH").filter(|value| !value.trim().is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(assignee) = lookup("ONBOARDING_DEFAULT_ASSIGNEE") {
            let assignee = assignee.trim();
            self.default_assignee = (!assignee.is_empty()).then(|| assignee.to_string());
        }
        if let Some(capacity) = lookup("ONBOARDING_EVENT_CAPACITY") {
            match capacity.trim().parse::<usize>() {
                Ok(capacity) if capacity > 0 => self.event_capacity = capacity,
                _ => log::warn!(
                    "ignoring invalid ONBOARDING_EVENT_CAPACITY value {:?}",
                    capacity
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn json_file_wins_over_toml() {
        let dir = tempdir().expect("temp dir");
        let json_path = dir.path().join("config.json");
        let toml_path = dir.path().join("onboarding.toml");
        std::fs::write(
            &json_path,
            r#"{"database_path": "/data/json.db", "default_assignee": "Office"}"#,
        )
        .expect("write json");
        std::fs::write(&toml_path, "database_path = \"/data/toml.db\"\n").expect("write toml");

        let config = OnboardingConfig::from_files(&json_path, &toml_path);
        assert_eq!(config.database_path, PathBuf::from("/data/json.db"));
        assert_eq!(config.default_assignee.as_deref(), Some("Office"));
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn broken_json_falls_through_to_toml() {
        let dir = tempdir().expect("temp dir");
        let json_path = dir.path().join("config.json");
        let toml_path = dir.path().join("onboarding.toml");
        std::fs::write(&json_path, "{ not json").expect("write json");
        std::fs::write(&toml_path, "database_path = \"/data/toml.db\"\nevent_capacity = 8\n")
            .expect("write toml");

        let config = OnboardingConfig::from_files(&json_path, &toml_path);
        assert_eq!(config.database_path, PathBuf::from("/data/toml.db"));
        assert_eq!(config.event_capacity, 8);
    }

    #[test]
    fn env_overrides_apply_and_invalid_values_are_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ONBOARDING_DB_PATH", "/tmp/override.db"),
            ("ONBOARDING_DEFAULT_ASSIGNEE", "  Site Lead "),
            ("ONBOARDING_EVENT_CAPACITY", "zero"),
        ]);
        let mut config = OnboardingConfig::default();
        config.apply_env(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.database_path, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.default_assignee.as_deref(), Some("Site Lead"));
        assert_eq!(config.event_capacity, 256);
    }
}
