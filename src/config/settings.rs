//! Configuration file support for kind-images

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub behavior: Behavior,

    #[serde(default)]
    pub colors: Colors,
}

/// Which cluster and runtime to talk to
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Defaults {
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// "auto", "docker" or "podman"
    #[serde(default = "default_runtime")]
    pub runtime: String,
}

/// Behavior settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Behavior {
    #[serde(default = "default_true")]
    pub confirm_destructive: bool,

    #[serde(default = "default_true")]
    pub show_progress: bool,

    /// Upper bound for any single docker/kind/crictl call. 0 disables it.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

/// Color settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Colors {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions
fn default_cluster_name() -> String {
    "kind".to_string()
}

fn default_runtime() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

fn default_command_timeout_secs() -> u64 {
    600
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            runtime: default_runtime(),
        }
    }
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            confirm_destructive: default_true(),
            show_progress: default_true(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl Default for Colors {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl Behavior {
    pub fn command_timeout(&self) -> Option<Duration> {
        match self.command_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Settings {
    /// Load settings from an explicit path, the standard locations, or defaults.
    ///
    /// An explicit path must exist and parse. A file found in a standard
    /// location that fails to parse is reported and ignored.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        match Self::find_config_file() {
            Some(path) => match Self::load_from_file(&path) {
                Ok(settings) => {
                    crate::log_info!("Loaded config from {}", path.display());
                    Ok(settings)
                }
                Err(e) => {
                    crate::log_warn!("Ignoring config file: {:#}", e);
                    Ok(Self::default())
                }
            },
            None => Ok(Self::default()),
        }
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Find config file in standard locations
    /// Priority:
    /// 1. .kind-images.toml in current directory
    /// 2. ~/.config/kind-images/config.toml (XDG config directory)
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from(".kind-images.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("kind-images").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        None
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Generate example config file content
    pub fn example_config() -> Result<String> {
        let header = "# kind-images configuration file\n\
                      # Place this file at ~/.config/kind-images/config.toml or .kind-images.toml in your project\n\n";

        let body = toml::to_string_pretty(&Settings::default())
            .context("Failed to serialize default settings")?;

        Ok(format!("{}{}", header, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.defaults.cluster_name, "kind");
        assert_eq!(settings.defaults.runtime, "auto");
        assert!(settings.behavior.confirm_destructive);
        assert_eq!(
            settings.behavior.command_timeout(),
            Some(Duration::from_secs(600))
        );
        assert!(settings.colors.enabled);
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let behavior = Behavior {
            command_timeout_secs: 0,
            ..Behavior::default()
        };
        assert_eq!(behavior.command_timeout(), None);
    }

    #[test]
    fn test_settings_deserialization() {
        let toml_str = r#"
[defaults]
cluster_name = "dev"

[behavior]
confirm_destructive = false
command_timeout_secs = 30
"#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.defaults.cluster_name, "dev");
        assert_eq!(settings.defaults.runtime, "auto");
        assert!(!settings.behavior.confirm_destructive);
        assert!(settings.behavior.show_progress);
        assert_eq!(settings.behavior.command_timeout_secs, 30);
        assert!(settings.colors.enabled);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.defaults.runtime = "podman".to_string();
        settings.save(&path).unwrap();

        let loaded = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(Settings::load(Some(missing.as_path())).is_err());
    }

    #[test]
    fn test_example_config() {
        let example = Settings::example_config().unwrap();
        assert!(example.contains("kind-images configuration"));
        assert!(example.contains("[defaults]"));
        assert!(example.contains("[behavior]"));
        assert!(example.contains("command_timeout_secs = 600"));

        let parsed: Settings = toml::from_str(&example).unwrap();
        assert_eq!(parsed, Settings::default());
    }
}
