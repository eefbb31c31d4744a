use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::TrackPreference;
use crate::db::BackendType;
use crate::fetch::StoreKeys;
use crate::models::StatusModel;

pub const DEFAULT_API_URL: &str = "https://roadmap-api.nekotyan2d.ru";
pub const DEFAULT_OVERLAY_KEY: &str = "roadmap-api-technologies";
pub const DEFAULT_CATALOG_KEY: &str = "roadmap-technologies";
pub const DEFAULT_SELECTION_KEY: &str = "roadmap-selected";

/// Tracker settings, read from a YAML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Base URL of the roadmap API
    pub api_base_url: String,

    pub request_timeout_secs: u64,

    /// Store file; defaults to `~/.roadmap-tracker/store.yaml`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// Backend override (`yaml`, `sqlite` or `memory`); inferred from the
    /// store file extension when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    pub status_model: StatusModel,

    pub track: TrackPreference,

    pub overlay_key: String,
    pub catalog_key: String,
    pub selection_key: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 15,
            store_path: None,
            backend: None,
            status_model: StatusModel::default(),
            track: TrackPreference::default(),
            overlay_key: DEFAULT_OVERLAY_KEY.to_string(),
            catalog_key: DEFAULT_CATALOG_KEY.to_string(),
            selection_key: DEFAULT_SELECTION_KEY.to_string(),
        }
    }
}

impl TrackerConfig {
    /// Loads the config from the provided path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))
    }

    /// Loads the config if the file exists, otherwise the defaults.
    /// Environment overrides are applied and the result validated.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies `ROADMAP_API_URL` and `ROADMAP_STORE` as looked up by `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ROADMAP_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(store) = lookup("ROADMAP_STORE").filter(|v| !v.trim().is_empty()) {
            self.store_path = Some(PathBuf::from(store));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            anyhow::bail!("api_base_url must not be empty");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be at least 1");
        }
        let keys = [
            ("overlay_key", &self.overlay_key),
            ("catalog_key", &self.catalog_key),
            ("selection_key", &self.selection_key),
        ];
        for (name, key) in keys {
            if key.trim().is_empty() {
                anyhow::bail!("{} must not be empty", name);
            }
        }
        for (i, (name, key)) in keys.iter().enumerate() {
            for (other_name, other) in &keys[i + 1..] {
                if key == other {
                    anyhow::bail!(
                        "{} and {} both use the store key '{}'",
                        name,
                        other_name,
                        key
                    );
                }
            }
        }
        self.backend_type()?;
        Ok(())
    }

    pub fn backend_type(&self) -> Result<Option<BackendType>> {
        match &self.backend {
            None => Ok(None),
            Some(name) => BackendType::parse(name)
                .map(Some)
                .with_context(|| format!("Unknown store backend '{}'", name)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn store_keys(&self) -> StoreKeys {
        StoreKeys {
            overlay: self.overlay_key.clone(),
            catalog: self.catalog_key.clone(),
            selection: self.selection_key.clone(),
        }
    }

    /// The configured store file, or the default under the home directory
    pub fn resolved_store_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store_path {
            return Ok(path.clone());
        }
        let home_dir = dirs::home_dir().context("Failed to determine home directory")?;
        Ok(home_dir.join(".roadmap-tracker").join("store.yaml"))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }

    /// Save the config to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_yaml()?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Creates a default config file if it doesn't exist; returns whether one was written
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<bool> {
        if path.as_ref().exists() {
            return Ok(false);
        }
        Self::default().save(path)?;
        Ok(true)
    }
}

/// Gets the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("ROADMAP_TRACKER_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    // Default to ~/.roadmap-tracker.config
    let home_dir = dirs::home_dir().context("Failed to determine home directory")?;

    Ok(home_dir.join(".roadmap-tracker.config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tracker.config");
        fs::write(&path, "status_model: stages\ntrack: local\n").unwrap();

        let config = TrackerConfig::load(&path).unwrap();
        assert_eq!(config.status_model, StatusModel::Stages);
        assert_eq!(config.track, TrackPreference::Local);
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_create_default_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/tracker.config");
        assert!(TrackerConfig::create_default(&path).unwrap());
        assert!(!TrackerConfig::create_default(&path).unwrap());
        assert_eq!(TrackerConfig::load(&path).unwrap(), TrackerConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = TrackerConfig::default();
        config.apply_overrides(|name| match name {
            "ROADMAP_API_URL" => Some("http://localhost:3000".to_string()),
            "ROADMAP_STORE" => Some("/tmp/tracker.db".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "http://localhost:3000");
        assert_eq!(
            config.resolved_store_path().unwrap(),
            PathBuf::from("/tmp/tracker.db")
        );
    }

    #[test]
    fn test_colliding_keys_rejected() {
        let config = TrackerConfig {
            catalog_key: DEFAULT_OVERLAY_KEY.to_string(),
            ..TrackerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("overlay_key and catalog_key"));
    }

    #[test]
    fn test_backend_override() {
        let mut config = TrackerConfig {
            backend: Some("sqlite".to_string()),
            ..TrackerConfig::default()
        };
        assert_eq!(config.backend_type().unwrap(), Some(BackendType::Sqlite));
        config.backend = Some("postgres".to_string());
        assert!(config.validate().is_err());
    }
}
