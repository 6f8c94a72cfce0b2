//! Configuration management for ludex
//!
//! Handles catalog policies, per-system environments, store locations and
//! the on-disk layout of gamelists and recovery logs. TOML-based.

mod catalog_settings;
mod system_config;

pub use catalog_settings::{CatalogSettings, SortDirection, SortField, SortSettings};
pub use system_config::{CoreEntry, EmulatorEntry, SystemConfig};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// System-wide configuration location
pub const SYSTEM_CONFIG_DIR: &str = "/etc/ludex";

/// Per-user configuration directory (`~/.config/ludex` on Linux)
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ludex")
}

/// Where games, gamelists and recovery fragments live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root holding one directory per system
    #[serde(default = "default_roms_dir")]
    pub roms_dir: PathBuf,

    /// Keep gamelists out of the ROM folders (`<dir>/<system>/gamelist.xml`)
    #[serde(default)]
    pub gamelists_dir: Option<PathBuf>,

    /// Per-system recovery fragment directories live under this one
    #[serde(default = "default_recovery_dir")]
    pub recovery_dir: PathBuf,

    /// Arcade short-name to title table (mamenames.xml layout)
    #[serde(default)]
    pub arcade_names: Option<PathBuf>,

    /// Scratch directory for exported game-info documents
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,
}

fn default_roms_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .join("roms")
}

fn default_recovery_dir() -> PathBuf {
    user_config_dir().join("recovery")
}

fn default_runtime_dir() -> PathBuf {
    std::env::temp_dir().join("ludex")
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            roms_dir: default_roms_dir(),
            gamelists_dir: None,
            recovery_dir: default_recovery_dir(),
            arcade_names: None,
            runtime_dir: default_runtime_dir(),
        }
    }
}

impl PathSettings {
    /// Canonical gamelist location for a system
    pub fn gamelist_path(&self, system: &str, start_path: &Path) -> PathBuf {
        match &self.gamelists_dir {
            Some(dir) => dir.join(system).join("gamelist.xml"),
            None => start_path.join("gamelist.xml"),
        }
    }

    /// Recovery fragment directory for a system
    pub fn recovery_path(&self, system: &str) -> PathBuf {
        self.recovery_dir.join(system)
    }
}

/// Locations the store scanners read from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Steam library folders (each containing `steamapps/`)
    #[serde(default)]
    pub steam_libraries: Vec<PathBuf>,

    /// Directory with Epic launcher `*.item` manifests
    #[serde(default)]
    pub epic_manifests: Option<PathBuf>,
}

/// Main ludex configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LudexConfig {
    #[serde(default)]
    pub catalog: CatalogSettings,

    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub stores: StoreSettings,

    #[serde(default = "system_config::default_systems")]
    pub systems: BTreeMap<String, SystemConfig>,
}

impl Default for LudexConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogSettings::default(),
            paths: PathSettings::default(),
            stores: StoreSettings::default(),
            systems: system_config::default_systems(),
        }
    }
}

impl LudexConfig {
    /// Configuration with no systems, for embedding and tests
    pub fn empty() -> Self {
        Self {
            systems: BTreeMap::new(),
            ..Default::default()
        }
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// The user config is layered over the system config when both exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let system_config = Path::new(SYSTEM_CONFIG_DIR).join("config.toml");
        let user_config = user_config_dir().join("config.toml");

        let layers: Vec<&Path> = [system_config.as_path(), user_config.as_path()]
            .into_iter()
            .filter(|p| p.exists())
            .collect();

        if layers.is_empty() {
            tracing::warn!("No configuration file found, using defaults");
            return Ok(Self::default());
        }
        Self::load_layered(&layers)
    }

    /// Load several files, later ones overriding keys of earlier ones
    pub fn load_layered(paths: &[&Path]) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        for path in paths {
            let contents = std::fs::read_to_string(path)?;
            let layer: toml::Value = toml::from_str(&contents)?;
            merge_toml(&mut merged, layer);
            tracing::debug!("Loaded configuration layer {}", path.display());
        }

        let config: Self = merged.try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Save to default user configuration location
    pub fn save_default(&self) -> Result<(), ConfigError> {
        self.save(&user_config_dir().join("config.toml"))
    }

    /// Reject configurations the catalog cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, system) in &self.systems {
            if system.short_name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "system '{}' has an empty short_name",
                    key
                )));
            }
            if !system.is_store() && system.extensions.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "system '{}' accepts no file extensions",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Look up a system by short name
    pub fn system(&self, short_name: &str) -> Option<&SystemConfig> {
        self.systems.get(short_name)
    }
}

/// Helper function to merge TOML values
pub fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(&key) {
                    merge_toml(base_value, value);
                } else {
                    base_table.insert(key, value);
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
