use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for a [`crate::WorldManager`]. Every field has a default, so a
/// YAML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldManagerConfig {
    /// Directory holding the persisted local world.
    pub base_dir: PathBuf,
    /// Persist the local world on teardown.
    pub save_local_world: bool,
    /// Restore the local world from its file on init, when present.
    pub restore_local_world: bool,
    pub local_world_file: String,
    /// How long a failed load stays on the loading display.
    pub failure_linger_ms: u64,
    /// Step passes kept for the frame timer statistics.
    pub step_history: usize,
}

impl Default for WorldManagerConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            save_local_world: true,
            restore_local_world: false,
            local_world_file: "LocalWorld.json".to_owned(),
            failure_linger_ms: 3000,
            step_history: 120,
        }
    }
}

impl WorldManagerConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn local_world_path(&self) -> PathBuf {
        self.base_dir.join(&self.local_world_file)
    }

    pub fn failure_linger(&self) -> Duration {
        Duration::from_millis(self.failure_linger_ms)
    }
}
