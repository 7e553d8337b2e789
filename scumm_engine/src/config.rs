use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::version::{GameVersion, GameVersionTraits, DEFAULT_HEAP_THRESHOLD_NEW_COSTUMES};

/// Engine settings read from an optional JSON file. Command line flags
/// override individual fields afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub version: GameVersion,
    pub new_costumes: bool,
    pub screen_width: i32,
    pub screen_height: i32,
    /// Overrides the per-version heap threshold.
    pub heap_threshold: Option<usize>,
    pub seed: u64,
    /// Ticks between autosaves; 0 disables them.
    pub autosave_period: u32,
    pub save_dir: Option<PathBuf>,
    pub boot_script: u16,
    /// Script arguments handed to the boot script.
    pub boot_args: Vec<i32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            version: GameVersion::V5,
            new_costumes: false,
            screen_width: 320,
            screen_height: 200,
            heap_threshold: None,
            seed: 0,
            autosave_period: 0,
            save_dir: None,
            boot_script: 1,
            boot_args: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading engine config from {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parsing engine config JSON from {}", path.display()))
    }

    /// Table sizes and capabilities for the configured title, before the
    /// index file's `MAXS` block is applied.
    pub fn traits(&self) -> GameVersionTraits {
        let mut traits = GameVersionTraits::for_version(self.version);
        if self.new_costumes {
            traits = traits.with_new_costumes();
        }
        traits.screen_width = self.screen_width;
        traits.screen_height = self.screen_height;
        if let Some(threshold) = self.heap_threshold {
            traits.heap_threshold = threshold;
        } else if self.new_costumes {
            traits.heap_threshold = DEFAULT_HEAP_THRESHOLD_NEW_COSTUMES;
        }
        traits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{ "version": "v4", "seed": 99 }"#).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.version, GameVersion::V4);
        assert_eq!(config.seed, 99);
        assert_eq!(config.boot_script, 1);

        let traits = config.traits();
        assert!(traits.small_header);
        assert_eq!(traits.screen_width, 320);
    }

    #[test]
    fn heap_threshold_override_wins() {
        let config = EngineConfig {
            heap_threshold: Some(4096),
            new_costumes: true,
            ..EngineConfig::default()
        };
        assert_eq!(config.traits().heap_threshold, 4096);
    }
}
