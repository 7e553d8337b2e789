use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use scumm_formats::Maxs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameVersion {
    V4,
    V5,
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameVersion::V4 => f.write_str("v4"),
            GameVersion::V5 => f.write_str("v5"),
        }
    }
}

impl FromStr for GameVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "v4" | "4" => Ok(GameVersion::V4),
            "v5" | "5" => Ok(GameVersion::V5),
            other => bail!("unsupported game version '{other}' (expected v4 or v5)"),
        }
    }
}

pub const DEFAULT_HEAP_THRESHOLD_V5: usize = 6 * 1024 * 1024;
pub const DEFAULT_HEAP_THRESHOLD_V4: usize = 2 * 1024 * 1024;
pub const DEFAULT_HEAP_THRESHOLD_NEW_COSTUMES: usize = 10 * 1024 * 1024;

/// Per-title capabilities and table sizes. Every table in the VM is sized
/// once from this at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameVersionTraits {
    pub version: GameVersion,
    pub small_header: bool,
    pub new_camera: bool,
    pub new_costumes: bool,
    pub num_actors: usize,
    /// Slot 0 is never handed out.
    pub num_script_slots: usize,
    pub num_variables: usize,
    pub num_bit_variables: usize,
    pub num_local_objects: usize,
    pub num_global_objects: usize,
    pub num_inventory: usize,
    pub num_verbs: usize,
    pub num_strings: usize,
    pub num_global_scripts: usize,
    pub num_charsets: usize,
    pub heap_threshold: usize,
    pub screen_width: i32,
    pub screen_height: i32,
}

impl GameVersionTraits {
    pub fn v5() -> Self {
        let maxs = Maxs::default();
        GameVersionTraits {
            version: GameVersion::V5,
            small_header: false,
            new_camera: false,
            new_costumes: false,
            num_actors: 13,
            num_script_slots: 80,
            num_variables: maxs.num_variables as usize,
            num_bit_variables: maxs.num_bit_variables as usize,
            num_local_objects: maxs.num_local_objects as usize,
            num_global_objects: 1000,
            num_inventory: maxs.num_inventory as usize,
            num_verbs: maxs.num_verbs as usize,
            num_strings: maxs.num_arrays as usize,
            num_global_scripts: maxs.num_global_scripts as usize,
            num_charsets: maxs.num_charsets as usize,
            heap_threshold: DEFAULT_HEAP_THRESHOLD_V5,
            screen_width: 320,
            screen_height: 200,
        }
    }

    pub fn v4() -> Self {
        GameVersionTraits {
            version: GameVersion::V4,
            small_header: true,
            heap_threshold: DEFAULT_HEAP_THRESHOLD_V4,
            ..Self::v5()
        }
    }

    pub fn for_version(version: GameVersion) -> Self {
        match version {
            GameVersion::V4 => Self::v4(),
            GameVersion::V5 => Self::v5(),
        }
    }

    /// Adopts the table sizes an index file declares.
    pub fn with_maxs(mut self, maxs: &Maxs, num_global_objects: usize) -> Self {
        self.num_variables = maxs.num_variables as usize;
        self.num_bit_variables = maxs.num_bit_variables as usize;
        self.num_local_objects = maxs.num_local_objects as usize;
        self.num_inventory = maxs.num_inventory as usize;
        self.num_verbs = maxs.num_verbs as usize;
        self.num_strings = maxs.num_arrays as usize;
        self.num_global_scripts = maxs.num_global_scripts as usize;
        self.num_charsets = maxs.num_charsets as usize;
        if num_global_objects > 0 {
            self.num_global_objects = num_global_objects;
        }
        self
    }

    pub fn with_new_costumes(mut self) -> Self {
        self.new_costumes = true;
        self.heap_threshold = DEFAULT_HEAP_THRESHOLD_NEW_COSTUMES;
        self
    }

    pub fn num_strips(&self) -> i32 {
        self.screen_width / 8
    }
}
