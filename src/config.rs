use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const REVISION_ENV: &str = "RPI_LGPIO_REVISION";
pub const CHIP_ENV: &str = "RPI_LGPIO_CHIP";
pub const DEFAULT_REVISION_PATH: &str = "/proc/device-tree/system/linux,revision";

#[derive(Debug, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Numbering {
    Board,
    Bcm,
}

impl TryFrom<i32> for Numbering {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            10 => Ok(Numbering::Board),
            11 => Ok(Numbering::Bcm),
            _ => Err(Error::InvalidMode),
        }
    }
}

#[derive(Debug, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Input,
    Output,
}

impl TryFrom<i32> for Direction {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Direction::Output),
            1 => Ok(Direction::Input),
            _ => Err(Error::InvalidDirection),
        }
    }
}

#[derive(Debug, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Pull {
    #[default]
    Off,
    Down,
    Up,
}

impl TryFrom<i32> for Pull {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            20 => Ok(Pull::Off),
            21 => Ok(Pull::Down),
            22 => Ok(Pull::Up),
            _ => Err(Error::InvalidPull),
        }
    }
}

#[derive(Debug, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

impl Edge {
    /// Whether a transition of kind `observed` (never `Both`) is reported.
    pub fn matches(self, observed: Edge) -> bool {
        match self {
            Edge::Both => matches!(observed, Edge::Rising | Edge::Falling),
            _ => self == observed,
        }
    }
}

impl TryFrom<i32> for Edge {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            31 => Ok(Edge::Rising),
            32 => Ok(Edge::Falling),
            33 => Ok(Edge::Both),
            _ => Err(Error::InvalidEdge),
        }
    }
}

#[derive(Debug, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    #[default]
    Low,
    High,
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value { Level::High } else { Level::Low }
    }
}

// Any non-zero value is truthy, as with the legacy `bool(value)` coercion.
impl From<i32> for Level {
    fn from(value: i32) -> Self {
        Level::from(value != 0)
    }
}

impl From<Level> for u8 {
    fn from(value: Level) -> Self {
        match value {
            Level::Low => 0,
            Level::High => 1,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ShimConfig {
    /// Hex revision code; when set the revision file is never read.
    pub revision: Option<String>,
    /// Chip number overriding the board default.
    pub chip: Option<u32>,
    pub revision_path: PathBuf,
    pub sample_interval_us: u64,
    pub broadcast_capacity: usize,
    pub warnings: bool,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            revision: None,
            chip: None,
            revision_path: PathBuf::from(DEFAULT_REVISION_PATH),
            sample_interval_us: 1000,
            broadcast_capacity: 64,
            warnings: true,
        }
    }
}

impl ShimConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("Invalid config json: {e}")))?;
        config.with_env_overrides()
    }

    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Applies `RPI_LGPIO_REVISION` and `RPI_LGPIO_CHIP` on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(revision) = env::var(REVISION_ENV) {
            self.revision = Some(revision);
        }
        if let Ok(chip) = env::var(CHIP_ENV) {
            let chip = chip
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("{CHIP_ENV}={chip}: {e}")))?;
            self.chip = Some(chip);
        }
        Ok(self)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_micros(self.sample_interval_us.max(1))
    }
}
