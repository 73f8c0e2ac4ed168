//! Board identity, decoded from the new-style revision code.

use std::{fs, path::Path};

use log::debug;
use serde::Serialize;

use crate::config::ShimConfig;
use crate::error::{Error, NOT_A_PI, OLD_STYLE_REVISION, Result};

const NEW_STYLE_FLAG: u32 = 1 << 23;
const BCM2712: &str = "BCM2712";

/// Informational record describing the resolved board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpiInfo {
    pub p1_revision: u8,
    pub revision: String,
    #[serde(rename = "type")]
    pub board_type: &'static str,
    pub manufacturer: &'static str,
    pub processor: &'static str,
    pub ram: &'static str,
}

impl RpiInfo {
    /// Resolves the board from the configured override or the revision file.
    pub fn resolve(config: &ShimConfig) -> Result<Self> {
        let code = match &config.revision {
            Some(revision) => parse_revision(revision)?,
            None => read_revision(&config.revision_path)?,
        };
        let info = Self::from_code(code)?;
        debug!("resolved board {} ({})", info.board_type, info.revision);
        Ok(info)
    }

    pub fn from_code(code: u32) -> Result<Self> {
        if code == 0 {
            return Err(Error::UnrecognizedBoard(NOT_A_PI));
        }
        if code & NEW_STYLE_FLAG == 0 {
            return Err(Error::UnrecognizedBoard(OLD_STYLE_REVISION));
        }
        let board = (code >> 4) & 0xff;

        Ok(Self {
            p1_revision: match board {
                0x00 | 0x01 => 2,
                0x06 | 0x0a | 0x10 | 0x14 => 0,
                _ => 3,
            },
            revision: format!("{code:x}"),
            board_type: match board {
                0x00 => "Model A",
                0x01 => "Model B",
                0x02 => "Model A+",
                0x03 => "Model B+",
                0x04 => "Pi 2 Model B",
                0x05 => "Alpha",
                0x06 => "Compute Module 1",
                0x08 => "Pi 3 Model B",
                0x09 => "Zero",
                0x0a => "Compute Module 3",
                0x0c => "Zero W",
                0x0d => "Pi 3 Model B+",
                0x0e => "Pi 3 Model A+",
                0x10 => "Compute Module 3+",
                0x11 => "Pi 4 Model B",
                0x12 => "Zero 2 W",
                0x13 => "Pi 400",
                0x14 => "Compute Module 4",
                0x17 => "Pi 5 Model B",
                _ => "Unknown",
            },
            manufacturer: match (code >> 16) & 0xf {
                0 => "Sony UK",
                1 => "Egoman",
                2 | 4 => "Embest",
                3 => "Sony Japan",
                5 => "Stadium",
                _ => "Unknown",
            },
            processor: match (code >> 12) & 0xf {
                0 => "BCM2835",
                1 => "BCM2836",
                2 => "BCM2837",
                3 => "BCM2711",
                4 => BCM2712,
                _ => "Unknown",
            },
            ram: match (code >> 20) & 0x7 {
                0 => "256M",
                1 => "512M",
                2 => "1GB",
                3 => "2GB",
                4 => "4GB",
                5 => "8GB",
                6 => "16GB",
                _ => "Unknown",
            },
        })
    }

    /// The gpiochip carrying the header pins; the Pi 5 moved it to 4.
    pub fn default_chip(&self) -> u32 {
        if self.processor == BCM2712 { 4 } else { 0 }
    }
}

pub fn parse_revision(text: &str) -> Result<u32> {
    let text = text.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(text, 16).map_err(|_| Error::UnrecognizedBoard(NOT_A_PI))
}

/// Reads the big-endian device-tree revision cell.
pub fn read_revision(path: &Path) -> Result<u32> {
    let bytes = fs::read(path).map_err(|_| Error::UnrecognizedBoard(NOT_A_PI))?;
    let cell: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(Error::UnrecognizedBoard(NOT_A_PI))?;
    Ok(u32::from_be_bytes(cell))
}
