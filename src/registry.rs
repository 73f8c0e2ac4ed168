//! Numbering mode and the per-pin configuration table.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::config::{Direction, Numbering, Pull};
use crate::error::{Error, Result};

/// Logical GPIO lines exposed by the SoC.
pub const GPIO_COUNT: u32 = 54;

// Physical header pin to logical GPIO, Model B+ onwards.
const BOARD_MAP: [(u32, u32); 26] = [
    (3, 2),
    (5, 3),
    (7, 4),
    (8, 14),
    (10, 15),
    (11, 17),
    (12, 18),
    (13, 27),
    (15, 22),
    (16, 23),
    (18, 24),
    (19, 10),
    (21, 9),
    (22, 25),
    (23, 11),
    (24, 8),
    (26, 7),
    (29, 5),
    (31, 6),
    (32, 12),
    (33, 13),
    (35, 19),
    (36, 16),
    (37, 26),
    (38, 20),
    (40, 21),
];

/// Header pins carrying a GPIO, in physical order.
pub fn board_pins() -> impl Iterator<Item = u32> {
    BOARD_MAP.iter().map(|(board, _)| *board)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinState {
    pub direction: Direction,
    pub pull: Pull,
    warned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configured {
    /// True the first time an already configured pin is set up again while
    /// warnings are enabled.
    pub warn_in_use: bool,
}

#[derive(Default)]
pub struct PinRegistry {
    numbering: RwLock<Option<Numbering>>,
    pins: RwLock<FxHashMap<u32, PinState>>, // keyed by logical pin
}

impl PinRegistry {
    pub fn numbering(&self) -> Option<Numbering> {
        *self.numbering.read()
    }

    pub fn set_numbering(&self, mode: Numbering) -> Result<()> {
        let mut numbering = self.numbering.write();
        match *numbering {
            Some(current) if current != mode => Err(Error::DifferentMode),
            _ => {
                *numbering = Some(mode);
                Ok(())
            }
        }
    }

    pub fn reset_numbering(&self) {
        *self.numbering.write() = None;
    }

    /// Resolves `channel` in the active numbering to a logical pin.
    pub fn resolve(&self, channel: u32) -> Result<u32> {
        match self.numbering() {
            None => Err(Error::ModeNotSet),
            Some(Numbering::Bcm) if channel < GPIO_COUNT => Ok(channel),
            Some(Numbering::Bcm) => Err(Error::InvalidChannel),
            Some(Numbering::Board) => BOARD_MAP
                .iter()
                .find(|(board, _)| *board == channel)
                .map(|(_, gpio)| *gpio)
                .ok_or(Error::InvalidChannel),
        }
    }

    /// Records `pin`'s configuration. A re-setup is marked as warned only
    /// when `warnings` is set.
    pub fn configure(
        &self,
        pin: u32,
        direction: Direction,
        pull: Pull,
        warnings: bool,
    ) -> Configured {
        let mut pins = self.pins.write();
        let mut warn_in_use = false;
        pins.entry(pin)
            .and_modify(|state| {
                warn_in_use = warnings && !state.warned;
                state.warned |= warn_in_use;
                state.direction = direction;
                state.pull = pull;
            })
            .or_insert(PinState {
                direction,
                pull,
                warned: false,
            });
        Configured { warn_in_use }
    }

    pub fn state(&self, pin: u32) -> Option<PinState> {
        self.pins.read().get(&pin).copied()
    }

    pub fn mode_of(&self, pin: u32) -> Option<Direction> {
        self.state(pin).map(|s| s.direction)
    }

    /// Forgets `pin`; returns whether it was configured.
    pub fn release(&self, pin: u32) -> bool {
        self.pins.write().remove(&pin).is_some()
    }

    /// Forgets every pin, returning them in ascending order.
    pub fn release_all(&self) -> Vec<u32> {
        let mut pins: Vec<u32> = self.pins.write().drain().map(|(pin, _)| pin).collect();
        pins.sort_unstable();
        pins
    }
}
