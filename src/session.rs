use std::sync::Arc;

use log::{debug, info};
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use rustc_hash::FxHashMap;

use crate::backend::GpioBackend;
use crate::config::{Direction, Level, Pull};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub direction: Direction,
    pub pull: Pull,
}

/// The single open chip handle and the lines claimed through it.
pub struct DeviceSession<B: GpioBackend> {
    backend: Arc<B>,
    chip: u32,
    open: Mutex<bool>,
    claims: RwLock<FxHashMap<u32, Mutex<Claim>>>, // keyed by logical pin
}

impl<B: GpioBackend> DeviceSession<B> {
    pub fn new(backend: Arc<B>, chip: u32) -> Self {
        Self {
            backend,
            chip,
            open: Mutex::new(false),
            claims: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn chip(&self) -> u32 {
        self.chip
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    fn ensure_open(&self) -> Result<()> {
        let mut open = self.open.lock();
        if !*open {
            self.backend.open_chip(self.chip)?;
            info!("opened gpiochip{}", self.chip);
            *open = true;
        }
        Ok(())
    }

    fn request(&self, pin: u32, direction: Direction, pull: Pull, level: Level) -> Result<()> {
        match direction {
            Direction::Input => self.backend.claim_input(pin, pull)?,
            Direction::Output => self.backend.claim_output(pin, level, pull)?,
        }
        Ok(())
    }

    /// Claims `pin`, or releases and re-claims it when this session already
    /// holds it. An output without `initial` keeps the line's current level.
    pub fn claim(
        &self,
        pin: u32,
        direction: Direction,
        pull: Pull,
        initial: Option<Level>,
    ) -> Result<()> {
        self.ensure_open()?;
        let level = match (direction, initial) {
            (Direction::Output, None) => self.backend.read(pin)?,
            (_, initial) => initial.unwrap_or_default(),
        };

        let claims = self.claims.upgradable_read();
        if let Some(claim) = claims.get(&pin) {
            let mut claim = claim.lock();
            // no in-place direction change on the device
            let _ = self.backend.release(pin);
            match self.request(pin, direction, pull, level) {
                Ok(()) => {
                    debug!("reclaimed pin {pin} as {direction:?}");
                    *claim = Claim { direction, pull };
                    return Ok(());
                }
                Err(e) => {
                    drop(claim);
                    RwLockUpgradableReadGuard::upgrade(claims).remove(&pin);
                    return Err(e);
                }
            }
        }

        // the upgradable read lock is exclusive, so no one else can insert `pin` meanwhile
        self.request(pin, direction, pull, level)?;
        debug!("claimed pin {pin} as {direction:?}");
        RwLockUpgradableReadGuard::upgrade(claims)
            .insert(pin, Mutex::new(Claim { direction, pull }));
        Ok(())
    }

    pub fn claim_of(&self, pin: u32) -> Option<Claim> {
        self.claims.read().get(&pin).map(|c| *c.lock())
    }

    pub fn release(&self, pin: u32) -> Result<()> {
        let claim = self.claims.write().remove(&pin);
        if claim.is_some() {
            self.backend.release(pin)?;
            debug!("released pin {pin}");
        }
        Ok(())
    }

    pub fn read(&self, pin: u32) -> Result<Level> {
        let claims = self.claims.read();
        let _claim = claims.get(&pin).map(|c| c.lock());
        Ok(self.backend.read(pin)?)
    }

    pub fn write(&self, pin: u32, level: Level) -> Result<()> {
        let claims = self.claims.read();
        let _claim = claims.get(&pin).map(|c| c.lock());
        Ok(self.backend.write(pin, level)?)
    }

    pub fn tx_pwm(&self, pin: u32, frequency: f64, duty_cycle: f64) -> Result<()> {
        let claims = self.claims.read();
        let _claim = claims.get(&pin).map(|c| c.lock());
        Ok(self.backend.tx_pwm(pin, frequency, duty_cycle)?)
    }

    pub fn line_direction(&self, pin: u32) -> Result<Direction> {
        self.ensure_open()?;
        Ok(self.backend.line_direction(pin)?)
    }

    /// Drops every claim and closes the chip; a no-op when never opened.
    pub fn close(&self) {
        let mut open = self.open.lock();
        if *open {
            self.claims.write().clear();
            self.backend.close_chip();
            info!("closed gpiochip{}", self.chip);
            *open = false;
        }
    }
}
