use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::warn;
use tokio::sync::broadcast;

use crate::backend::GpioBackend;
use crate::board::RpiInfo;
use crate::config::{Direction, Edge, Level, Numbering, Pull, ShimConfig};
use crate::edge::{EdgeCallback, EdgeEngine, EdgeEvent};
use crate::error::{Error, Result};
use crate::pwm::{Pwm, PwmTable};
use crate::registry::PinRegistry;
use crate::session::DeviceSession;

/// The `RPi.GPIO` release whose behaviour is emulated.
pub const VERSION: &str = "0.7.2";

const PULL_UP_FITTED: &str = "A physical pull up resistor is fitted on this channel!";
const CHANNEL_IN_USE: &str =
    "This channel is already in use, continuing anyway.  Use GPIO.setwarnings(False) to disable warnings.";
const NOTHING_TO_CLEAN: &str = "No channels have been set up yet - nothing to clean up!  Try cleaning up at the end of your program instead!";

/// The process's GPIO context: numbering mode, pin registry, chip session,
/// edge watches and PWM channels.
///
/// Construct one per process. Dropping it releases every pin and closes the
/// chip, swallowing any failure.
pub struct Gpio<B: GpioBackend + 'static> {
    info: RpiInfo,
    registry: PinRegistry,
    session: Arc<DeviceSession<B>>,
    engine: EdgeEngine<B>,
    pwms: Arc<PwmTable>,
    warnings: AtomicBool,
}

impl<B: GpioBackend + 'static> Gpio<B> {
    pub fn new(config: &ShimConfig, backend: Arc<B>) -> Result<Self> {
        let info = RpiInfo::resolve(config)?;
        let chip = config.chip.unwrap_or_else(|| info.default_chip());
        let session = Arc::new(DeviceSession::new(backend, chip));
        let engine = EdgeEngine::new(
            session.clone(),
            config.sample_interval(),
            config.broadcast_capacity,
        );

        Ok(Self {
            info,
            registry: PinRegistry::default(),
            session,
            engine,
            pwms: Arc::new(PwmTable::default()),
            warnings: AtomicBool::new(config.warnings),
        })
    }

    pub fn rpi_info(&self) -> &RpiInfo {
        &self.info
    }

    /// P1 header revision of the resolved board.
    pub fn rpi_revision(&self) -> u8 {
        self.info.p1_revision
    }

    pub fn backend(&self) -> &Arc<B> {
        self.session.backend()
    }

    pub fn getmode(&self) -> Option<Numbering> {
        self.registry.numbering()
    }

    pub fn setmode(&self, mode: Numbering) -> Result<()> {
        self.registry.set_numbering(mode)
    }

    pub fn setwarnings(&self, enabled: bool) {
        self.warnings.store(enabled, Ordering::Relaxed);
    }

    fn warnings(&self) -> bool {
        self.warnings.load(Ordering::Relaxed)
    }

    fn resolve_all(&self, channels: &[u32]) -> Result<Vec<u32>> {
        channels.iter().map(|c| self.registry.resolve(*c)).collect()
    }

    /// Plain input or output only; alternate functions are never reported.
    pub fn gpio_function(&self, channel: u32) -> Result<Direction> {
        let pin = self.registry.resolve(channel)?;
        match self.registry.mode_of(pin) {
            Some(direction) => Ok(direction),
            None => self.session.line_direction(pin),
        }
    }

    pub fn setup(
        &self,
        channel: u32,
        direction: Direction,
        pull: Pull,
        initial: Option<Level>,
    ) -> Result<()> {
        self.setup_many(&[channel], direction, pull, initial)
    }

    pub fn setup_many(
        &self,
        channels: &[u32],
        direction: Direction,
        pull: Pull,
        initial: Option<Level>,
    ) -> Result<()> {
        match direction {
            Direction::Output if pull != Pull::Off => return Err(Error::PullOnOutput),
            Direction::Input if initial.is_some() => return Err(Error::InitialOnInput),
            _ => {}
        }

        for pin in self.resolve_all(channels)? {
            if self.warnings() && matches!(pin, 2 | 3) && pull != Pull::Off {
                warn!("{PULL_UP_FITTED}");
            }
            if direction == Direction::Output {
                self.engine.remove(pin);
            }
            self.session.claim(pin, direction, pull, initial)?;
            let configured = self.registry.configure(pin, direction, pull, self.warnings());
            if configured.warn_in_use {
                warn!("{CHANNEL_IN_USE}");
            }
        }
        Ok(())
    }

    pub fn input(&self, channel: u32) -> Result<Level> {
        let pin = self.registry.resolve(channel)?;
        self.registry.mode_of(pin).ok_or(Error::NotSetUp)?;
        self.session.read(pin)
    }

    pub fn output(&self, channel: u32, level: Level) -> Result<()> {
        self.output_many(&[channel], &[level])
    }

    /// Writes `levels` to `channels` pairwise; a single level is applied to
    /// every channel.
    pub fn output_many(&self, channels: &[u32], levels: &[Level]) -> Result<()> {
        let pins = self.resolve_all(channels)?;
        let levels = match levels {
            [level] if pins.len() > 1 => vec![*level; pins.len()],
            _ if levels.len() == pins.len() => levels.to_vec(),
            _ => return Err(Error::ValueCountMismatch),
        };
        for (pin, level) in pins.into_iter().zip(levels) {
            if self.registry.mode_of(pin) != Some(Direction::Output) {
                return Err(Error::NotOutput);
            }
            self.session.write(pin, level)?;
        }
        Ok(())
    }

    /// Returns the listed channels, or every channel when `channels` is
    /// `None`, to unclaimed inputs with no pull and no edge detection.
    /// Cleaning up everything also stops PWM, closes the chip and forgets
    /// the numbering mode.
    pub fn cleanup(&self, channels: Option<&[u32]>) -> Result<()> {
        if self.registry.numbering().is_none() && !self.session.is_open() {
            return Ok(());
        }
        let pins = match channels {
            Some(channels) => {
                let pins = self.resolve_all(channels)?;
                for pin in &pins {
                    self.registry.release(*pin);
                }
                pins
            }
            None => self.registry.release_all(),
        };
        if pins.is_empty() && self.warnings() {
            warn!("{NOTHING_TO_CLEAN}");
        }

        if channels.is_none() {
            self.engine.remove_all();
            self.pwms.stop_all(&self.session);
        }
        for pin in pins {
            self.reset_line(pin);
        }
        if channels.is_none() {
            self.session.close();
            self.registry.reset_numbering();
        }
        Ok(())
    }

    fn reset_line(&self, pin: u32) {
        self.engine.remove(pin);
        if !self.session.is_open() {
            return;
        }
        if let Err(e) = self.session.claim(pin, Direction::Input, Pull::Off, None) {
            warn!("cleanup of pin {pin}: {e}");
        }
        if let Err(e) = self.session.release(pin) {
            warn!("cleanup of pin {pin}: {e}");
        }
    }

    fn check_input(&self, channel: u32) -> Result<u32> {
        let pin = self.registry.resolve(channel)?;
        if self.registry.mode_of(pin) != Some(Direction::Input) {
            return Err(Error::NotInput);
        }
        Ok(pin)
    }

    /// Blocks until `edge` is seen on `channel`. Returns the channel, or
    /// `None` when `timeout_ms` elapses first.
    pub fn wait_for_edge(
        &self,
        channel: u32,
        edge: Edge,
        bouncetime_ms: Option<u32>,
        timeout_ms: Option<u32>,
    ) -> Result<Option<u32>> {
        let pin = self.check_input(channel)?;
        if bouncetime_ms == Some(0) {
            return Err(Error::InvalidBouncetime);
        }
        if timeout_ms == Some(0) {
            return Err(Error::InvalidTimeout);
        }
        let timeout = timeout_ms.map(|ms| Duration::from_millis(ms.into()));
        self.engine.wait(pin, channel, edge, bouncetime_ms, timeout)
    }

    pub fn add_event_detect(
        &self,
        channel: u32,
        edge: Edge,
        callback: Option<EdgeCallback>,
        bouncetime_ms: Option<u32>,
    ) -> Result<()> {
        let pin = self.check_input(channel)?;
        if bouncetime_ms == Some(0) {
            return Err(Error::InvalidBouncetime);
        }
        self.engine.add(pin, channel, edge, bouncetime_ms, callback)
    }

    pub fn add_event_callback<F>(&self, channel: u32, callback: F) -> Result<()>
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        let pin = self.check_input(channel)?;
        self.engine.add_callback(pin, Arc::new(callback))
    }

    pub fn remove_event_detect(&self, channel: u32) -> Result<()> {
        let pin = self.registry.resolve(channel)?;
        self.engine.remove(pin);
        Ok(())
    }

    /// Whether an edge was reported since the last call; clears the latch.
    pub fn event_detected(&self, channel: u32) -> Result<bool> {
        let pin = self.registry.resolve(channel)?;
        Ok(self.engine.event_detected(pin))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EdgeEvent> {
        self.engine.subscribe()
    }

    pub fn pwm(&self, channel: u32, frequency: f64) -> Result<Pwm<B>> {
        let pin = self.registry.resolve(channel)?;
        if self.pwms.contains(pin) {
            return Err(Error::PwmExists);
        }
        if self.registry.mode_of(pin) != Some(Direction::Output) {
            return Err(Error::PwmNotOutput);
        }
        Pwm::new(
            pin,
            channel,
            frequency,
            self.session.clone(),
            self.pwms.clone(),
        )
    }
}

impl<B: GpioBackend + 'static> Drop for Gpio<B> {
    fn drop(&mut self) {
        self.engine.remove_all();
        self.pwms.stop_all(&self.session);
        for pin in self.registry.release_all() {
            self.reset_line(pin);
        }
        self.session.close();
    }
}
