use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::backend::GpioBackend;
use crate::config::{Direction, Level, Pull};
use crate::error::DeviceError;

const CANNOT_OPEN: &str = "can not open gpiochip";
const BAD_HANDLE: &str = "unknown handle";
const BAD_GPIO: &str = "bad GPIO number";
const BUSY: &str = "GPIO busy";
const NOT_ALLOCATED: &str = "GPIO not allocated";
const NOT_OUTPUT: &str = "GPIO not set as an output";
const BAD_PWM_FREQUENCY: &str = "bad PWM frequency";

/// An in-memory gpiochip that several [`MockGpioBackend`] handles can share,
/// each standing in for a separate process.
pub struct MockChip {
    number: u32,
    lines: Mutex<Vec<MockLine>>,
    next_owner: AtomicU32,
}

#[derive(Clone)]
struct MockLine {
    owner: Option<u32>,
    direction: Direction,
    pull: Pull,
    driven: Option<Level>,
    output: Level,
    pwm: Option<(f64, f64)>,
}

impl Default for MockLine {
    fn default() -> Self {
        Self {
            owner: None,
            direction: Direction::Input,
            pull: Pull::Off,
            driven: None,
            output: Level::Low,
            pwm: None,
        }
    }
}

impl MockLine {
    fn level(&self) -> Level {
        match self.direction {
            Direction::Output => self.output,
            Direction::Input => self
                .driven
                .unwrap_or(Level::from(self.pull == Pull::Up)),
        }
    }
}

impl MockChip {
    pub fn new(number: u32, num_lines: u32) -> Arc<Self> {
        Arc::new(Self {
            number,
            lines: Mutex::new(vec![MockLine::default(); num_lines as usize]),
            next_owner: AtomicU32::new(1),
        })
    }

    fn lines(&self) -> MutexGuard<'_, Vec<MockLine>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drives `line` externally, as a button or signal generator would.
    pub fn drive(&self, line: u32, level: Level) {
        if let Some(l) = self.lines().get_mut(line as usize) {
            l.driven = Some(level);
        }
    }

    /// Stops driving `line`, leaving it to its pull.
    pub fn float(&self, line: u32) {
        if let Some(l) = self.lines().get_mut(line as usize) {
            l.driven = None;
        }
    }

    pub fn level(&self, line: u32) -> Level {
        self.lines()
            .get(line as usize)
            .map(MockLine::level)
            .unwrap_or_default()
    }

    pub fn pull(&self, line: u32) -> Pull {
        self.lines()
            .get(line as usize)
            .map(|l| l.pull)
            .unwrap_or_default()
    }

    /// Frequency and duty cycle of the pulse output on `line`, if running.
    pub fn pwm(&self, line: u32) -> Option<(f64, f64)> {
        self.lines().get(line as usize).and_then(|l| l.pwm)
    }

    pub fn is_claimed(&self, line: u32) -> bool {
        self.lines()
            .get(line as usize)
            .is_some_and(|l| l.owner.is_some())
    }
}

pub struct MockGpioBackend {
    chip: Arc<MockChip>,
    owner: u32,
    open: AtomicBool,
}

impl Default for MockGpioBackend {
    fn default() -> Self {
        Self::new(MockChip::new(0, 54))
    }
}

impl MockGpioBackend {
    pub fn new(chip: Arc<MockChip>) -> Self {
        let owner = chip.next_owner.fetch_add(1, Ordering::Relaxed);
        Self {
            chip,
            owner,
            open: AtomicBool::new(false),
        }
    }

    pub fn chip(&self) -> &Arc<MockChip> {
        &self.chip
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<MockLine>>, DeviceError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(DeviceError::new(BAD_HANDLE));
        }
        self.chip
            .lines
            .lock()
            .map_err(|e| DeviceError(format!("lock poisoned: {e}")))
    }

    fn claim(
        &self,
        line: u32,
        direction: Direction,
        level: Level,
        pull: Pull,
    ) -> Result<(), DeviceError> {
        let mut lines = self.lock()?;
        let l = lines
            .get_mut(line as usize)
            .ok_or_else(|| DeviceError::new(BAD_GPIO))?;
        if l.owner.is_some_and(|o| o != self.owner) {
            return Err(DeviceError::new(BUSY));
        }
        l.owner = Some(self.owner);
        l.direction = direction;
        l.pull = pull;
        l.pwm = None;
        if direction == Direction::Output {
            l.output = level;
        }
        Ok(())
    }

    fn owned<'a>(
        &self,
        lines: &'a mut [MockLine],
        line: u32,
    ) -> Result<&'a mut MockLine, DeviceError> {
        let l = lines
            .get_mut(line as usize)
            .ok_or_else(|| DeviceError::new(BAD_GPIO))?;
        if l.owner != Some(self.owner) {
            return Err(DeviceError::new(NOT_ALLOCATED));
        }
        Ok(l)
    }
}

impl GpioBackend for MockGpioBackend {
    fn open_chip(&self, chip: u32) -> Result<(), DeviceError> {
        if chip != self.chip.number {
            return Err(DeviceError::new(CANNOT_OPEN));
        }
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    fn close_chip(&self) {
        for l in self.chip.lines().iter_mut() {
            if l.owner == Some(self.owner) {
                l.owner = None;
                l.pwm = None;
            }
        }
        self.open.store(false, Ordering::Release);
    }

    fn claim_input(&self, line: u32, pull: Pull) -> Result<(), DeviceError> {
        self.claim(line, Direction::Input, Level::Low, pull)
    }

    fn claim_output(&self, line: u32, level: Level, pull: Pull) -> Result<(), DeviceError> {
        self.claim(line, Direction::Output, level, pull)
    }

    fn release(&self, line: u32) -> Result<(), DeviceError> {
        let mut lines = self.lock()?;
        let l = self.owned(&mut lines, line)?;
        l.owner = None;
        l.pwm = None;
        Ok(())
    }

    fn read(&self, line: u32) -> Result<Level, DeviceError> {
        let lines = self.lock()?;
        let l = lines
            .get(line as usize)
            .ok_or_else(|| DeviceError::new(BAD_GPIO))?;
        if l.owner.is_some_and(|o| o != self.owner) {
            return Err(DeviceError::new(BUSY));
        }
        Ok(l.level())
    }

    fn write(&self, line: u32, level: Level) -> Result<(), DeviceError> {
        let mut lines = self.lock()?;
        let l = self.owned(&mut lines, line)?;
        if l.direction != Direction::Output {
            return Err(DeviceError::new(NOT_OUTPUT));
        }
        l.output = level;
        Ok(())
    }

    fn tx_pwm(&self, line: u32, frequency: f64, duty_cycle: f64) -> Result<(), DeviceError> {
        let mut lines = self.lock()?;
        let l = self.owned(&mut lines, line)?;
        if l.direction != Direction::Output {
            return Err(DeviceError::new(NOT_OUTPUT));
        }
        if frequency > 0.0 && Duration::try_from_secs_f64(1.0 / frequency).is_err() {
            return Err(DeviceError::new(BAD_PWM_FREQUENCY));
        }
        l.pwm = (frequency > 0.0).then_some((frequency, duty_cycle));
        Ok(())
    }

    fn line_direction(&self, line: u32) -> Result<Direction, DeviceError> {
        let lines = self.lock()?;
        lines
            .get(line as usize)
            .map(|l| l.direction)
            .ok_or_else(|| DeviceError::new(BAD_GPIO))
    }
}
