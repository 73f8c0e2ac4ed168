use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use libgpiod::{chip::Chip, line, request};
use parking_lot::{FairMutex, RwLock};
use rustc_hash::FxHashMap;

use crate::backend::GpioBackend;
use crate::config::{Direction, Level, Pull};
use crate::error::DeviceError;

const NOT_OPEN: &str = "unknown handle";
const NOT_ALLOCATED: &str = "GPIO not allocated";
const NOT_OUTPUT: &str = "GPIO not set as an output";
const BAD_PWM_FREQUENCY: &str = "bad PWM frequency";

fn native(e: libgpiod::Error) -> DeviceError {
    DeviceError(e.to_string())
}

/// Backend driving `/dev/gpiochipN` through libgpiod, one request per line.
pub struct LibgpiodBackend {
    chip: RwLock<Option<PathBuf>>,
    lines: RwLock<FxHashMap<u32, LineHandle>>, // keyed by line offset
}

struct LineHandle {
    pwm: Option<PwmWorker>, // joined before the request is released
    direction: Direction,
    gpiod_handle: Arc<FairMutex<GpiodHandle>>,
}

struct GpiodHandle {
    request: request::Request,
}

impl GpiodHandle {
    fn new(chip: &Path, line_cfg: &line::Config) -> Result<Self, DeviceError> {
        let chip = Self::open_chip(chip)?;
        let request = Self::request_lines(&chip, line_cfg)?;
        Ok(Self { request })
    }

    fn open_chip(path: &Path) -> Result<Chip, DeviceError> {
        Chip::open(&path.to_path_buf()).map_err(native)
    }

    fn request_lines(
        chip: &Chip,
        line_cfg: &line::Config,
    ) -> Result<request::Request, DeviceError> {
        let mut req_cfg = request::Config::new().map_err(native)?;
        req_cfg.set_consumer(env!("CARGO_PKG_NAME")).map_err(native)?;
        chip.request_lines(Some(&req_cfg), line_cfg).map_err(native)
    }

    fn set(&mut self, offset: u32, level: Level) -> Result<(), DeviceError> {
        let value = match level {
            Level::Low => line::Value::InActive,
            Level::High => line::Value::Active,
        };
        self.request.set_value(offset, value).map_err(native)?;
        Ok(())
    }
}

/// Software pulse generator toggling one requested line.
struct PwmWorker {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PwmWorker {
    fn new(
        offset: u32,
        gpiod_handle: Arc<FairMutex<GpiodHandle>>,
        frequency: f64,
        duty_cycle: f64,
    ) -> Result<Self, DeviceError> {
        let period = Duration::try_from_secs_f64(1.0 / frequency)
            .map_err(|_| DeviceError::new(BAD_PWM_FREQUENCY))?;
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();
        let high = period.mul_f64(duty_cycle / 100.0);
        let low = period.saturating_sub(high);

        let handle = std::thread::spawn(move || {
            while !cancel_flag.load(Ordering::Relaxed) {
                for (level, span) in [(Level::High, high), (Level::Low, low)] {
                    if span.is_zero() {
                        continue;
                    }
                    if let Err(e) = gpiod_handle.lock().set(offset, level) {
                        warn!("pulse output stopped on line {offset}: {e}");
                        return;
                    }
                    std::thread::sleep(span);
                }
            }
        });

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }
}

impl Drop for PwmWorker {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl LibgpiodBackend {
    pub fn new() -> Result<Self, DeviceError> {
        Ok(Self {
            chip: RwLock::new(None),
            lines: RwLock::new(FxHashMap::default()),
        })
    }

    fn chip_path(&self) -> Result<PathBuf, DeviceError> {
        self.chip
            .read()
            .clone()
            .ok_or_else(|| DeviceError::new(NOT_OPEN))
    }

    fn make_line_config(
        offset: u32,
        direction: Option<Direction>,
        pull: Pull,
        level: Level,
    ) -> Result<line::Config, DeviceError> {
        let mut ls = line::Settings::new().map_err(native)?;
        match direction {
            Some(Direction::Input) => {
                ls.set_direction(line::Direction::Input).map_err(native)?;
            }
            Some(Direction::Output) => {
                ls.set_direction(line::Direction::Output).map_err(native)?;
                ls.set_output_value(match level {
                    Level::Low => line::Value::InActive,
                    Level::High => line::Value::Active,
                })
                .map_err(native)?;
            }
            None => {}
        }
        if direction.is_some() {
            ls.set_bias(Some(match pull {
                Pull::Off => line::Bias::Disabled,
                Pull::Down => line::Bias::PullDown,
                Pull::Up => line::Bias::PullUp,
            }))
            .map_err(native)?;
        }

        let mut cfg = line::Config::new().map_err(native)?;
        cfg.add_line_settings(&[offset], ls).map_err(native)?;
        Ok(cfg)
    }

    fn claim(
        &self,
        offset: u32,
        direction: Direction,
        level: Level,
        pull: Pull,
    ) -> Result<(), DeviceError> {
        let chip = self.chip_path()?;
        let mut lines = self.lines.write();
        // the kernel rejects a second request from this process too
        drop(lines.remove(&offset));

        let line_cfg = Self::make_line_config(offset, Some(direction), pull, level)?;
        let gpiod_handle = Arc::new(FairMutex::new(GpiodHandle::new(&chip, &line_cfg)?));
        lines.insert(
            offset,
            LineHandle {
                pwm: None,
                direction,
                gpiod_handle,
            },
        );
        Ok(())
    }
}

impl GpioBackend for LibgpiodBackend {
    fn open_chip(&self, chip: u32) -> Result<(), DeviceError> {
        let path = PathBuf::from(format!("/dev/gpiochip{chip}"));
        drop(GpiodHandle::open_chip(&path)?);
        debug!("opened {}", path.display());
        *self.chip.write() = Some(path);
        Ok(())
    }

    fn close_chip(&self) {
        self.lines.write().clear();
        *self.chip.write() = None;
    }

    fn claim_input(&self, line: u32, pull: Pull) -> Result<(), DeviceError> {
        self.claim(line, Direction::Input, Level::Low, pull)
    }

    fn claim_output(&self, line: u32, level: Level, pull: Pull) -> Result<(), DeviceError> {
        self.claim(line, Direction::Output, level, pull)
    }

    fn release(&self, line: u32) -> Result<(), DeviceError> {
        self.lines
            .write()
            .remove(&line)
            .map(drop)
            .ok_or_else(|| DeviceError::new(NOT_ALLOCATED))
    }

    fn read(&self, line: u32) -> Result<Level, DeviceError> {
        let value = match self.lines.read().get(&line) {
            Some(handle) => handle.gpiod_handle.lock().request.value(line).map_err(native)?,
            None => {
                // briefly request the line as-is, leaving its direction alone
                let line_cfg = Self::make_line_config(line, None, Pull::Off, Level::Low)?;
                let handle = GpiodHandle::new(&self.chip_path()?, &line_cfg)?;
                handle.request.value(line).map_err(native)?
            }
        };
        Ok(match value {
            line::Value::InActive => Level::Low,
            line::Value::Active => Level::High,
        })
    }

    fn write(&self, line: u32, level: Level) -> Result<(), DeviceError> {
        let lines = self.lines.read();
        let handle = lines
            .get(&line)
            .ok_or_else(|| DeviceError::new(NOT_ALLOCATED))?;
        if handle.direction != Direction::Output {
            return Err(DeviceError::new(NOT_OUTPUT));
        }
        handle.gpiod_handle.lock().set(line, level)
    }

    fn tx_pwm(&self, line: u32, frequency: f64, duty_cycle: f64) -> Result<(), DeviceError> {
        let mut lines = self.lines.write();
        let handle = lines
            .get_mut(&line)
            .ok_or_else(|| DeviceError::new(NOT_ALLOCATED))?;
        if handle.direction != Direction::Output {
            return Err(DeviceError::new(NOT_OUTPUT));
        }
        drop(handle.pwm.take());
        if frequency > 0.0 {
            handle.pwm = Some(PwmWorker::new(
                line,
                handle.gpiod_handle.clone(),
                frequency,
                duty_cycle,
            )?);
        }
        Ok(())
    }

    fn line_direction(&self, line: u32) -> Result<Direction, DeviceError> {
        if let Some(handle) = self.lines.read().get(&line) {
            return Ok(handle.direction);
        }
        let chip = GpiodHandle::open_chip(&self.chip_path()?)?;
        let info = chip.line_info(line).map_err(native)?;
        Ok(match info.direction().map_err(native)? {
            line::Direction::Output => Direction::Output,
            _ => Direction::Input,
        })
    }
}
