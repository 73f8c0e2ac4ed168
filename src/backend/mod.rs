#[cfg(feature = "hardware-gpio")]
pub mod libgpiod;
pub mod mock;

#[cfg(feature = "hardware-gpio")]
pub use libgpiod::LibgpiodBackend;
pub use mock::{MockChip, MockGpioBackend};

use crate::config::{Direction, Level, Pull};
use crate::error::DeviceError;

/// The device boundary: one open gpiochip handle owned by one process.
///
/// Every call fails fast with the device's own message; callers surface it
/// unchanged.
pub trait GpioBackend: Send + Sync {
    fn open_chip(&self, chip: u32) -> Result<(), DeviceError>;
    /// Releases every line still claimed through this handle, then closes it.
    fn close_chip(&self);
    fn claim_input(&self, line: u32, pull: Pull) -> Result<(), DeviceError>;
    fn claim_output(&self, line: u32, level: Level, pull: Pull) -> Result<(), DeviceError>;
    fn release(&self, line: u32) -> Result<(), DeviceError>;
    fn read(&self, line: u32) -> Result<Level, DeviceError>;
    fn write(&self, line: u32, level: Level) -> Result<(), DeviceError>;
    /// Starts pulse output on a claimed output line; a frequency of zero stops it.
    fn tx_pwm(&self, line: u32, frequency: f64, duty_cycle: f64) -> Result<(), DeviceError>;
    fn line_direction(&self, line: u32) -> Result<Direction, DeviceError>;
}
