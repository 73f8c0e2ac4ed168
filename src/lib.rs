mod backend;
mod board;
mod config;
mod edge;
mod error;
mod gpio;
mod pwm;
mod registry;
mod session;

pub use board::{RpiInfo, parse_revision, read_revision};
pub use config::{Direction, Edge, Level, Numbering, Pull, ShimConfig};
pub use edge::{Debouncer, EdgeCallback, EdgeEngine, EdgeEvent};
pub use error::{DeviceError, Error, ErrorKind, Result};
pub use gpio::{Gpio, VERSION};
pub use pwm::Pwm;
pub use registry::{Configured, GPIO_COUNT, PinRegistry, PinState, board_pins};
pub use session::{Claim, DeviceSession};

#[cfg(feature = "hardware-gpio")]
pub use backend::LibgpiodBackend;
pub use backend::{GpioBackend, MockChip, MockGpioBackend};
