use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Native failure reported by the device boundary. The message is the
/// device's own text and is never reworded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DeviceError(pub String);

impl DeviceError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// The legacy exception class an [`Error`] corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Runtime,
    Value,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "Please set pin numbering mode using GPIO.setmode(GPIO.BOARD) or GPIO.setmode(GPIO.BCM)"
    )]
    ModeNotSet,
    #[error("A different mode has already been set!")]
    DifferentMode,
    #[error("An invalid mode was passed to setmode()")]
    InvalidMode,
    #[error("The channel sent is invalid on a Raspberry Pi")]
    InvalidChannel,
    #[error("An invalid direction was passed to setup()")]
    InvalidDirection,
    #[error("Invalid value for pull_up_down - should be either PUD_OFF, PUD_UP or PUD_DOWN")]
    InvalidPull,
    #[error("pull_up_down parameter is not valid for outputs")]
    PullOnOutput,
    #[error("initial parameter is not valid for inputs")]
    InitialOnInput,
    #[error("You must setup() the GPIO channel first")]
    NotSetUp,
    #[error("You must setup() the GPIO channel as an input first")]
    NotInput,
    #[error("The GPIO channel has not been set up as an OUTPUT")]
    NotOutput,
    #[error("You must setup() the GPIO channel as an output first")]
    PwmNotOutput,
    #[error("Number of channels != number of values")]
    ValueCountMismatch,
    #[error("The edge must be set to RISING, FALLING or BOTH")]
    InvalidEdge,
    #[error("Bouncetime must be greater than 0")]
    InvalidBouncetime,
    #[error("Timeout must be greater than 0")]
    InvalidTimeout,
    #[error("Conflicting edge detection already enabled for this GPIO channel")]
    ConflictingEdge,
    #[error("Add event detection using add_event_detect first before adding a callback")]
    NoEventDetect,
    #[error("A PWM object already exists for this GPIO channel")]
    PwmExists,
    #[error("frequency must be greater than 0.0")]
    InvalidFrequency,
    #[error("dutycycle must have a value from 0.0 to 100.0")]
    InvalidDutyCycle,
    #[error("{0}")]
    UnrecognizedBoard(&'static str),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

pub(crate) const NOT_A_PI: &str = "This module can only be run on a Raspberry Pi!";
pub(crate) const OLD_STYLE_REVISION: &str =
    "This module does not understand old-style revision codes";

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DifferentMode
            | Error::InvalidMode
            | Error::InvalidChannel
            | Error::InvalidDirection
            | Error::InvalidPull
            | Error::PullOnOutput
            | Error::InitialOnInput
            | Error::InvalidEdge
            | Error::InvalidBouncetime
            | Error::InvalidTimeout
            | Error::InvalidFrequency
            | Error::InvalidDutyCycle
            | Error::Config(_) => ErrorKind::Value,
            Error::ModeNotSet
            | Error::NotSetUp
            | Error::NotInput
            | Error::NotOutput
            | Error::PwmNotOutput
            | Error::ValueCountMismatch
            | Error::ConflictingEdge
            | Error::NoEventDetect
            | Error::PwmExists
            | Error::UnrecognizedBoard(_)
            | Error::Device(_) => ErrorKind::Runtime,
        }
    }
}
