use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::backend::GpioBackend;
use crate::config::Level;
use crate::error::{Error, Result};
use crate::session::DeviceSession;

#[derive(Debug, Clone, Copy)]
struct PwmChannel {
    frequency: f64,
    duty_cycle: f64,
    running: bool,
}

fn check_frequency(frequency: f64) -> Result<f64> {
    if frequency > 0.0 && frequency.is_finite() {
        Ok(frequency)
    } else {
        Err(Error::InvalidFrequency)
    }
}

fn check_duty_cycle(duty_cycle: f64) -> Result<f64> {
    if (0.0..=100.0).contains(&duty_cycle) {
        Ok(duty_cycle)
    } else {
        Err(Error::InvalidDutyCycle)
    }
}

/// Live PWM channels, at most one per logical pin.
#[derive(Default)]
pub(crate) struct PwmTable {
    channels: Mutex<FxHashMap<u32, Arc<Mutex<PwmChannel>>>>,
}

impl PwmTable {
    pub(crate) fn contains(&self, pin: u32) -> bool {
        self.channels.lock().contains_key(&pin)
    }

    /// Stops every running channel ahead of closing the session.
    pub(crate) fn stop_all<B: GpioBackend>(&self, session: &DeviceSession<B>) {
        for (pin, channel) in self.channels.lock().iter() {
            let mut channel = channel.lock();
            if channel.running {
                if let Err(e) = session.tx_pwm(*pin, 0.0, 0.0) {
                    warn!("stopping PWM on pin {pin}: {e}");
                }
                channel.running = false;
            }
        }
    }
}

/// Software pulse output on one pin.
///
/// Reconfiguring the pin as an input does not invalidate the channel; the
/// next operation on it fails with the device's own error instead. Dropping
/// the channel stops it.
pub struct Pwm<B: GpioBackend> {
    pin: u32,
    channel: u32,
    state: Arc<Mutex<PwmChannel>>,
    session: Arc<DeviceSession<B>>,
    table: Arc<PwmTable>,
}

impl<B: GpioBackend> Pwm<B> {
    pub(crate) fn new(
        pin: u32,
        channel: u32,
        frequency: f64,
        session: Arc<DeviceSession<B>>,
        table: Arc<PwmTable>,
    ) -> Result<Self> {
        let frequency = check_frequency(frequency)?;
        let state = Arc::new(Mutex::new(PwmChannel {
            frequency,
            duty_cycle: 0.0,
            running: false,
        }));
        {
            let mut channels = table.channels.lock();
            if channels.contains_key(&pin) {
                return Err(Error::PwmExists);
            }
            channels.insert(pin, state.clone());
        }
        debug!("created PWM on pin {pin} at {frequency}Hz");
        Ok(Self {
            pin,
            channel,
            state,
            session,
            table,
        })
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub fn frequency(&self) -> f64 {
        self.state.lock().frequency
    }

    pub fn duty_cycle(&self) -> f64 {
        self.state.lock().duty_cycle
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn start(&self, duty_cycle: f64) -> Result<()> {
        let duty_cycle = check_duty_cycle(duty_cycle)?;
        let mut state = self.state.lock();
        state.duty_cycle = duty_cycle;
        self.session.tx_pwm(self.pin, state.frequency, duty_cycle)?;
        state.running = true;
        Ok(())
    }

    /// Stops pulse output and drives the pin low. Stopping a stopped channel
    /// only repeats the low write.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        let _ = self.session.tx_pwm(self.pin, 0.0, 0.0);
        self.session.write(self.pin, Level::Low)?;
        state.running = false;
        Ok(())
    }

    pub fn change_duty_cycle(&self, duty_cycle: f64) -> Result<()> {
        let duty_cycle = check_duty_cycle(duty_cycle)?;
        let mut state = self.state.lock();
        state.duty_cycle = duty_cycle;
        if state.running {
            self.session.tx_pwm(self.pin, state.frequency, duty_cycle)?;
        }
        Ok(())
    }

    pub fn change_frequency(&self, frequency: f64) -> Result<()> {
        let frequency = check_frequency(frequency)?;
        let mut state = self.state.lock();
        state.frequency = frequency;
        if state.running {
            self.session.tx_pwm(self.pin, frequency, state.duty_cycle)?;
        }
        Ok(())
    }
}

impl<B: GpioBackend> Drop for Pwm<B> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("stopping PWM on pin {}: {e}", self.pin);
        }
        self.table.channels.lock().remove(&self.pin);
    }
}
