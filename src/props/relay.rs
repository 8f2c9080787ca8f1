//! GPIO relay outputs driven by prop callbacks

use rppal::gpio::{Gpio, OutputPin};
use tracing::{debug, warn};

/// One relay output. Without GPIO access it only tracks and logs its state,
/// so the same prop wiring runs on a development machine.
#[derive(Debug)]
pub struct Relay {
    pin_number: u8,
    pin: Option<OutputPin>,
    energized: bool,
}

impl Relay {
    pub fn open(gpio: Option<&Gpio>, pin_number: u8) -> Self {
        let pin = gpio.and_then(|gpio| match gpio.get(pin_number) {
            Ok(pin) => Some(pin.into_output_low()),
            Err(e) => {
                warn!(
                    "GPIO {} unavailable, relay runs log-only: {}",
                    pin_number, e
                );
                None
            }
        });
        Self {
            pin_number,
            pin,
            energized: false,
        }
    }

    pub fn detached(pin_number: u8) -> Self {
        Self::open(None, pin_number)
    }

    pub fn is_attached(&self) -> bool {
        self.pin.is_some()
    }

    pub fn is_energized(&self) -> bool {
        self.energized
    }

    pub fn set(&mut self, energized: bool) {
        self.energized = energized;
        match self.pin.as_mut() {
            Some(pin) if energized => pin.set_high(),
            Some(pin) => pin.set_low(),
            None => debug!("Relay {} (detached) -> {}", self.pin_number, energized),
        }
    }
}

/// Opens the GPIO controller, `None` when not running on a Raspberry Pi.
pub fn open_gpio() -> Option<Gpio> {
    match Gpio::new() {
        Ok(gpio) => Some(gpio),
        Err(e) => {
            warn!("GPIO not available, relays are disabled: {}", e);
            None
        }
    }
}
