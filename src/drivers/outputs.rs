use embassy_stm32::gpio::{AnyPin, Input, Output};
use embassy_stm32::peripherals::TIM5;
use embassy_stm32::time::{hz, khz};
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_stm32::timer::Channel;
use sidecar_core::io::{Alert, Annunciator, DigitalInput, PowerRail, StatusLed};

use crate::drivers::lamps::scale_duty;

// ── Power button ──────────────────────────────────────────────────────────────

pub struct ButtonInput {
    pin: Input<'static, AnyPin>,
}

impl ButtonInput {
    pub fn new(pin: Input<'static, AnyPin>) -> Self {
        Self { pin }
    }
}

impl DigitalInput for ButtonInput {
    fn is_high(&mut self) -> bool {
        self.pin.is_high()
    }
}

/// Ring LED on TIM5 CH1. Blinking reuses the same channel with the timer
/// slowed down to a visible rate.
pub struct ButtonLed {
    pwm: SimplePwm<'static, TIM5>,
}

impl ButtonLed {
    const CH: Channel = Channel::Ch1;

    pub fn new(mut pwm: SimplePwm<'static, TIM5>) -> Self {
        pwm.set_duty(Self::CH, 0);
        pwm.enable(Self::CH);
        Self { pwm }
    }
}

impl StatusLed for ButtonLed {
    fn set_duty(&mut self, duty: u16) {
        let max = self.pwm.get_max_duty();
        self.pwm.set_duty(Self::CH, scale_duty(duty, max));
    }

    fn set_blink(&mut self, blink: bool) {
        if blink {
            self.pwm.set_frequency(hz(2));
            let max = self.pwm.get_max_duty();
            self.pwm.set_duty(Self::CH, max / 2);
        } else {
            self.pwm.set_frequency(khz(1));
        }
    }
}

// ── Load switch ───────────────────────────────────────────────────────────────

pub struct LoadFets {
    pin: Output<'static, AnyPin>,
}

impl LoadFets {
    pub fn new(pin: Output<'static, AnyPin>) -> Self {
        Self { pin }
    }
}

impl PowerRail for LoadFets {
    fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

// ── Alerts ────────────────────────────────────────────────────────────────────

/// No buzzer is populated on this board revision; alerts go to the log.
pub struct LogAnnunciator;

impl Annunciator for LogAnnunciator {
    fn alert(&mut self, alert: Alert) {
        defmt::info!("alert: {}", alert);
    }
}
