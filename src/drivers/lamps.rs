use embassy_stm32::peripherals::TIM4;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_stm32::timer::Channel;
use sidecar_core::io::{LampDriver, FULL_DUTY};

const TAIL: Channel = Channel::Ch3;
const HEAD: Channel = Channel::Ch4;

/// Per-mille duty to timer compare value.
pub fn scale_duty(duty: u16, max: u16) -> u16 {
    (duty.min(FULL_DUTY) as u32 * max as u32 / FULL_DUTY as u32) as u16
}

/// PWM dimming inputs of the two constant-current lamp drivers.
pub struct Lamps {
    pwm: SimplePwm<'static, TIM4>,
    max: u16,
}

impl Lamps {
    pub fn new(mut pwm: SimplePwm<'static, TIM4>) -> Self {
        let max = pwm.get_max_duty();
        for ch in [TAIL, HEAD] {
            pwm.set_duty(ch, 0);
            pwm.enable(ch);
        }
        Self { pwm, max }
    }
}

impl LampDriver for Lamps {
    fn set_head(&mut self, duty: u16) {
        self.pwm.set_duty(HEAD, scale_duty(duty, self.max));
    }

    fn set_tail(&mut self, duty: u16) {
        self.pwm.set_duty(TAIL, scale_duty(duty, self.max));
    }
}
