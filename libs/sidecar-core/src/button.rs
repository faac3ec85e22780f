//! Power pushbutton: press classification and the ring LED.
//!
//! The button input is high while pressed. Samples are taken every
//! `ButtonConfig::sample_period_ms` and only acted on once two consecutive
//! samples agree.

use embassy_time::{Duration, Instant, Timer};

use crate::config::{ButtonConfig, LedConfig};
use crate::io::{DigitalInput, StatusLed, FULL_DUTY};
use crate::sync::{CancelToken, EventFlags, WaitMode};

pub mod event {
    pub const RELEASED: u32 = 1 << 0;
    /// Released before the short-press time.
    pub const BUMPED: u32 = 1 << 1;
    pub const SHORT_PRESSED: u32 = 1 << 2;
    pub const LONG_PRESSED: u32 = 1 << 3;
    pub const ALL: u32 = 0x0F;
}

pub mod led {
    pub const ON: u32 = 1 << 0;
    pub const OFF: u32 = 1 << 1;
    pub const FADE: u32 = 1 << 2;
    pub const FLASH: u32 = 1 << 3;
    pub const ALL: u32 = 0x0F;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LedCommand {
    On,
    Off,
    Fade,
    Flash,
}

/// Highest priority first.
const LED_DISPATCH: [(u32, LedCommand); 4] = [
    (led::FLASH, LedCommand::Flash),
    (led::FADE, LedCommand::Fade),
    (led::ON, LedCommand::On),
    (led::OFF, LedCommand::Off),
];

pub fn select_command(bits: u32) -> Option<(u32, LedCommand)> {
    LED_DISPATCH.into_iter().find(|(mask, _)| bits & mask != 0)
}

// ── Classifier ────────────────────────────────────────────────────────────────

/// Turns settled samples into press events.
pub struct PressClassifier {
    last_sample: bool,
    held: bool,
    pressed_at_ms: u64,
    short_sent: bool,
    long_sent: bool,
    short_press_ms: u64,
    long_press_ms: u64,
}

impl PressClassifier {
    pub fn new(config: &ButtonConfig) -> Self {
        Self {
            last_sample: false,
            held: false,
            pressed_at_ms: 0,
            short_sent: false,
            long_sent: false,
            short_press_ms: config.short_press_ms,
            long_press_ms: config.long_press_ms,
        }
    }

    /// Feeds one raw sample; returns the event bits to raise.
    pub fn sample(&mut self, pressed: bool, now_ms: u64) -> u32 {
        let settled = pressed == self.last_sample;
        self.last_sample = pressed;
        if !settled {
            return 0;
        }

        let mut events = 0;
        if pressed {
            if !self.held {
                self.held = true;
                self.pressed_at_ms = now_ms;
            }
            let elapsed = now_ms.saturating_sub(self.pressed_at_ms);
            if !self.short_sent && elapsed > self.short_press_ms {
                self.short_sent = true;
                events |= event::SHORT_PRESSED;
            }
            if !self.long_sent && elapsed > self.long_press_ms {
                self.long_sent = true;
                events |= event::LONG_PRESSED;
            }
        } else if self.held {
            self.held = false;
            if now_ms.saturating_sub(self.pressed_at_ms) < self.short_press_ms {
                events |= event::BUMPED;
            }
            events |= event::RELEASED;
            self.short_sent = false;
            self.long_sent = false;
        }
        events
    }
}

/// Triangle ramp for the "waiting" LED fade.
pub struct FadeRamp {
    duty: u16,
    step: i32,
    step_size: u16,
    top: u16,
}

impl FadeRamp {
    pub fn new(config: &LedConfig) -> Self {
        Self {
            duty: 0,
            step: config.fade_step as i32,
            step_size: config.fade_step,
            top: config.fade_top,
        }
    }

    /// Advances one step and returns the duty to apply.
    pub fn next(&mut self) -> u16 {
        if self.duty > self.top {
            self.step = -(self.step_size as i32);
        } else if self.duty < self.step_size {
            self.step = self.step_size as i32;
        }
        self.duty = (self.duty as i32 + self.step).max(0) as u16;
        self.duty.min(FULL_DUTY)
    }
}

// ── Shared handle ─────────────────────────────────────────────────────────────

pub struct Pushbutton {
    events: EventFlags,
    led: EventFlags,
    button: ButtonConfig,
    led_config: LedConfig,
}

impl Pushbutton {
    pub const fn new(button: ButtonConfig, led_config: LedConfig) -> Self {
        Self {
            events: EventFlags::new(),
            led: EventFlags::new(),
            button,
            led_config,
        }
    }

    pub fn released(&self, clear: bool) -> bool {
        self.events.test(event::RELEASED, clear)
    }

    pub fn bumped(&self, clear: bool) -> bool {
        self.events.test(event::BUMPED, clear)
    }

    pub fn short_pressed(&self, clear: bool) -> bool {
        self.events.test(event::SHORT_PRESSED, clear)
    }

    pub fn long_pressed(&self, clear: bool) -> bool {
        self.events.test(event::LONG_PRESSED, clear)
    }

    /// Drops every pending press event.
    pub fn clear_events(&self) {
        self.events.clear(event::ALL);
    }

    pub async fn wait_long_press(&self) {
        self.events.wait(event::LONG_PRESSED, WaitMode::Clear).await;
    }

    pub fn led_on(&self) {
        self.led.set(led::ON);
    }

    pub fn led_off(&self) {
        self.led.set(led::OFF);
    }

    pub fn led_fade(&self) {
        self.led.set(led::FADE);
    }

    pub fn led_flash(&self) {
        self.led.set(led::FLASH);
    }

    pub fn events(&self) -> &EventFlags {
        &self.events
    }

    /// Sampling task body.
    pub async fn sample<I: DigitalInput>(&self, mut input: I) -> ! {
        let mut classifier = PressClassifier::new(&self.button);
        loop {
            let raised = classifier.sample(input.is_high(), Instant::now().as_millis());
            if raised != 0 {
                debug!("button: events {=u32:#x}", raised);
                self.events.set(raised);
            }
            Timer::after(Duration::from_millis(self.button.sample_period_ms)).await;
        }
    }

    /// LED task body.
    pub async fn drive_led<L: StatusLed>(&self, mut out: L) -> ! {
        loop {
            let pending = self.led.wait(led::ALL, WaitMode::Keep).await;
            let Some((mask, command)) = select_command(pending) else {
                continue;
            };
            // cleared up front so a fade sees only newer commands
            self.led.clear(mask);

            match command {
                LedCommand::Flash => out.set_blink(true),
                LedCommand::On => {
                    out.set_blink(false);
                    out.set_duty(FULL_DUTY);
                }
                LedCommand::Off => {
                    out.set_blink(false);
                    out.set_duty(0);
                }
                LedCommand::Fade => self.fade(&mut out).await,
            }
        }
    }

    async fn fade<L: StatusLed>(&self, out: &mut L) {
        out.set_blink(false);
        out.set_duty(0);

        let cancel = CancelToken::new(&self.led, led::ALL);
        let mut ramp = FadeRamp::new(&self.led_config);
        loop {
            out.set_duty(ramp.next());
            if cancel.hold(self.led_config.fade_period_ms).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: u64 = 25;

    /// Feeds `samples` at the sampling period starting at `t`.
    fn feed(c: &mut PressClassifier, t: &mut u64, pressed: bool, samples: usize) -> u32 {
        let mut all = 0;
        for _ in 0..samples {
            all |= c.sample(pressed, *t);
            *t += TICK;
        }
        all
    }

    fn classifier() -> PressClassifier {
        PressClassifier::new(&ButtonConfig::new())
    }

    #[test]
    fn single_sample_glitch_is_ignored() {
        let mut c = classifier();
        let mut t = 0;
        assert_eq!(feed(&mut c, &mut t, false, 4), 0);
        assert_eq!(feed(&mut c, &mut t, true, 1), 0);
        assert_eq!(feed(&mut c, &mut t, false, 4), 0);
    }

    #[test]
    fn press_of_1200ms_is_short_without_bump() {
        let mut c = classifier();
        let mut t = 0;
        feed(&mut c, &mut t, false, 2);

        let mut short = 0;
        let mut seen = 0;
        // 1200 ms of samples plus the one that settles the press
        for _ in 0..(1200 / TICK + 1) {
            let ev = c.sample(true, t);
            t += TICK;
            if ev & event::SHORT_PRESSED != 0 {
                short += 1;
            }
            seen |= ev;
        }
        assert_eq!(short, 1);
        assert_eq!(seen & event::LONG_PRESSED, 0);

        let released = feed(&mut c, &mut t, false, 2);
        assert_eq!(released & event::BUMPED, 0);
        assert_ne!(released & event::RELEASED, 0);
    }

    #[test]
    fn long_press_fires_both_once() {
        let mut c = classifier();
        let mut t = 0;
        feed(&mut c, &mut t, false, 1);

        let mut short = 0;
        let mut long = 0;
        for _ in 0..200 {
            let ev = c.sample(true, t);
            t += TICK;
            short += (ev & event::SHORT_PRESSED != 0) as u32;
            long += (ev & event::LONG_PRESSED != 0) as u32;
        }
        assert_eq!((short, long), (1, 1));

        feed(&mut c, &mut t, false, 2);
        // latches re-arm for the next press
        let again = feed(&mut c, &mut t, true, 1100 / TICK as usize);
        assert_ne!(again & event::SHORT_PRESSED, 0);
    }

    #[test]
    fn quick_tap_is_a_bump() {
        let mut c = classifier();
        let mut t = 0;
        feed(&mut c, &mut t, false, 1);
        assert_eq!(feed(&mut c, &mut t, true, 4), 0);
        let ev = feed(&mut c, &mut t, false, 2);
        assert_eq!(ev, event::BUMPED | event::RELEASED);
    }

    #[test]
    fn led_dispatch_prefers_flash() {
        assert_eq!(select_command(led::ALL), Some((led::FLASH, LedCommand::Flash)));
        assert_eq!(select_command(led::ON | led::FADE), Some((led::FADE, LedCommand::Fade)));
        assert_eq!(select_command(led::OFF | led::ON), Some((led::ON, LedCommand::On)));
        assert_eq!(select_command(0), None);
    }

    #[test]
    fn fade_bounces_between_bounds() {
        let mut ramp = FadeRamp::new(&LedConfig::new());
        let mut duties = std::vec::Vec::new();
        for _ in 0..120 {
            duties.push(ramp.next());
        }
        assert_eq!(duties[0], 25);
        assert!(duties.iter().all(|&d| d <= FULL_DUTY));
        let peak = duties.iter().position(|&d| d == FULL_DUTY).unwrap();
        // 1000, then 1025 capped, then the turn back down from 1025
        assert_eq!(&duties[peak..peak + 3], &[FULL_DUTY; 3]);
        assert_eq!(duties[peak + 3], FULL_DUTY - 25);
        assert!(duties.iter().skip(peak).any(|&d| d == 0));
    }

    #[test]
    fn clear_events_drops_pending_presses() {
        let button = Pushbutton::new(ButtonConfig::new(), LedConfig::new());
        button.events().set(event::LONG_PRESSED | event::RELEASED);
        button.clear_events();
        assert!(!button.long_pressed(false));
        assert!(!button.released(false));
    }
}
