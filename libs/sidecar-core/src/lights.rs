//! Head/tail light patterns selected from the RC receiver.
//!
//! The RC edge interrupt times each servo pulse into a mailbox. The
//! supervisor filters the widths and treats each stick flick past the
//! hysteresis band as "next pattern". The animator plays the selected pattern
//! until a newer selection cancels it.

use embassy_time::{Duration, Timer};

use crate::config::LightsConfig;
use crate::io::{LampDriver, FULL_DUTY};
use crate::sync::{CancelToken, EventFlags, Mailbox, WaitMode};

/// Width of the pulse-width moving average (samples).
pub const DEBOUNCE_SAMPLES: usize = 5;
pub const PATTERN_COUNT: u8 = 4;

pub mod flag {
    pub const LIGHTS_OFF: u32 = 1 << 0;
    pub const TAILLIGHT_ONLY: u32 = 1 << 1;
    pub const TAIL_SOLID_HEAD: u32 = 1 << 2;
    pub const TAIL_AND_HEAD: u32 = 1 << 3;
    pub const PATTERNS: u32 = 0x0F;
    pub const ENABLED: u32 = 1 << 4;
    pub const SHUTDOWN: u32 = 1 << 5;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LightPattern {
    Off,
    TaillightOnly,
    TailSolidHead,
    TailAndHead,
}

impl LightPattern {
    pub const fn from_index(index: u8) -> Self {
        match index % PATTERN_COUNT {
            0 => LightPattern::Off,
            1 => LightPattern::TaillightOnly,
            2 => LightPattern::TailSolidHead,
            _ => LightPattern::TailAndHead,
        }
    }

    pub const fn flag(self) -> u32 {
        match self {
            LightPattern::Off => flag::LIGHTS_OFF,
            LightPattern::TaillightOnly => flag::TAILLIGHT_ONLY,
            LightPattern::TailSolidHead => flag::TAIL_SOLID_HEAD,
            LightPattern::TailAndHead => flag::TAIL_AND_HEAD,
        }
    }

    fn routine(self) -> &'static Routine {
        match self {
            LightPattern::Off => &OFF,
            LightPattern::TaillightOnly => &TAILLIGHT_ONLY,
            LightPattern::TailSolidHead => &TAIL_SOLID_HEAD,
            LightPattern::TailAndHead => &TAIL_AND_HEAD,
        }
    }
}

/// Dispatch order, highest priority first.
const DISPATCH: [LightPattern; 4] = [
    LightPattern::Off,
    LightPattern::TaillightOnly,
    LightPattern::TailSolidHead,
    LightPattern::TailAndHead,
];

/// Highest-priority pattern asserted in `bits`.
pub fn select_pattern(bits: u32) -> Option<LightPattern> {
    DISPATCH.into_iter().find(|p| bits & p.flag() != 0)
}

// ── Routines ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Step {
    head: Option<u16>,
    tail: Option<u16>,
    hold_ms: u64,
}

const fn step(head: Option<u16>, tail: Option<u16>, hold_ms: u64) -> Step {
    Step { head, tail, hold_ms }
}

/// Outputs applied once, then `cycle` repeated until cancelled.
struct Routine {
    entry_head: Option<u16>,
    entry_tail: Option<u16>,
    cycle: &'static [Step],
}

const DIM: u16 = 750;
const BRIGHT: u16 = FULL_DUTY;

const TAIL_PULSE: [Step; 2] = [
    step(None, Some(DIM), 925),
    step(None, Some(BRIGHT), 75),
];

const OFF: Routine = Routine {
    entry_head: Some(0),
    entry_tail: Some(0),
    cycle: &[],
};

const TAILLIGHT_ONLY: Routine = Routine {
    entry_head: Some(0),
    entry_tail: None,
    cycle: &TAIL_PULSE,
};

const TAIL_SOLID_HEAD: Routine = Routine {
    entry_head: Some(BRIGHT),
    entry_tail: None,
    cycle: &TAIL_PULSE,
};

const TAIL_AND_HEAD: Routine = Routine {
    entry_head: None,
    entry_tail: None,
    cycle: &[
        step(Some(BRIGHT), Some(DIM), 425),
        step(Some(DIM), None, 75),
        step(Some(BRIGHT), None, 425),
        step(Some(DIM), Some(BRIGHT), 75),
    ],
};

fn apply<L: LampDriver>(lamps: &mut L, head: Option<u16>, tail: Option<u16>) {
    if let Some(duty) = tail {
        lamps.set_tail(duty);
    }
    if let Some(duty) = head {
        lamps.set_head(duty);
    }
}

// ── Pulse timing ──────────────────────────────────────────────────────────────

/// Edge-to-width conversion done in the RC edge interrupt.
#[derive(Default)]
pub struct PulseTimer {
    rose_at_us: Option<u64>,
}

impl PulseTimer {
    pub const fn new() -> Self {
        Self { rose_at_us: None }
    }

    /// Feeds one edge. Returns the pulse width on a falling edge; a pulse too
    /// long for the timer reads as 0 (lost).
    pub fn edge(&mut self, level_high: bool, now_us: u64) -> Option<u16> {
        if level_high {
            self.rose_at_us = Some(now_us);
            None
        } else {
            let rose = self.rose_at_us.take()?;
            let width = now_us.saturating_sub(rose);
            Some(u16::try_from(width).unwrap_or(0))
        }
    }

    /// Timer overflow: forget the pending rising edge.
    pub fn overflow(&mut self) {
        self.rose_at_us = None;
    }
}

// ── Supervisor ────────────────────────────────────────────────────────────────

/// Debounces pulse widths and turns stick flicks into pattern changes.
pub struct PatternSelector {
    window: [u16; DEBOUNCE_SAMPLES],
    cursor: usize,
    pattern: u8,
    /// `true` while the next change needs the stick to go high.
    expect_rising: bool,
    lost_latched: bool,
    threshold_high: u32,
    threshold_low: u32,
}

impl PatternSelector {
    pub fn new(config: &LightsConfig) -> Self {
        Self {
            window: [0; DEBOUNCE_SAMPLES],
            cursor: 0,
            pattern: 0,
            expect_rising: true,
            lost_latched: false,
            threshold_high: config.threshold_high_us,
            threshold_low: config.threshold_low_us,
        }
    }

    pub fn pattern_index(&self) -> u8 {
        self.pattern
    }

    pub fn expects_rising(&self) -> bool {
        self.expect_rising
    }

    /// Folds in one width (0 = no pulse) and returns a newly selected pattern.
    pub fn update(&mut self, width: u16) -> Option<LightPattern> {
        self.window[self.cursor] = width;
        self.cursor = (self.cursor + 1) % DEBOUNCE_SAMPLES;
        let filtered = self.window.iter().map(|&w| w as u32).sum::<u32>() / DEBOUNCE_SAMPLES as u32;

        if filtered == 0 && !self.lost_latched {
            self.pattern = 0;
            self.lost_latched = true;
            return Some(LightPattern::Off);
        }

        let crossed = if self.expect_rising {
            filtered > self.threshold_high
        } else {
            filtered < self.threshold_low
        };
        if crossed {
            self.pattern = (self.pattern + 1) % PATTERN_COUNT;
            self.expect_rising = !self.expect_rising;
            self.lost_latched = false;
            return Some(LightPattern::from_index(self.pattern));
        }
        None
    }
}

// ── Shared handle ─────────────────────────────────────────────────────────────

pub struct Lights {
    flags: EventFlags,
    pulse: Mailbox<u16>,
    config: LightsConfig,
}

impl Lights {
    pub const fn new(config: LightsConfig) -> Self {
        Self {
            flags: EventFlags::new(),
            pulse: Mailbox::new(),
            config,
        }
    }

    pub fn config(&self) -> &LightsConfig {
        &self.config
    }

    pub fn flags(&self) -> &EventFlags {
        &self.flags
    }

    /// Falling edge: latest measured width.
    pub fn publish_pulse(&self, width_us: u16) {
        self.pulse.put(width_us);
    }

    /// Pulse timer overflowed without a falling edge.
    pub fn signal_lost(&self) {
        self.pulse.put(0);
    }

    pub fn select(&self, pattern: LightPattern) {
        self.flags.set(pattern.flag());
    }

    pub fn start(&self) {
        self.flags.set(flag::ENABLED);
    }

    /// Stops both loops and leaves the lamps dark.
    pub fn shutdown(&self) {
        self.flags.set(flag::SHUTDOWN);
    }

    fn is_shut_down(&self) -> bool {
        self.flags.any(flag::SHUTDOWN)
    }

    /// Supervisor task body. Returns after [`shutdown`](Self::shutdown).
    pub async fn supervise(&self) {
        self.flags.wait(flag::ENABLED | flag::SHUTDOWN, WaitMode::Keep).await;

        let mut selector = PatternSelector::new(&self.config);
        while !self.is_shut_down() {
            let width = self.pulse.try_get().unwrap_or(0);
            if let Some(pattern) = selector.update(width) {
                info!("lights: pattern {}", pattern);
                self.select(pattern);
            }
            Timer::after(Duration::from_millis(self.config.supervisor_period_ms)).await;
        }
    }

    /// Animator task body. Returns after [`shutdown`](Self::shutdown) with
    /// both lamps off.
    pub async fn animate<L: LampDriver>(&self, mut lamps: L) {
        let watch = flag::PATTERNS | flag::SHUTDOWN;
        loop {
            let pending = self.flags.wait(watch, WaitMode::Keep).await;
            if pending & flag::SHUTDOWN != 0 || self.is_shut_down() {
                break;
            }

            let Some(pattern) = select_pattern(self.flags.get()) else {
                continue;
            };
            self.flags.clear(pattern.flag());
            self.play(pattern.routine(), &mut lamps).await;
        }
        lamps.set_head(0);
        lamps.set_tail(0);
    }

    async fn play<L: LampDriver>(&self, routine: &Routine, lamps: &mut L) {
        apply(lamps, routine.entry_head, routine.entry_tail);
        if routine.cycle.is_empty() {
            return;
        }

        let cancel = CancelToken::new(&self.flags, flag::PATTERNS | flag::SHUTDOWN);
        loop {
            for step in routine.cycle {
                apply(lamps, step.head, step.tail);
                if cancel.hold(step.hold_ms).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> PatternSelector {
        PatternSelector::new(&LightsConfig::new())
    }

    #[test]
    fn lost_signal_then_stick_high_selects_first_pattern() {
        let mut sel = selector();
        let widths = [0u16, 0, 0, 1800, 1800, 1800, 1800, 1800];
        let out: std::vec::Vec<_> = widths.iter().map(|&w| sel.update(w)).collect();

        assert_eq!(out[0], Some(LightPattern::Off));
        assert!(out[1..7].iter().all(Option::is_none));
        assert_eq!(out[7], Some(LightPattern::TaillightOnly));
        assert_eq!(sel.pattern_index(), 1);
        assert!(!sel.expects_rising());
    }

    #[test]
    fn lights_off_latches_once_per_loss() {
        let mut sel = selector();
        assert_eq!(sel.update(0), Some(LightPattern::Off));
        for _ in 0..10 {
            assert_eq!(sel.update(0), None);
        }
    }

    #[test]
    fn hovering_inside_band_does_not_chatter() {
        let mut sel = selector();
        for _ in 0..5 {
            sel.update(1800);
        }
        let before = sel.pattern_index();
        for w in [1650u16, 1350, 1690, 1310, 1500] {
            for _ in 0..5 {
                assert_eq!(sel.update(w), None);
            }
        }
        assert_eq!(sel.pattern_index(), before);
    }

    #[test]
    fn flicks_cycle_through_all_patterns() {
        let mut sel = selector();
        sel.update(0);
        let mut seen = std::vec::Vec::new();
        for round in 0..4 {
            let w = if round % 2 == 0 { 1900 } else { 1100 };
            for _ in 0..DEBOUNCE_SAMPLES {
                if let Some(p) = sel.update(w) {
                    seen.push(p);
                }
            }
        }
        assert_eq!(
            seen,
            [
                LightPattern::TaillightOnly,
                LightPattern::TailSolidHead,
                LightPattern::TailAndHead,
                LightPattern::Off,
            ]
        );
    }

    #[test]
    fn dispatch_prefers_off_over_everything() {
        assert_eq!(select_pattern(flag::TAIL_AND_HEAD | flag::LIGHTS_OFF), Some(LightPattern::Off));
        assert_eq!(
            select_pattern(flag::TAIL_AND_HEAD | flag::TAIL_SOLID_HEAD),
            Some(LightPattern::TailSolidHead)
        );
        assert_eq!(select_pattern(flag::ENABLED), None);
    }

    #[test]
    fn pulse_timer_measures_high_time() {
        let mut timer = PulseTimer::new();
        assert_eq!(timer.edge(false, 10), None);
        assert_eq!(timer.edge(true, 1_000), None);
        assert_eq!(timer.edge(false, 2_512), Some(1_512));
        assert_eq!(timer.edge(false, 3_000), None);
    }

    #[test]
    fn overlong_pulse_reads_as_lost() {
        let mut timer = PulseTimer::new();
        timer.edge(true, 0);
        assert_eq!(timer.edge(false, 70_000), Some(0));

        timer.edge(true, 100);
        timer.overflow();
        assert_eq!(timer.edge(false, 1_600), None);
    }
}
