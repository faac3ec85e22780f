//! Power sequencing: wake on long press, gate on pack voltage, run, shut down.

use embassy_time::{Duration, Instant, Timer};

use crate::bargraph::Bargraph;
use crate::button::Pushbutton;
use crate::config::PowerConfig;
use crate::diag::{Diagnostics, Report};
use crate::io::{AdcDma, Alert, Annunciator, PowerRail};
use crate::lights::Lights;
use crate::monitor::BatteryMonitor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    Init,
    AwaitLongPress,
    VoltageCheck,
    Powered,
    ShuttingDown,
}

/// Why the board turned itself off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShutdownReason {
    /// Pack below the startup minimum; the load was never energized.
    UnderVoltage,
    UserRequest,
    BatteryCritical,
    MonitorFailure,
}

/// One-shot fault deadline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownTimer {
    deadline_ms: Option<u64>,
}

impl ShutdownTimer {
    pub const fn new() -> Self {
        Self { deadline_ms: None }
    }

    /// Arms the deadline unless already armed. Returns whether it armed now.
    pub fn arm(&mut self, now_ms: u64, grace_ms: u64) -> bool {
        if self.deadline_ms.is_some() {
            return false;
        }
        self.deadline_ms = Some(now_ms.saturating_add(grace_ms));
        true
    }

    pub fn is_armed(&self) -> bool {
        self.deadline_ms.is_some()
    }

    pub fn expired(&self, now_ms: u64) -> bool {
        self.deadline_ms.is_some_and(|deadline| now_ms > deadline)
    }
}

pub struct Orchestrator<'a, A, R, N> {
    monitor: &'a BatteryMonitor<'a, A>,
    button: &'a Pushbutton,
    bargraph: &'a Bargraph,
    lights: &'a Lights,
    diag: &'a Diagnostics,
    rail: R,
    buzzer: N,
    config: PowerConfig,
    state: PowerState,
    deadline: ShutdownTimer,
    fault: Option<ShutdownReason>,
}

impl<'a, A, R, N> Orchestrator<'a, A, R, N>
where
    A: AdcDma,
    R: PowerRail,
    N: Annunciator,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        monitor: &'a BatteryMonitor<'a, A>,
        button: &'a Pushbutton,
        bargraph: &'a Bargraph,
        lights: &'a Lights,
        diag: &'a Diagnostics,
        rail: R,
        buzzer: N,
        config: PowerConfig,
    ) -> Self {
        Self {
            monitor,
            button,
            bargraph,
            lights,
            diag,
            rail,
            buzzer,
            config,
            state: PowerState::Init,
            deadline: ShutdownTimer::new(),
            fault: None,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    fn enter(&mut self, state: PowerState) {
        info!("power: {} -> {}", self.state, state);
        self.state = state;
    }

    /// Runs the whole power cycle. Returns once the board is safe to halt.
    pub async fn run(&mut self) -> ShutdownReason {
        // ── INIT ──
        self.monitor.signals().init();
        self.button.led_fade();
        self.diag.report(Report::Boot);

        // ── AWAIT_LONG_PRESS ──
        self.enter(PowerState::AwaitLongPress);
        self.button.wait_long_press().await;

        // ── VOLTAGE_CHECK ──
        self.enter(PowerState::VoltageCheck);
        let passed = self.monitor.check_min_voltage(self.config.min_startup_volts).await;
        self.diag.report(Report::VoltageCheck { passed });
        if !passed {
            warn!("power: pack below startup minimum");
            return self.shutdown(ShutdownReason::UnderVoltage).await;
        }

        // ── POWERED ──
        self.power_up();
        let reason = loop {
            if let Some(reason) = self.service(Instant::now().as_millis()) {
                break reason;
            }
            Timer::after(Duration::from_millis(self.config.poll_period_ms)).await;
        };

        self.shutdown(reason).await
    }

    fn power_up(&mut self) {
        self.enter(PowerState::Powered);
        self.rail.set_enabled(true);
        self.monitor.signals().start();
        self.bargraph.start();
        self.lights.start();
        self.buzzer.alert(Alert::BootComplete);
        self.button.led_on();
        // the press that woke us is still latched
        self.button.clear_events();
        self.diag.report(Report::PoweredUp);
    }

    /// One POWERED poll. Returns the reason once the board must shut down.
    pub fn service(&mut self, now_ms: u64) -> Option<ShutdownReason> {
        if self.button.bumped(true) {
            self.bargraph.draw_soc();
        }
        if self.button.short_pressed(true) {
            self.button.led_flash();
        }
        if self.button.long_pressed(true) {
            return Some(ShutdownReason::UserRequest);
        }
        if self.button.released(true) {
            self.button.led_on();
        }

        let signals = self.monitor.signals();
        if signals.soc_critical(true) {
            self.arm_fault(ShutdownReason::BatteryCritical, now_ms);
        }
        if signals.read_fail(true) {
            self.arm_fault(ShutdownReason::MonitorFailure, now_ms);
        }
        if signals.soc_low(true) {
            warn!("power: battery low");
            self.buzzer.alert(Alert::LowBattery);
            self.diag.report(Report::LowBattery);
        }

        if self.deadline.expired(now_ms) {
            self.fault
        } else {
            None
        }
    }

    fn arm_fault(&mut self, reason: ShutdownReason, now_ms: u64) {
        if !self.deadline.arm(now_ms, self.config.fault_grace_ms) {
            return;
        }
        error!("power: {}, shutting down in {} ms", reason, self.config.fault_grace_ms);
        self.fault = Some(reason);
        self.buzzer.alert(Alert::Critical);
        self.diag.report(match reason {
            ShutdownReason::MonitorFailure => Report::MonitorFailure,
            _ => Report::BatteryCritical,
        });
        self.diag.report(Report::ShutdownArmed {
            grace_ms: self.config.fault_grace_ms,
        });
    }

    async fn shutdown(&mut self, reason: ShutdownReason) -> ShutdownReason {
        self.enter(PowerState::ShuttingDown);
        info!("power: shutdown ({})", reason);
        self.diag.report(Report::ShuttingDown(reason));

        self.button.led_off();
        self.lights.shutdown();
        self.buzzer.alert(Alert::Shutdown);
        self.rail.set_enabled(false);
        Timer::after(Duration::from_millis(self.config.shutdown_settle_ms)).await;
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_arms_once() {
        let mut t = ShutdownTimer::new();
        assert!(!t.expired(u64::MAX));
        assert!(t.arm(100, 10_000));
        assert!(!t.arm(5_000, 10_000));
        assert!(!t.expired(10_100));
        assert!(t.expired(10_101));
    }

    #[test]
    fn arming_near_tick_limit_saturates() {
        let mut t = ShutdownTimer::new();
        t.arm(u64::MAX - 5, 10_000);
        assert!(t.is_armed());
        assert!(!t.expired(u64::MAX));
    }
}
