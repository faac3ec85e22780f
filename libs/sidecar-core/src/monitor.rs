//! Battery monitor: ADC acquisition, moving average, SOC and fault latches.
//!
//! The ADC is shared between the one-shot startup check and the periodic
//! task. `ADC_READY` on the monitor's flag set is the lock: it is taken with a
//! bounded wait and handed back by [`AdcLease`] on every exit path. The lease
//! already serialises access, so the driver cell itself never masks
//! interrupts; conversions complete asynchronously through `DMA_COMPLETE`.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant, Timer};

use crate::config::MonitorConfig;
use crate::io::AdcDma;
use crate::sync::{EventFlags, Mailbox, WaitMode};

/// Upper bound on `MonitorConfig::oversamples`.
pub const MAX_OVERSAMPLES: usize = 64;
/// Length of the moving-average window (acquisitions).
pub const SAMPLE_WINDOW: usize = 256;

pub mod flag {
    pub const DMA_COMPLETE: u32 = 1 << 0;
    pub const ADC_READY: u32 = 1 << 1;
    pub const SOC_LOW: u32 = 1 << 2;
    pub const SOC_CRITICAL: u32 = 1 << 3;
    pub const READ_FAIL: u32 = 1 << 4;
    pub const RUN: u32 = 1 << 5;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquireError {
    /// Someone else held the ADC for the whole budget.
    AdcBusy,
    /// The transfer never completed.
    DmaTimeout,
    /// Converted voltage outside the sanity band.
    OutOfRange,
}

// ── Shared signals ────────────────────────────────────────────────────────────

/// Everything other tasks (and the ADC interrupt) see of the monitor.
pub struct MonitorSignals {
    flags: EventFlags,
    soc: Mailbox<f32>,
}

impl MonitorSignals {
    pub const fn new() -> Self {
        Self {
            flags: EventFlags::new(),
            soc: Mailbox::new(),
        }
    }

    /// Releases the ADC for the first time and returns the SOC mailbox.
    pub fn init(&self) -> &Mailbox<f32> {
        self.flags.set(flag::ADC_READY);
        &self.soc
    }

    pub fn soc(&self) -> &Mailbox<f32> {
        &self.soc
    }

    /// Lets the periodic task begin acquiring.
    pub fn start(&self) {
        self.flags.set(flag::RUN);
    }

    /// Called from the DMA transfer-complete interrupt.
    pub fn conversion_complete(&self) {
        self.flags.set(flag::DMA_COMPLETE);
    }

    pub fn soc_low(&self, clear: bool) -> bool {
        self.flags.test(flag::SOC_LOW, clear)
    }

    pub fn soc_critical(&self, clear: bool) -> bool {
        self.flags.test(flag::SOC_CRITICAL, clear)
    }

    pub fn read_fail(&self, clear: bool) -> bool {
        self.flags.test(flag::READ_FAIL, clear)
    }

    pub fn flags(&self) -> &EventFlags {
        &self.flags
    }
}

impl Default for MonitorSignals {
    fn default() -> Self {
        Self::new()
    }
}

// ── Filtering ─────────────────────────────────────────────────────────────────

/// Circular buffer of `volts / SAMPLE_WINDOW` contributions.
///
/// The average is a full re-sum of every slot on each push, never a running
/// total, so it cannot drift.
pub struct VoltageFilter {
    slots: [f32; SAMPLE_WINDOW],
    cursor: usize,
}

impl VoltageFilter {
    pub fn new(seed_volts: f32) -> Self {
        Self {
            slots: [seed_volts / SAMPLE_WINDOW as f32; SAMPLE_WINDOW],
            cursor: 0,
        }
    }

    pub fn push(&mut self, volts: f32) -> f32 {
        self.slots[self.cursor] = volts / SAMPLE_WINDOW as f32;
        self.cursor = (self.cursor + 1) % SAMPLE_WINDOW;
        self.average()
    }

    pub fn average(&self) -> f32 {
        self.slots.iter().sum()
    }
}

/// Maps a filtered pack voltage onto [0, 1].
pub fn soc_from_volts(volts: f32, config: &MonitorConfig) -> f32 {
    ((volts - config.empty_volts) / (config.full_volts - config.empty_volts)).clamp(0.0, 1.0)
}

/// Result of one monitor cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Verdict {
    /// Filtered voltage, when the acquisition was good.
    pub average_volts: Option<f32>,
    pub soc: Option<f32>,
    /// Fault flags to latch this cycle.
    pub raise: u32,
}

/// Per-task bookkeeping of the periodic monitor.
pub struct MonitorState {
    filter: VoltageFilter,
    failures: u8,
    low_latched: bool,
}

impl MonitorState {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            filter: VoltageFilter::new(config.seed_volts),
            failures: 0,
            low_latched: false,
        }
    }

    pub fn consecutive_failures(&self) -> u8 {
        self.failures
    }

    pub fn record(&mut self, reading: Result<f32, AcquireError>, config: &MonitorConfig) -> Verdict {
        let reading = reading.and_then(|v| {
            if v > config.sane_lower_volts && v < config.sane_upper_volts {
                Ok(v)
            } else {
                Err(AcquireError::OutOfRange)
            }
        });

        match reading {
            Ok(volts) => {
                self.failures = 0;
                let average = self.filter.push(volts);

                // SOC_LOW fires once per discharge; only a consumer clears it.
                let raise = if average < config.critical_volts {
                    flag::SOC_CRITICAL
                } else if average < config.low_volts && !self.low_latched {
                    self.low_latched = true;
                    flag::SOC_LOW
                } else {
                    0
                };

                Verdict {
                    average_volts: Some(average),
                    soc: Some(soc_from_volts(average, config)),
                    raise,
                }
            }
            Err(_) => {
                self.failures = self.failures.saturating_add(1);
                let raise = if self.failures >= config.max_read_failures {
                    flag::READ_FAIL
                } else {
                    0
                };
                Verdict {
                    average_volts: None,
                    soc: None,
                    raise,
                }
            }
        }
    }
}

// ── Acquisition ───────────────────────────────────────────────────────────────

/// Holds `ADC_READY`; dropping it hands the ADC back.
struct AdcLease<'a> {
    flags: &'a EventFlags,
}

impl Drop for AdcLease<'_> {
    fn drop(&mut self) {
        self.flags.set(flag::ADC_READY);
    }
}

pub struct BatteryMonitor<'a, A> {
    signals: &'a MonitorSignals,
    adc: Mutex<NoopRawMutex, RefCell<A>>,
    config: MonitorConfig,
}

impl<'a, A: AdcDma> BatteryMonitor<'a, A> {
    pub fn new(signals: &'a MonitorSignals, adc: A, config: MonitorConfig) -> Self {
        Self {
            signals,
            adc: Mutex::new(RefCell::new(adc)),
            config,
        }
    }

    pub fn signals(&self) -> &'a MonitorSignals {
        self.signals
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// One oversampled reading in pack volts.
    pub async fn acquire(&self) -> Result<f32, AcquireError> {
        let flags = self.signals.flags();
        let samples = self.config.oversamples.clamp(1, MAX_OVERSAMPLES);
        let budget = Duration::from_millis(self.config.adc_timeout_ms);
        let started = Instant::now();

        flags
            .wait_timeout(flag::ADC_READY, WaitMode::Clear, budget)
            .await
            .map_err(|_| AcquireError::AdcBusy)?;
        let _lease = AdcLease { flags };

        // the transfer gets whatever is left of the budget
        let remaining = budget
            .checked_sub(started.elapsed())
            .unwrap_or(Duration::from_ticks(0));

        flags.clear(flag::DMA_COMPLETE);
        self.adc.lock(|adc| {
            let mut adc = adc.borrow_mut();
            adc.stop();
            adc.start(samples);
        });

        flags
            .wait_timeout(flag::DMA_COMPLETE, WaitMode::Clear, remaining)
            .await
            .map_err(|_| AcquireError::DmaTimeout)?;

        let mut raw = [0u16; MAX_OVERSAMPLES];
        self.adc.lock(|adc| adc.borrow_mut().read(&mut raw[..samples]));

        let sum: u32 = raw[..samples].iter().map(|&s| s as u32).sum();
        Ok(sum as f32 * self.config.divider_ratio / samples as f32)
    }

    /// Startup gate: is the pack inside `(max(min, lower sanity), upper sanity)`?
    pub async fn check_min_voltage(&self, min_volts: f32) -> bool {
        let floor = min_volts.max(self.config.sane_lower_volts);
        match self.acquire().await {
            Ok(volts) => {
                info!("monitor: startup check {} V (floor {} V)", volts, floor);
                volts > floor && volts < self.config.sane_upper_volts
            }
            Err(e) => {
                warn!("monitor: startup check failed: {}", e);
                false
            }
        }
    }

    /// Acquire, filter, publish SOC and latch faults once.
    pub async fn cycle(&self, state: &mut MonitorState) -> Verdict {
        let reading = self.acquire().await;
        let verdict = state.record(reading, &self.config);

        if let Some(soc) = verdict.soc {
            self.signals.soc.put(soc);
        }
        if verdict.raise != 0 {
            if verdict.raise & flag::READ_FAIL != 0 {
                error!("monitor: {} consecutive read failures", state.consecutive_failures());
            } else {
                warn!("monitor: latching {=u32:#x}", verdict.raise);
            }
            self.signals.flags.set(verdict.raise);
        }
        verdict
    }

    /// Periodic task body. Idles until [`MonitorSignals::start`].
    pub async fn run(&self) -> ! {
        self.signals.flags.wait(flag::RUN, WaitMode::Keep).await;
        info!("monitor: running");

        let mut state = MonitorState::new(&self.config);
        loop {
            self.cycle(&mut state).await;
            Timer::after(Duration::from_millis(self.config.period_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use embassy_futures::block_on;
    use embassy_futures::join::join;

    use super::*;

    fn cfg() -> MonitorConfig {
        MonitorConfig::new()
    }

    /// Raw code for `volts` with the default divider.
    fn raw_for(volts: f32) -> u16 {
        (volts / cfg().divider_ratio + 0.5) as u16
    }

    /// Converts `level` on every start; completes at once unless `deferred`.
    struct ScriptedAdc<'a> {
        signals: &'a MonitorSignals,
        level: &'a Cell<u16>,
        deferred: bool,
        armed: &'a Cell<usize>,
    }

    impl AdcDma for ScriptedAdc<'_> {
        fn stop(&mut self) {
            self.armed.set(0);
        }

        fn start(&mut self, len: usize) {
            self.armed.set(len);
            if !self.deferred {
                self.signals.conversion_complete();
            }
        }

        fn read(&mut self, out: &mut [u16]) {
            out.fill(self.level.get());
        }
    }

    #[test]
    fn filter_starts_at_seed() {
        let filter = VoltageFilter::new(27.0);
        assert_eq!(filter.average(), 27.0);
    }

    #[test]
    fn filter_reaches_input_after_one_window() {
        let mut filter = VoltageFilter::new(27.0);
        let mut avg = 0.0;
        for _ in 0..SAMPLE_WINDOW {
            avg = filter.push(30.0);
        }
        assert!((avg - 30.0).abs() < 1e-3);
    }

    #[test]
    fn single_sample_moves_average_by_one_slot() {
        let mut filter = VoltageFilter::new(27.0);
        let avg = filter.push(22.0);
        let expected = 27.0 - 5.0 / SAMPLE_WINDOW as f32;
        assert!((avg - expected).abs() < 1e-4);
    }

    #[test]
    fn soc_is_clamped_to_unit_range() {
        let c = cfg();
        assert_eq!(soc_from_volts(22.0, &c), 0.0);
        assert_eq!(soc_from_volts(40.0, &c), 1.0);
        assert!((soc_from_volts(28.8, &c) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn read_fail_latches_on_eighth_failure() {
        let c = cfg();
        let mut state = MonitorState::new(&c);
        for _ in 0..7 {
            let v = state.record(Err(AcquireError::DmaTimeout), &c);
            assert_eq!(v.raise, 0);
            assert_eq!(v.soc, None);
        }
        let v = state.record(Err(AcquireError::DmaTimeout), &c);
        assert_eq!(v.raise, flag::READ_FAIL);
    }

    #[test]
    fn good_reading_resets_failure_count() {
        let c = cfg();
        let mut state = MonitorState::new(&c);
        for _ in 0..7 {
            state.record(Err(AcquireError::AdcBusy), &c);
        }
        state.record(Ok(30.0), &c);
        assert_eq!(state.consecutive_failures(), 0);
        let v = state.record(Err(AcquireError::AdcBusy), &c);
        assert_eq!(v.raise, 0);
    }

    #[test]
    fn insane_voltage_counts_as_failure() {
        let c = cfg();
        let mut state = MonitorState::new(&c);
        let v = state.record(Ok(36.0), &c);
        assert_eq!(v.average_volts, None);
        assert_eq!(state.consecutive_failures(), 1);
        state.record(Ok(9.0), &c);
        assert_eq!(state.consecutive_failures(), 2);
    }

    #[test]
    fn soc_low_fires_once_per_discharge() {
        let c = cfg();
        let mut state = MonitorState::new(&c);
        let mut fired = 0;
        for _ in 0..SAMPLE_WINDOW {
            let v = state.record(Ok(25.0), &c);
            if v.raise & flag::SOC_LOW != 0 {
                fired += 1;
            }
            assert_eq!(v.raise & flag::SOC_CRITICAL, 0);
        }
        assert_eq!(fired, 1);

        // recovery does not re-arm it
        for _ in 0..SAMPLE_WINDOW {
            state.record(Ok(30.0), &c);
        }
        for _ in 0..SAMPLE_WINDOW {
            assert_eq!(state.record(Ok(25.0), &c).raise & flag::SOC_LOW, 0);
        }
    }

    #[test]
    fn soc_critical_repeats_every_cycle() {
        let c = cfg();
        let mut state = MonitorState::new(&c);
        for _ in 0..SAMPLE_WINDOW {
            state.record(Ok(20.0), &c);
        }
        for _ in 0..3 {
            assert_eq!(state.record(Ok(20.0), &c).raise, flag::SOC_CRITICAL);
        }
    }

    #[test]
    fn latched_soc_low_survives_until_consumed() {
        let signals = MonitorSignals::new();
        signals.flags().set(flag::SOC_LOW);
        assert!(signals.soc_low(false));
        assert!(signals.soc_low(false));
        assert!(signals.soc_low(true));
        assert!(!signals.soc_low(false));
    }

    #[test]
    fn soc_low_stays_latched_after_recovery() {
        let signals = MonitorSignals::new();
        let level = Cell::new(raw_for(25.0));
        let armed = Cell::new(0);
        let adc = ScriptedAdc {
            signals: &signals,
            level: &level,
            deferred: false,
            armed: &armed,
        };
        let monitor = BatteryMonitor::new(&signals, adc, cfg());
        signals.init();
        let mut state = MonitorState::new(monitor.config());

        for _ in 0..300 {
            block_on(monitor.cycle(&mut state));
        }
        assert!(signals.soc_low(false));

        level.set(raw_for(30.0));
        let mut last = None;
        for _ in 0..600 {
            last = block_on(monitor.cycle(&mut state)).average_volts;
        }
        let avg = last.unwrap();
        assert!(avg > 29.9, "average {}", avg);
        assert!(signals.soc_low(false));
        assert!(!signals.soc_critical(false));
    }

    #[test]
    fn acquisition_waits_for_late_completion() {
        let signals = MonitorSignals::new();
        let level = Cell::new(raw_for(28.0));
        let armed = Cell::new(0);
        let adc = ScriptedAdc {
            signals: &signals,
            level: &level,
            deferred: true,
            armed: &armed,
        };
        let monitor = BatteryMonitor::new(&signals, adc, cfg());
        signals.init();

        let (volts, _) = block_on(join(monitor.acquire(), async {
            // the conversion burst runs elsewhere while acquire is parked
            while armed.get() == 0 {
                Timer::after_micros(100).await;
            }
            Timer::after_millis(2).await;
            signals.conversion_complete();
        }));
        let volts = volts.unwrap();
        assert!((volts - 28.0).abs() < 0.01, "got {}", volts);
        assert_eq!(armed.get(), cfg().oversamples);
        // the lease came back
        assert!(signals.flags().any(flag::ADC_READY));
    }
}
