/// Startup configuration, handed to every component at construction.
///
/// All timings are in milliseconds (one scheduler tick = 1 ms); voltages are
/// pack volts. `SidecarConfig::new()` carries the values the board ships with.

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SidecarConfig {
    pub monitor: MonitorConfig,
    pub bargraph: BargraphConfig,
    pub lights: LightsConfig,
    pub button: ButtonConfig,
    pub led: LedConfig,
    pub power: PowerConfig,
}

impl SidecarConfig {
    pub const fn new() -> Self {
        Self {
            monitor: MonitorConfig::new(),
            bargraph: BargraphConfig::new(),
            lights: LightsConfig::new(),
            button: ButtonConfig::new(),
            led: LedConfig::new(),
            power: PowerConfig::new(),
        }
    }
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Battery monitor ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MonitorConfig {
    /// Delay between acquisitions.
    pub period_ms: u64,
    /// Raw ADC samples averaged per acquisition (capped at `monitor::MAX_OVERSAMPLES`).
    pub oversamples: usize,
    /// Budget for taking the ADC and completing the transfer.
    pub adc_timeout_ms: u64,
    /// Consecutive failed acquisitions before READ_FAIL latches.
    pub max_read_failures: u8,
    /// ADC LSB to pack volts.
    pub divider_ratio: f32,
    /// Pack voltage mapped to SOC 0.
    pub empty_volts: f32,
    /// Pack voltage mapped to SOC 1.
    pub full_volts: f32,
    pub sane_lower_volts: f32,
    pub sane_upper_volts: f32,
    pub low_volts: f32,
    pub critical_volts: f32,
    /// Voltage the moving average starts from before it has filled.
    pub seed_volts: f32,
}

impl MonitorConfig {
    pub const fn new() -> Self {
        Self {
            period_ms: 10,
            oversamples: 16,
            adc_timeout_ms: 100,
            max_read_failures: 8,
            divider_ratio: 0.008_879_37,
            empty_volts: 24.0,
            full_volts: 33.6,
            sane_lower_volts: 10.0,
            sane_upper_volts: 35.0,
            low_volts: 26.0,
            critical_volts: 24.0,
            seed_volts: 27.0,
        }
    }
}

// ── Bargraph ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BargraphConfig {
    /// Half-frame period of the multiplexed drawer.
    pub refresh_ms: u64,
    pub critical_flash_ms: u32,
    pub critical_flash_count: u8,
    pub buildup_ms: u32,
    /// Half period of the top-LED blink.
    pub flash_ms: u32,
    pub flash_count: u8,
}

impl BargraphConfig {
    pub const fn new() -> Self {
        Self {
            refresh_ms: 2,
            critical_flash_ms: 75,
            critical_flash_count: 10,
            buildup_ms: 50,
            flash_ms: 500,
            flash_count: 4,
        }
    }
}

// ── Lights ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LightsConfig {
    pub supervisor_period_ms: u64,
    /// Filtered pulse width that counts as "stick high" (µs).
    pub threshold_high_us: u32,
    /// Filtered pulse width that counts as "stick low" (µs).
    pub threshold_low_us: u32,
    /// No edge for this long means the receiver is gone.
    pub signal_timeout_ms: u64,
}

impl LightsConfig {
    pub const fn new() -> Self {
        Self {
            supervisor_period_ms: 50,
            threshold_high_us: 1700,
            threshold_low_us: 1300,
            signal_timeout_ms: 25,
        }
    }
}

// ── Pushbutton + LED ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonConfig {
    pub sample_period_ms: u64,
    pub short_press_ms: u64,
    pub long_press_ms: u64,
}

impl ButtonConfig {
    pub const fn new() -> Self {
        Self {
            sample_period_ms: 25,
            short_press_ms: 1000,
            long_press_ms: 3000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedConfig {
    /// Duty change per fade step (per-mille).
    pub fade_step: u16,
    pub fade_period_ms: u64,
    /// The fade turns around once the duty climbs past this.
    pub fade_top: u16,
}

impl LedConfig {
    pub const fn new() -> Self {
        Self {
            fade_step: 25,
            fade_period_ms: 10,
            fade_top: 1000,
        }
    }
}

// ── Power sequencing ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowerConfig {
    /// The load is never energized below this pack voltage.
    pub min_startup_volts: f32,
    /// Delay between a fatal fault and cutting power.
    pub fault_grace_ms: u64,
    /// Logic rail hold time after the FETs are released.
    pub shutdown_settle_ms: u64,
    pub poll_period_ms: u64,
}

impl PowerConfig {
    pub const fn new() -> Self {
        Self {
            min_startup_volts: 20.0,
            fault_grace_ms: 10_000,
            shutdown_settle_ms: 1000,
            poll_period_ms: 10,
        }
    }
}
