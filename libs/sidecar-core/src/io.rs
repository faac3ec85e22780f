//! Narrow hardware capabilities the control logic calls into.
//!
//! Duties are per-mille of full scale ([`FULL_DUTY`]); drivers scale to their
//! timer. Timekeeping comes from `embassy_time::Instant` directly.

/// Full-scale duty, per-mille.
pub const FULL_DUTY: u16 = 1000;

/// Level of a digital input (`true` = high).
pub trait DigitalInput {
    fn is_high(&mut self) -> bool;
}

/// The ten bargraph LED lines; bit `i` drives LED `i`.
pub trait BargraphPort {
    fn output(&mut self, states: u16);
}

/// Constant-current drivers for the headlight and taillight.
pub trait LampDriver {
    fn set_head(&mut self, duty: u16);
    fn set_tail(&mut self, duty: u16);
}

/// PWM-dimmed LED in the power button.
pub trait StatusLed {
    fn set_duty(&mut self, duty: u16);
    /// Switches the LED timer between normal PWM and a slow 50 % hardware blink.
    fn set_blink(&mut self, blink: bool);
}

/// Battery ADC with DMA.
///
/// `start` only arms a transfer of `len` conversions and returns at once; the
/// board signals the end of the transfer from its completion path through
/// `MonitorSignals::conversion_complete`.
pub trait AdcDma {
    fn stop(&mut self);
    fn start(&mut self, len: usize);
    /// Copies the last completed transfer into `out`.
    fn read(&mut self, out: &mut [u16]);
}

/// High-side FETs feeding the load.
pub trait PowerRail {
    fn set_enabled(&mut self, enabled: bool);
}

/// Audible alerts (buzzer).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Alert {
    BootComplete,
    LowBattery,
    Critical,
    Shutdown,
}

pub trait Annunciator {
    fn alert(&mut self, alert: Alert);
}

/// Byte sink for the diagnostic console. Returns how many bytes went out;
/// zero is a normal answer when nobody is listening.
#[allow(async_fn_in_trait)]
pub trait DiagnosticSink {
    async fn write(&mut self, bytes: &[u8]) -> usize;
}
