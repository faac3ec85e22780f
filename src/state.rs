//! Statically allocated state shared between tasks.
//!
//! Everything here is const-constructible, so it lives in plain statics and
//! tasks receive `&'static` handles. Only the battery monitor, which holds the ADC
//! request handle, is built at runtime (see `main`).

use sidecar_core::bargraph::Bargraph;
use sidecar_core::button::Pushbutton;
use sidecar_core::diag::Diagnostics;
use sidecar_core::lights::Lights;
use sidecar_core::monitor::MonitorSignals;
use sidecar_core::SidecarConfig;

use crate::drivers::adc::AdcTransfer;

pub const CONFIG: SidecarConfig = SidecarConfig::new();

/// Monitor flags and the SOC mailbox; also touched by the ADC driver.
pub static MONITOR: MonitorSignals = MonitorSignals::new();
/// Burst requests and results between the monitor and the ADC task.
pub static ADC_TRANSFER: AdcTransfer = AdcTransfer::new();
pub static BARGRAPH: Bargraph = Bargraph::new(CONFIG.bargraph);
/// Pulse mailbox and pattern flags; the RC edge task writes here.
pub static LIGHTS: Lights = Lights::new(CONFIG.lights);
pub static BUTTON: Pushbutton = Pushbutton::new(CONFIG.button, CONFIG.led);
pub static DIAG: Diagnostics = Diagnostics::new();
