use embassy_executor::task;
use sidecar_core::monitor::BatteryMonitor;

use crate::drivers::adc::{Converter, PackAdc};

/// Battery monitor: idles until power-up, then samples every 10 ms.
#[task]
pub async fn monitor_task(monitor: &'static BatteryMonitor<'static, PackAdc>) -> ! {
    monitor.run().await
}

/// ADC bursts requested by the monitor, yielding between conversions.
#[task]
pub async fn adc_task(mut converter: Converter) -> ! {
    converter.run().await
}
