use embassy_executor::task;
use embassy_futures::select::{select, Either};
use embassy_stm32::exti::ExtiInput;
use embassy_time::{Duration, Instant, Timer};
use sidecar_core::lights::{Lights, PulseTimer};

use crate::board::RcInputPin;
use crate::drivers::lamps::Lamps;

/// RC receiver input: times each servo pulse and posts its width.
///
/// Runs on the interrupt-priority executor, so the timestamp is taken in the
/// EXTI wake path and thread-mode work cannot stretch a pulse.
///
/// No edge within `signal_timeout_ms` is treated like a pulse-timer overflow:
/// the receiver is gone and a zero width is posted.
#[task]
pub async fn rc_edge_task(lights: &'static Lights, mut rc: ExtiInput<'static, RcInputPin>) {
    let timeout = Duration::from_millis(lights.config().signal_timeout_ms);
    let mut pulse = PulseTimer::new();

    loop {
        match select(rc.wait_for_any_edge(), Timer::after(timeout)).await {
            Either::First(()) => {
                let now_us = Instant::now().as_micros();
                if let Some(width) = pulse.edge(rc.is_high(), now_us) {
                    lights.publish_pulse(width);
                }
            }
            Either::Second(()) => {
                pulse.overflow();
                lights.signal_lost();
            }
        }
    }
}

/// Light supervisor: 20 Hz debounce of the RC channel. Ends at shutdown.
#[task]
pub async fn lights_supervisor_task(lights: &'static Lights) {
    lights.supervise().await;
    defmt::info!("lights: supervisor stopped");
}

/// Plays the selected pattern on the lamps. Ends at shutdown, lamps dark.
#[task]
pub async fn lights_animate_task(lights: &'static Lights, lamps: Lamps) {
    lights.animate(lamps).await;
    defmt::info!("lights: animator stopped");
}
