use embassy_executor::task;
use sidecar_core::bargraph::Bargraph;
use sidecar_core::sync::Mailbox;

use crate::drivers::bargraph::BargraphLeds;

/// Turns a draw request into a SOC animation.
#[task]
pub async fn bargraph_animate_task(bargraph: &'static Bargraph, soc: &'static Mailbox<f32>) -> ! {
    bargraph.animate(soc).await
}

/// Multiplexes the current frame onto the LEDs while an animation plays.
#[task]
pub async fn bargraph_draw_task(bargraph: &'static Bargraph, leds: BargraphLeds) -> ! {
    bargraph.draw(leds).await
}
