use embassy_executor::task;
use sidecar_core::button::Pushbutton;

use crate::drivers::outputs::{ButtonInput, ButtonLed};

/// Button sampling: 40 Hz, two-sample debounce.
#[task]
pub async fn button_task(button: &'static Pushbutton, input: ButtonInput) -> ! {
    button.sample(input).await
}

#[task]
pub async fn button_led_task(button: &'static Pushbutton, led: ButtonLed) -> ! {
    button.drive_led(led).await
}
