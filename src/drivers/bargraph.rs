use embassy_stm32::gpio::{AnyPin, Output};
use sidecar_core::bargraph::LED_COUNT;
use sidecar_core::io::BargraphPort;

/// Ten discrete LED lines, LED 0 at the bottom of the graph.
pub struct BargraphLeds {
    pins: [Output<'static, AnyPin>; LED_COUNT as usize],
}

impl BargraphLeds {
    pub fn new(pins: [Output<'static, AnyPin>; LED_COUNT as usize]) -> Self {
        Self { pins }
    }
}

impl BargraphPort for BargraphLeds {
    fn output(&mut self, states: u16) {
        for (i, pin) in self.pins.iter_mut().enumerate() {
            if states & (1 << i) != 0 {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
    }
}
