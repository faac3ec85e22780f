#![no_std]
#![no_main]

mod board;
mod drivers;
mod state;
mod tasks;
mod usb;

use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Input, Level, Output, OutputType, Pull, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::time::khz;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use sidecar_core::monitor::BatteryMonitor;
use sidecar_core::power::Orchestrator;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crate::board::{Board, RC_EXECUTOR_IRQ};
use crate::drivers::adc::{Converter, PackAdc};
use crate::drivers::bargraph::BargraphLeds;
use crate::drivers::lamps::Lamps;
use crate::drivers::outputs::{ButtonInput, ButtonLed, LoadFets, LogAnnunciator};
use crate::state::{ADC_TRANSFER, BARGRAPH, BUTTON, CONFIG, DIAG, LIGHTS, MONITOR};
use crate::tasks::bargraph_task::{bargraph_animate_task, bargraph_draw_task};
use crate::tasks::button_task::{button_led_task, button_task};
use crate::tasks::diag_task::diag_task;
use crate::tasks::lights_task::{lights_animate_task, lights_supervisor_task, rc_edge_task};
use crate::tasks::monitor_task::{adc_task, monitor_task};

static BATTERY: StaticCell<BatteryMonitor<'static, PackAdc>> = StaticCell::new();

// ── RC edge executor ──────────────────────────────────────────────────────────
//  Preempts the thread-mode tasks so pulse edges are stamped on wake.
static EXECUTOR_RC: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn UART5() {
    EXECUTOR_RC.on_interrupt()
}

// ── Main ──────────────────────────────────────────────────────────────────────
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // 1. Board init (168 MHz PLL)
    let board = Board::init();

    // 2. Load FETs off before anything else runs
    let fets = LoadFets::new(Output::new(board.fets, Level::Low, Speed::Low));

    // 3. USB (CDC-ACM diagnostic console)
    let (usb_dev, usb_serial) = usb::init(board.usb.otg, board.usb.dp, board.usb.dm);
    spawner.spawn(usb::usb_task(usb_dev)).unwrap();
    spawner.spawn(diag_task(&DIAG, usb_serial)).unwrap();

    // 4. Battery monitor on ADC1 / PC1, conversions on their own task
    let converter = Converter::new(board.sense.adc, board.sense.pin, &ADC_TRANSFER, &MONITOR);
    spawner.spawn(adc_task(converter)).unwrap();
    let battery: &'static BatteryMonitor<'static, PackAdc> = BATTERY.init(BatteryMonitor::new(
        &MONITOR,
        PackAdc::new(&ADC_TRANSFER),
        CONFIG.monitor,
    ));
    spawner.spawn(monitor_task(battery)).unwrap();

    // 5. Bargraph (10 LEDs, multiplexed in two phases)
    let leds = BargraphLeds::new(
        board
            .bargraph
            .map(|pin| Output::new(pin, Level::Low, Speed::Low)),
    );
    spawner.spawn(bargraph_animate_task(&BARGRAPH, MONITOR.soc())).unwrap();
    spawner.spawn(bargraph_draw_task(&BARGRAPH, leds)).unwrap();

    // 6. Lights: TIM4 CH3 = tail, CH4 = head @ 20 kHz; RC edges on the
    //    interrupt executor, priority 6
    let lamp_pwm = SimplePwm::new(
        board.lamps.tim,
        None,
        None,
        Some(PwmPin::new_ch3(board.lamps.tail, OutputType::PushPull)),
        Some(PwmPin::new_ch4(board.lamps.head, OutputType::PushPull)),
        khz(20),
        Default::default(),
    );
    let rc = ExtiInput::new(Input::new(board.rc.pin, Pull::Down), board.rc.exti);
    RC_EXECUTOR_IRQ.set_priority(Priority::P6);
    let rc_spawner = EXECUTOR_RC.start(RC_EXECUTOR_IRQ);
    rc_spawner.spawn(rc_edge_task(&LIGHTS, rc)).unwrap();
    spawner.spawn(lights_supervisor_task(&LIGHTS)).unwrap();
    spawner.spawn(lights_animate_task(&LIGHTS, Lamps::new(lamp_pwm))).unwrap();

    // 7. Power button and its LED on TIM5 CH1 @ 1 kHz
    let button = ButtonInput::new(Input::new(board.button.input, Pull::Down));
    let led_pwm = SimplePwm::new(
        board.button.led_tim,
        Some(PwmPin::new_ch1(board.button.led, OutputType::PushPull)),
        None,
        None,
        None,
        khz(1),
        Default::default(),
    );
    spawner.spawn(button_task(&BUTTON, button)).unwrap();
    spawner.spawn(button_led_task(&BUTTON, ButtonLed::new(led_pwm))).unwrap();

    // 8. Power sequencing runs on the main task until shutdown
    let mut power = Orchestrator::new(
        battery,
        &BUTTON,
        &BARGRAPH,
        &LIGHTS,
        &DIAG,
        fets,
        LogAnnunciator,
        CONFIG.power,
    );
    let reason = power.run().await;
    defmt::warn!("halted: {}", reason);

    // 9. Load is off; wait for the logic rail to collapse
    loop {
        cortex_m::asm::wfi();
    }
}
