use embassy_stm32::gpio::{AnyPin, Pin};
use embassy_stm32::pac::Interrupt;
use embassy_stm32::peripherals::{
    ADC1, EXTI1, PA0, PA1, PA11, PA12, PB8, PB9, PC1, TIM4, TIM5, USB_OTG_FS,
};
use embassy_stm32::rcc::*;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::Config;

pub type PackSensePin = PC1;
pub type RcInputPin = PA1;

/// Vector the RC edge executor runs on. UART5 itself is not used.
pub const RC_EXECUTOR_IRQ: Interrupt = Interrupt::UART5;

pub struct UsbPins {
    pub otg: USB_OTG_FS,
    pub dp: PA12,
    pub dm: PA11,
}

/// Pack voltage: ADC1 IN11 behind a 1/113 divider.
pub struct SensePins {
    pub adc: ADC1,
    pub pin: PackSensePin,
}

/// TIM4 CH3 taillight, CH4 headlight.
pub struct LampPins {
    pub tim: TIM4,
    pub tail: PB8,
    pub head: PB9,
}

/// Receiver servo output on EXTI1.
pub struct RcPins {
    pub pin: RcInputPin,
    pub exti: EXTI1,
}

/// Push button (high = pressed) and its ring LED on TIM5 CH1.
pub struct ButtonPins {
    pub input: AnyPin,
    pub led_tim: TIM5,
    pub led: PA0,
}

/// Sidecar board, STM32F405RG, split into what each subsystem owns.
pub struct Board {
    /// Load FET gate, high = energized.
    pub fets: AnyPin,
    pub usb: UsbPins,
    pub sense: SensePins,
    /// LED 0 first.
    pub bargraph: [AnyPin; 10],
    pub lamps: LampPins,
    pub rc: RcPins,
    pub button: ButtonPins,
}

impl Board {
    pub fn init() -> Self {
        let p = embassy_stm32::init(clocks());

        Self {
            fets: p.PC0.degrade(),
            usb: UsbPins {
                otg: p.USB_OTG_FS,
                dp: p.PA12,
                dm: p.PA11,
            },
            sense: SensePins {
                adc: p.ADC1,
                pin: p.PC1,
            },
            bargraph: [
                p.PB0.degrade(),
                p.PB1.degrade(),
                p.PB2.degrade(),
                p.PB10.degrade(),
                p.PB12.degrade(),
                p.PB13.degrade(),
                p.PB14.degrade(),
                p.PB15.degrade(),
                p.PC6.degrade(),
                p.PC7.degrade(),
            ],
            lamps: LampPins {
                tim: p.TIM4,
                tail: p.PB8,
                head: p.PB9,
            },
            rc: RcPins {
                pin: p.PA1,
                exti: p.EXTI1,
            },
            button: ButtonPins {
                input: p.PB5.degrade(),
                led_tim: p.TIM5,
                led: p.PA0,
            },
        }
    }
}

/// 168 MHz from the 8 MHz crystal, 48 MHz for USB. The ADC runs at
/// PCLK2 / 4 = 21 MHz; TIM4/TIM5 see 84 MHz.
fn clocks() -> Config {
    let mut config = Config::default();
    config.rcc.hse = Some(Hse {
        freq: TimeHertz(8_000_000),
        mode: HseMode::Oscillator,
    });
    config.rcc.pll_src = PllSource::HSE;
    config.rcc.pll = Some(Pll {
        prediv: PllPreDiv::DIV4,
        mul: PllMul::MUL168,
        divp: Some(PllPDiv::DIV2),
        divq: Some(PllQDiv::DIV7),
        divr: None,
    });
    config.rcc.sys = Sysclk::PLL1_P;
    config.rcc.ahb_pre = AHBPrescaler::DIV1;
    config.rcc.apb1_pre = APBPrescaler::DIV4;
    config.rcc.apb2_pre = APBPrescaler::DIV2;
    config
}
