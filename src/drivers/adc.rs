use core::cell::RefCell;

use embassy_futures::yield_now;
use embassy_stm32::adc::{Adc, SampleTime};
use embassy_stm32::peripherals::ADC1;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Delay;
use sidecar_core::io::AdcDma;
use sidecar_core::monitor::{MonitorSignals, MAX_OVERSAMPLES};

use crate::board::PackSensePin;

struct Burst {
    samples: [u16; MAX_OVERSAMPLES],
    len: usize,
}

/// Hand-off between [`PackAdc`] and the converter task.
///
/// The request carries the burst length; the buffer holds the last finished
/// burst. The lock only covers the copy in or out, never a conversion.
pub struct AdcTransfer {
    request: Signal<CriticalSectionRawMutex, usize>,
    burst: Mutex<CriticalSectionRawMutex, RefCell<Burst>>,
}

impl AdcTransfer {
    pub const fn new() -> Self {
        Self {
            request: Signal::new(),
            burst: Mutex::new(RefCell::new(Burst {
                samples: [0; MAX_OVERSAMPLES],
                len: 0,
            })),
        }
    }
}

/// Pack voltage divider on ADC1 IN11, monitor side.
///
/// `start` posts a request and returns; [`Converter`] runs the burst on its
/// own task and flags completion like a DMA transfer-complete interrupt.
pub struct PackAdc {
    transfer: &'static AdcTransfer,
}

impl PackAdc {
    pub fn new(transfer: &'static AdcTransfer) -> Self {
        Self { transfer }
    }
}

impl AdcDma for PackAdc {
    fn stop(&mut self) {
        self.transfer.request.reset();
    }

    fn start(&mut self, len: usize) {
        self.transfer.request.signal(len.min(MAX_OVERSAMPLES));
    }

    fn read(&mut self, out: &mut [u16]) {
        self.transfer.burst.lock(|burst| {
            let burst = burst.borrow();
            let n = out.len().min(burst.len);
            out[..n].copy_from_slice(&burst.samples[..n]);
        });
    }
}

/// Pack voltage divider on ADC1 IN11, converter side.
pub struct Converter {
    adc: Adc<'static, ADC1>,
    pin: PackSensePin,
    transfer: &'static AdcTransfer,
    signals: &'static MonitorSignals,
}

impl Converter {
    pub fn new(
        adc: ADC1,
        pin: PackSensePin,
        transfer: &'static AdcTransfer,
        signals: &'static MonitorSignals,
    ) -> Self {
        let mut adc = Adc::new(adc, &mut Delay);
        // the divider is high impedance
        adc.set_sample_time(SampleTime::Cycles480);
        Self {
            adc,
            pin,
            transfer,
            signals,
        }
    }

    /// Runs requested bursts forever, one conversion per executor turn.
    pub async fn run(&mut self) -> ! {
        let mut samples = [0u16; MAX_OVERSAMPLES];
        loop {
            let len = self.transfer.request.wait().await;
            for slot in &mut samples[..len] {
                *slot = self.adc.read(&mut self.pin);
                yield_now().await;
            }
            // restarted mid-burst: these samples belong to an abandoned transfer
            if self.transfer.request.signaled() {
                continue;
            }
            self.transfer.burst.lock(|burst| {
                let mut burst = burst.borrow_mut();
                burst.samples[..len].copy_from_slice(&samples[..len]);
                burst.len = len;
            });
            self.signals.conversion_complete();
        }
    }
}
