use embassy_executor::task;
use sidecar_core::diag::Diagnostics;

use crate::usb::{UsbSerial, UsbSink};

/// Forwards diagnostic reports to the USB console.
#[task]
pub async fn diag_task(diag: &'static Diagnostics, usb_serial: UsbSerial<'static>) -> ! {
    diag.pump(UsbSink::new(usb_serial)).await
}
