//! Diagnostic console: structured reports rendered as text lines.
//!
//! Reporting never blocks the caller. A full queue or a sink that takes
//! nothing simply loses the report.

use core::fmt::Write as _;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::String;

use crate::io::DiagnosticSink;
use crate::power::ShutdownReason;

pub const QUEUE_DEPTH: usize = 8;
pub const LINE_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Report {
    Boot,
    VoltageCheck { passed: bool },
    PoweredUp,
    LowBattery,
    BatteryCritical,
    MonitorFailure,
    ShutdownArmed { grace_ms: u64 },
    ShuttingDown(ShutdownReason),
}

impl Report {
    /// One CRLF-terminated console line.
    pub fn render(&self) -> String<LINE_CAPACITY> {
        let mut line = String::new();
        let _ = match self {
            Report::Boot => write!(line, "boot: waiting for long press"),
            Report::VoltageCheck { passed } => {
                write!(line, "voltage check: {}", if *passed { "pass" } else { "FAIL" })
            }
            Report::PoweredUp => write!(line, "power: load enabled"),
            Report::LowBattery => write!(line, "battery: low"),
            Report::BatteryCritical => write!(line, "battery: CRITICAL"),
            Report::MonitorFailure => write!(line, "battery: monitor read failure"),
            Report::ShutdownArmed { grace_ms } => write!(line, "shutdown in {} ms", grace_ms),
            Report::ShuttingDown(reason) => write!(line, "shutting down: {:?}", reason),
        };
        let _ = line.push_str("\r\n");
        line
    }
}

pub struct Diagnostics {
    queue: Channel<CriticalSectionRawMutex, Report, QUEUE_DEPTH>,
}

impl Diagnostics {
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
        }
    }

    pub fn report(&self, report: Report) {
        let _ = self.queue.try_send(report);
    }

    pub fn try_next(&self) -> Option<Report> {
        self.queue.try_receive().ok()
    }

    /// Console task body.
    pub async fn pump<S: DiagnosticSink>(&self, mut sink: S) -> ! {
        loop {
            let report = self.queue.receive().await;
            let line = report.render();
            let _ = sink.write(line.as_bytes()).await;
        }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_crlf_terminated() {
        assert_eq!(Report::Boot.render().as_str(), "boot: waiting for long press\r\n");
        assert_eq!(
            Report::ShutdownArmed { grace_ms: 10_000 }.render().as_str(),
            "shutdown in 10000 ms\r\n"
        );
        assert_eq!(
            Report::ShuttingDown(ShutdownReason::UserRequest).render().as_str(),
            "shutting down: UserRequest\r\n"
        );
    }

    #[test]
    fn full_queue_drops_newest() {
        let diag = Diagnostics::new();
        for _ in 0..QUEUE_DEPTH {
            diag.report(Report::LowBattery);
        }
        diag.report(Report::PoweredUp);

        let mut drained = 0;
        while let Some(r) = diag.try_next() {
            assert_eq!(r, Report::LowBattery);
            drained += 1;
        }
        assert_eq!(drained, QUEUE_DEPTH);
    }
}
