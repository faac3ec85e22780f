use embassy_time::Duration;

use super::{EventFlags, WaitMode};

/// A newer request arrived while an animation step was holding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cancelled;

/// Cancellation for long-running animation loops.
///
/// Any bit of `mask` becoming set on `flags` cancels the owner. Bits are never
/// consumed here; the dispatcher that regains control decides what to run.
#[derive(Clone, Copy)]
pub struct CancelToken<'a> {
    flags: &'a EventFlags,
    mask: u32,
}

impl<'a> CancelToken<'a> {
    pub const fn new(flags: &'a EventFlags, mask: u32) -> Self {
        Self { flags, mask }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.any(self.mask)
    }

    /// Holds the current output for `ms`, returning early on cancellation.
    pub async fn hold(&self, ms: u64) -> Result<(), Cancelled> {
        match self
            .flags
            .wait_timeout(self.mask, WaitMode::Keep, Duration::from_millis(ms))
            .await
        {
            Ok(_) => Err(Cancelled),
            Err(_) => Ok(()),
        }
    }
}
