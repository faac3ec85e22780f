use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Context, Poll};

use critical_section::Mutex;
use embassy_sync::waitqueue::MultiWakerRegistration;
use embassy_time::{with_timeout, Duration};

/// Tasks that may be parked on one flag set at the same time.
const MAX_WAITERS: usize = 4;

/// What a successful wait does with the bits it matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitMode {
    /// Clear the matched bits before returning (one-shot signal).
    Clear,
    /// Leave the bits set; the waiter clears what it consumes.
    Keep,
}

/// A flag wait ran out of time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlagsTimeout;

struct State {
    bits: u32,
    waiters: MultiWakerRegistration<MAX_WAITERS>,
}

/// 32-bit event flag set.
///
/// Set/clear/get are atomic with respect to tasks and interrupts. `set` wakes
/// every parked waiter; each re-checks its own mask, so two waiters racing for
/// an auto-clearing bit see exactly one winner.
pub struct EventFlags {
    state: Mutex<RefCell<State>>,
}

impl EventFlags {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                bits: 0,
                waiters: MultiWakerRegistration::new(),
            })),
        }
    }

    /// Sets `mask`, returns the flags afterwards.
    pub fn set(&self, mask: u32) -> u32 {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.bits |= mask;
            state.waiters.wake();
            state.bits
        })
    }

    /// Clears `mask`, returns the flags as they were before.
    pub fn clear(&self, mask: u32) -> u32 {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let before = state.bits;
            state.bits &= !mask;
            before
        })
    }

    pub fn get(&self) -> u32 {
        critical_section::with(|cs| self.state.borrow_ref(cs).bits)
    }

    /// True when any bit of `mask` is set.
    pub fn any(&self, mask: u32) -> bool {
        self.get() & mask != 0
    }

    /// Reads a latch and optionally consumes it in the same critical section.
    pub fn test(&self, mask: u32, clear: bool) -> bool {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let hit = state.bits & mask != 0;
            if hit && clear {
                state.bits &= !mask;
            }
            hit
        })
    }

    fn poll_wait(&self, mask: u32, mode: WaitMode, cx: &mut Context<'_>) -> Poll<u32> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let matched = state.bits & mask;
            if matched != 0 {
                if mode == WaitMode::Clear {
                    state.bits &= !matched;
                }
                Poll::Ready(matched)
            } else {
                state.waiters.register(cx.waker());
                Poll::Pending
            }
        })
    }

    /// Waits until any bit of `mask` is set and returns the matched bits.
    pub async fn wait(&self, mask: u32, mode: WaitMode) -> u32 {
        poll_fn(|cx| self.poll_wait(mask, mode, cx)).await
    }

    /// Like [`wait`](Self::wait), bounded by `timeout`.
    pub async fn wait_timeout(
        &self,
        mask: u32,
        mode: WaitMode,
        timeout: Duration,
    ) -> Result<u32, FlagsTimeout> {
        with_timeout(timeout, self.wait(mask, mode))
            .await
            .map_err(|_| FlagsTimeout)
    }
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::new()
    }
}
