use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Single-slot mailbox carrying the latest value of `T`.
///
/// `put` replaces whatever is unread, so the consumer sees either the newest
/// value or nothing. Safe to `put` from interrupt context.
pub struct Mailbox<T> {
    slot: Signal<CriticalSectionRawMutex, T>,
}

impl<T: Send> Mailbox<T> {
    pub const fn new() -> Self {
        Self { slot: Signal::new() }
    }

    pub fn put(&self, value: T) {
        self.slot.signal(value);
    }

    /// Takes the pending value, leaving the slot empty.
    pub fn try_get(&self) -> Option<T> {
        self.slot.try_take()
    }

    pub fn is_empty(&self) -> bool {
        !self.slot.signaled()
    }

    pub fn clear(&self) {
        self.slot.reset();
    }
}

impl<T: Send> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mailbox_reads_nothing() {
        let mb: Mailbox<u16> = Mailbox::new();
        assert!(mb.is_empty());
        assert_eq!(mb.try_get(), None);
    }

    #[test]
    fn second_write_replaces_unread_first() {
        let mb = Mailbox::new();
        mb.put(0.25f32);
        mb.put(0.75f32);
        assert_eq!(mb.try_get(), Some(0.75));
        assert_eq!(mb.try_get(), None);
    }

    #[test]
    fn same_value_twice_is_read_once() {
        let mb = Mailbox::new();
        mb.put(7u16);
        mb.put(7u16);
        assert_eq!(mb.try_get(), Some(7));
        assert!(mb.is_empty());
    }

    #[test]
    fn clear_drops_pending_value() {
        let mb = Mailbox::new();
        mb.put(3u16);
        mb.clear();
        assert_eq!(mb.try_get(), None);
    }
}
