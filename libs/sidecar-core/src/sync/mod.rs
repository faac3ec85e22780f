//! Inter-task plumbing.
//!
//! Tasks never share state directly: values travel through single-slot
//! [`Mailbox`]es and intent travels through [`EventFlags`]. A task waits on at
//! most one flag set at a time.

mod cancel;
mod flags;
mod mailbox;

pub use cancel::{CancelToken, Cancelled};
pub use flags::{EventFlags, FlagsTimeout, WaitMode};
pub use mailbox::Mailbox;
