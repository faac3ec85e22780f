//! Control logic for the Eboard sidecar.
//!
//! Everything in here is hardware-agnostic: the board crate hands in the
//! drivers through the traits in [`io`] and wraps the async loops into
//! executor tasks.
//!
//! - [`sync`] mailbox, event flags and the cancellation token
//! - [`monitor`] pack voltage acquisition, SOC and fault latches
//! - [`bargraph`] SOC animation and the multiplexed drawer
//! - [`lights`] RC pulse decoding and head/tail light patterns
//! - [`button`] power button classifier and its LED
//! - [`power`] power sequencing and shutdown
//! - [`diag`] diagnostic reports for the serial console

#![no_std]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

pub mod bargraph;
pub mod button;
pub mod config;
pub mod diag;
pub mod io;
pub mod lights;
pub mod monitor;
pub mod power;
pub mod sync;

pub use config::SidecarConfig;
