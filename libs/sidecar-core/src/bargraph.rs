//! Ten-LED state-of-charge bargraph.
//!
//! Two cooperating loops share a [`Bargraph`]: the animator turns a SOC into a
//! short sequence of display frames, the drawer multiplexes the current frame
//! onto the LED port. The drawer only runs while an animation is playing.

use embassy_time::{Duration, Timer};
use heapless::Vec;
#[allow(unused_imports)]
use micromath::F32Ext;

use crate::config::BargraphConfig;
use crate::io::BargraphPort;
use crate::sync::{EventFlags, Mailbox, WaitMode};

pub const LED_COUNT: u8 = 10;
/// Highest level `soc_level` can return.
pub const MAX_LEVEL: u8 = 19;

/// Alternate half-frames light only one of these masks, halving peak current.
const PHASE_MASKS: [u16; 2] = [0x2AA, 0x155];
/// SOC values at or above 1 are drawn as this.
const SOC_CEILING: f32 = 0.999;
/// Longest sequence: ten critical blinks, two frames each.
const MAX_FRAMES: usize = 2 * 10 + 4;

pub mod flag {
    /// Set while the animator is idle and will accept a request.
    pub const ANIMATOR_READY: u32 = 1 << 0;
    pub const RUN_ANIMATION: u32 = 1 << 1;
    /// Level: the drawer multiplexes while this is set.
    pub const DRAWER_ENABLED: u32 = 1 << 2;
    pub const ENGINE_STARTED: u32 = 1 << 3;
}

/// Scales a SOC to a bargraph level in `0..=19`; each LED covers two levels.
pub fn soc_level(soc: f32) -> u8 {
    let soc = if soc >= 1.0 {
        SOC_CEILING
    } else if soc < 0.0 || soc.is_nan() {
        0.0
    } else {
        soc
    };
    ((soc * 20.0).floor() as u8).min(MAX_LEVEL)
}

/// One display buffer and how long it stays up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub leds: u16,
    pub hold_ms: u32,
}

/// Builds the frame sequence for `level`.
///
/// - level 0: LED 0 blinks (critical)
/// - otherwise LEDs below `level / 2` build up one by one, then LED
///   `level / 2` is held solid for odd levels or blinks for even ones
pub fn soc_frames(level: u8, config: &BargraphConfig) -> Vec<Frame, MAX_FRAMES> {
    let mut frames = Vec::new();

    if level < 1 {
        for _ in 0..config.critical_flash_count.min(10) {
            let _ = frames.push(Frame { leds: 1, hold_ms: config.critical_flash_ms });
            let _ = frames.push(Frame { leds: 0, hold_ms: config.critical_flash_ms });
        }
        return frames;
    }

    let level = level.min(MAX_LEVEL);
    let top = level >> 1;
    let mut leds = 0u16;
    for i in 0..top {
        leds |= 1 << i;
        let _ = frames.push(Frame { leds, hold_ms: config.buildup_ms });
    }

    if level & 1 == 1 {
        leds |= 1 << top;
        let _ = frames.push(Frame {
            leds,
            hold_ms: config.flash_ms * config.flash_count as u32 * 2,
        });
    } else {
        for _ in 0..(config.flash_count.min(7) << 1) {
            leds ^= 1 << top;
            let _ = frames.push(Frame { leds, hold_ms: config.flash_ms });
        }
    }
    frames
}

pub struct Bargraph {
    flags: EventFlags,
    frame: Mailbox<u16>,
    config: BargraphConfig,
}

impl Bargraph {
    pub const fn new(config: BargraphConfig) -> Self {
        Self {
            flags: EventFlags::new(),
            frame: Mailbox::new(),
            config,
        }
    }

    /// Enables the animator; requests before this are ignored.
    pub fn start(&self) {
        self.flags.set(flag::ENGINE_STARTED);
    }

    /// Plays the SOC animation unless one is already running.
    ///
    /// Returns whether the request was accepted.
    pub fn draw_soc(&self) -> bool {
        if self.flags.any(flag::ANIMATOR_READY) {
            self.flags.set(flag::RUN_ANIMATION);
            true
        } else {
            false
        }
    }

    pub fn is_idle(&self) -> bool {
        self.flags.any(flag::ANIMATOR_READY)
    }

    pub fn flags(&self) -> &EventFlags {
        &self.flags
    }

    fn show(&self, leds: u16) {
        self.frame.put(leds);
    }

    /// Animator task body. Reads the SOC published by the battery monitor.
    pub async fn animate(&self, soc_source: &Mailbox<f32>) -> ! {
        self.flags.clear(flag::RUN_ANIMATION);
        self.flags.wait(flag::ENGINE_STARTED, WaitMode::Keep).await;

        let mut soc = 0.0f32;
        loop {
            self.flags.set(flag::ANIMATOR_READY);
            self.flags.wait(flag::RUN_ANIMATION, WaitMode::Clear).await;
            self.flags.clear(flag::ANIMATOR_READY);

            if let Some(latest) = soc_source.try_get() {
                soc = latest;
            }
            let level = soc_level(soc);
            debug!("bargraph: soc {} -> level {}", soc, level);

            // resume the drawer on a blank frame
            self.show(0);
            self.flags.set(flag::DRAWER_ENABLED);

            for frame in soc_frames(level, &self.config) {
                self.show(frame.leds);
                Timer::after(Duration::from_millis(frame.hold_ms as u64)).await;
            }

            // drawer blanks the port when it sees this
            self.flags.clear(flag::DRAWER_ENABLED);
            self.show(0);
        }
    }

    /// Drawer task body: owns the LED port.
    pub async fn draw<P: BargraphPort>(&self, mut port: P) -> ! {
        port.output(0);
        loop {
            self.flags.wait(flag::DRAWER_ENABLED, WaitMode::Keep).await;

            let mut buffer = 0u16;
            let mut phase = 0usize;
            while self.flags.any(flag::DRAWER_ENABLED) {
                if let Some(latest) = self.frame.try_get() {
                    buffer = latest;
                }
                port.output(buffer & PHASE_MASKS[phase]);
                phase ^= 1;
                Timer::after(Duration::from_millis(self.config.refresh_ms)).await;
            }
            port.output(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> BargraphConfig {
        BargraphConfig::new()
    }

    #[test]
    fn level_covers_unit_range() {
        assert_eq!(soc_level(0.0), 0);
        assert_eq!(soc_level(0.049), 0);
        assert_eq!(soc_level(0.05), 1);
        assert_eq!(soc_level(0.54), 10);
        assert_eq!(soc_level(0.999), 19);
    }

    #[test]
    fn out_of_range_soc_is_clamped() {
        assert_eq!(soc_level(-0.3), 0);
        assert_eq!(soc_level(1.0), soc_level(0.999));
        assert_eq!(soc_level(7.5), 19);
        assert_eq!(soc_level(f32::NAN), 0);
    }

    #[test]
    fn every_soc_maps_into_level_range() {
        for i in 0..=1000 {
            let soc = i as f32 / 1000.0;
            assert!(soc_level(soc) <= MAX_LEVEL);
        }
    }

    #[test]
    fn critical_level_blinks_bottom_led() {
        let frames = soc_frames(0, &cfg());
        assert_eq!(frames.len(), 20);
        for pair in frames.chunks(2) {
            assert_eq!(pair[0], Frame { leds: 1, hold_ms: 75 });
            assert_eq!(pair[1], Frame { leds: 0, hold_ms: 75 });
        }
    }

    #[test]
    fn even_level_builds_up_then_blinks_top() {
        // SOC 0.54 -> level 10
        let frames = soc_frames(soc_level(0.54), &cfg());
        let (buildup, blink) = frames.split_at(5);
        let mut leds = 0;
        for (i, f) in buildup.iter().enumerate() {
            leds |= 1 << i;
            assert_eq!(*f, Frame { leds, hold_ms: 50 });
        }
        assert_eq!(leds, 0b1_1111);
        assert_eq!(blink.len(), 8);
        for (i, f) in blink.iter().enumerate() {
            let lit = if i % 2 == 0 { 1 << 5 } else { 0 };
            assert_eq!(*f, Frame { leds: 0b1_1111 | lit, hold_ms: 500 });
        }
    }

    #[test]
    fn odd_level_holds_top_solid() {
        let frames = soc_frames(11, &cfg());
        assert_eq!(frames.len(), 6);
        assert_eq!(*frames.last().unwrap(), Frame { leds: 0b11_1111, hold_ms: 4000 });
    }

    #[test]
    fn full_pack_lights_all_ten() {
        let frames = soc_frames(19, &cfg());
        assert_eq!(frames.last().unwrap().leds, 0x3FF);
    }

    #[test]
    fn lowest_nonzero_level_is_a_lone_solid_led() {
        let frames = soc_frames(1, &cfg());
        assert_eq!(frames.as_slice(), &[Frame { leds: 1, hold_ms: 4000 }]);
    }

    #[test]
    fn draw_request_dropped_until_animator_idle() {
        let bargraph = Bargraph::new(cfg());
        assert!(!bargraph.draw_soc());
        assert!(!bargraph.flags().any(flag::RUN_ANIMATION));

        bargraph.flags().set(flag::ANIMATOR_READY);
        assert!(bargraph.draw_soc());
        assert!(bargraph.flags().any(flag::RUN_ANIMATION));
    }

    #[test]
    fn phase_masks_cover_ten_leds_without_overlap() {
        assert_eq!(PHASE_MASKS[0] & PHASE_MASKS[1], 0);
        assert_eq!(PHASE_MASKS[0] | PHASE_MASKS[1], 0x3FF);
    }
}
