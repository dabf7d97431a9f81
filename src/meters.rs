//! Thread-safe metering readout for real-time audio processing.
//!
//! The audio thread publishes the latest `MeterSource` readings here as
//! atomic float bits, and UI threads poll them without locks. Each channel
//! value is stored on its own, so a reader may see channel 0 from one block
//! and channel 1 from the next.

use crate::dsp::utils::gain_to_db;
use crate::dsp::MeterSource;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

/// Largest channel count the readout can hold.
pub const MAX_CHANNELS: usize = 8;

/// Per-channel RMS, clip, and latched clip state shared with the UI.
#[derive(Default)]
pub struct Meters {
    num_channels: AtomicUsize,
    rms: [AtomicU32; MAX_CHANNELS],
    clip: [AtomicBool; MAX_CHANNELS],
    // Stays set until the UI acknowledges it
    clip_latched: [AtomicBool; MAX_CHANNELS],
}

impl Meters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_num_channels(&self, num_channels: usize) {
        debug_assert!(num_channels <= MAX_CHANNELS);
        self.num_channels
            .store(num_channels.min(MAX_CHANNELS), Ordering::Relaxed);
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels.load(Ordering::Relaxed)
    }

    pub fn set_rms(&self, channel: usize, val: f32) {
        self.rms[channel].store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_clip(&self, channel: usize, clipped: bool) {
        self.clip[channel].store(clipped, Ordering::Relaxed);
    }

    pub fn rms(&self, channel: usize) -> f32 {
        f32::from_bits(self.rms[channel].load(Ordering::Relaxed))
    }

    pub fn rms_db(&self, channel: usize, floor_db: f32) -> f32 {
        gain_to_db(self.rms(channel), floor_db)
    }

    pub fn clip(&self, channel: usize) -> bool {
        self.clip[channel].load(Ordering::Relaxed)
    }

    pub fn is_clip_latched(&self, channel: usize) -> bool {
        self.clip_latched[channel].load(Ordering::Relaxed)
    }

    /// Clears the latched clip of one channel, e.g. when the indicator is
    /// clicked.
    pub fn acknowledge_clip(&self, channel: usize) {
        self.clip_latched[channel].store(false, Ordering::Relaxed);
    }

    pub fn clear_clip_latches(&self) {
        for latch in &self.clip_latched {
            latch.store(false, Ordering::Relaxed);
        }
    }

    /// Copies the latest readings of `source`. Returns `true` when at least
    /// one channel's clip latch went from clear to set.
    pub fn publish(&self, source: &MeterSource) -> bool {
        let mut newly_latched = false;
        let channels = source.num_channels().min(MAX_CHANNELS);

        for channel in 0..channels {
            let clipped = source.clip(channel);
            self.set_rms(channel, source.rms(channel));
            self.set_clip(channel, clipped);

            if clipped && !self.clip_latched[channel].swap(true, Ordering::Relaxed) {
                newly_latched = true;
            }
        }

        newly_latched
    }

    pub fn reset(&self) {
        for channel in 0..MAX_CHANNELS {
            self.set_rms(channel, 0.0);
            self.set_clip(channel, false);
        }
        self.clear_clip_latches();
    }
}
