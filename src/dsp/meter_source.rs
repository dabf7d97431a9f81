//! Windowed RMS + Clip Meter Source
//!
//! Turns a stream of multichannel audio blocks into one RMS level (linear)
//! and one clip flag per channel. Display code polls the results; nothing
//! here knows about drawing or dB scales.
//!
//! # Measurement
//! - **Bulk path** (`num_samples >= window_len`): RMS over the last
//!   `window_len` samples of the block, clip over the whole block. The
//!   history is left untouched.
//! - **Sliding path** (`num_samples < window_len`): the history slides left
//!   by `num_samples`, the new samples land at the end, and RMS and clip are
//!   taken over the whole history.
//!
//! # Lifecycle
//! - `configure` / `set_integration_time` run on a control thread and may
//!   allocate. They must be serialized against `measure_block`.
//! - `measure_block` runs on the audio thread: no allocation, no locks.

use crate::dsp::utils::{frame_rms, is_clipping, peak_magnitude};

pub const DEFAULT_SAMPLE_RATE: f32 = 44100.0;
pub const DEFAULT_BLOCK_SIZE: usize = 512;
pub const DEFAULT_INTEGRATION_MS: f32 = 300.0;
/// Longest window the source will allocate for.
pub const MAX_INTEGRATION_MS: f32 = 60_000.0;

/// Processing context handed over by the host before audio starts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeterSpec {
    pub sample_rate: f32,
    /// Largest block the host promises to deliver. Informational only, blocks
    /// of any size are accepted.
    pub max_block_size: usize,
    pub num_channels: usize,
}

impl Default for MeterSpec {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: DEFAULT_BLOCK_SIZE,
            num_channels: 1,
        }
    }
}

/// Number of samples covered by `integration_ms` at `sample_rate`, never
/// less than one. Negative times count as zero and times past
/// `MAX_INTEGRATION_MS` are clamped to it.
pub fn window_len_for(integration_ms: f32, sample_rate: f32) -> usize {
    let integration_ms = integration_ms.clamp(0.0, MAX_INTEGRATION_MS);
    let samples = (integration_ms as f64 * sample_rate as f64 / 1000.0).floor();
    (samples as usize).max(1)
}

pub struct MeterSource {
    spec: MeterSpec,
    integration_ms: f32,
    window_len: usize,

    // One sliding window per channel. Its length lags `window_len` until the
    // next `measure_block` after `set_integration_time`.
    history: Vec<Vec<f32>>,

    rms: Vec<f32>,
    clip: Vec<bool>,
}

impl Default for MeterSource {
    fn default() -> Self {
        Self::new(MeterSpec::default(), DEFAULT_INTEGRATION_MS)
    }
}

impl MeterSource {
    pub fn new(spec: MeterSpec, integration_ms: f32) -> Self {
        let mut source = Self {
            spec,
            integration_ms,
            window_len: 0,
            history: Vec::new(),
            rms: Vec::new(),
            clip: Vec::new(),
        };
        source.configure(spec, integration_ms);
        source
    }

    /// (Re)allocates every buffer for `spec` and drops all history.
    ///
    /// # Panics
    /// If `spec.num_channels` is zero, `spec.sample_rate` is not a positive
    /// finite number, or `integration_ms` is not finite.
    pub fn configure(&mut self, spec: MeterSpec, integration_ms: f32) {
        assert!(
            spec.num_channels > 0,
            "meter source needs at least one channel"
        );
        assert!(
            spec.sample_rate.is_finite() && spec.sample_rate > 0.0,
            "meter source sample rate must be > 0, got {}",
            spec.sample_rate
        );
        assert!(
            integration_ms.is_finite(),
            "meter integration time must be finite, got {}",
            integration_ms
        );

        self.spec = spec;
        self.integration_ms = integration_ms;
        self.window_len = window_len_for(integration_ms, spec.sample_rate);

        self.history = vec![vec![0.0; self.window_len]; spec.num_channels];
        self.rms = vec![0.0; spec.num_channels];
        self.clip = vec![false; spec.num_channels];

        log::debug!(
            "meter source configured: {} ch @ {} Hz, {} ms -> {} samples",
            spec.num_channels,
            spec.sample_rate,
            integration_ms,
            self.window_len
        );
    }

    /// Changes the integration window without touching the channel layout.
    ///
    /// Capacity for the new window is reserved here so the resize performed
    /// by the next `measure_block` stays allocation free. Does not log, it may
    /// be called between two audio blocks.
    ///
    /// # Panics
    /// If `integration_ms` is not finite.
    pub fn set_integration_time(&mut self, integration_ms: f32) {
        assert!(
            integration_ms.is_finite(),
            "meter integration time must be finite, got {}",
            integration_ms
        );

        self.integration_ms = integration_ms;
        self.window_len = window_len_for(integration_ms, self.spec.sample_rate);

        for channel in &mut self.history {
            channel.reserve(self.window_len.saturating_sub(channel.len()));
        }
    }

    /// Measures one block. `block` holds one slice per channel, all of the
    /// same length.
    ///
    /// A channel count that differs from the configured one is a caller bug:
    /// it trips a debug assertion, and release builds keep the previous
    /// readings.
    pub fn measure_block<S: AsRef<[f32]>>(&mut self, block: &[S]) {
        debug_assert_eq!(
            block.len(),
            self.history.len(),
            "block channel count does not match the configured meter"
        );
        if block.len() != self.history.len() {
            return;
        }

        let num_samples = block.first().map_or(0, |ch| ch.as_ref().len());
        debug_assert!(
            block.iter().all(|ch| ch.as_ref().len() == num_samples),
            "all channels of a block must have the same length"
        );

        self.apply_pending_resize();
        let window_len = self.window_len;

        if num_samples >= window_len {
            for (channel, samples) in block.iter().enumerate() {
                let samples = samples.as_ref();
                self.rms[channel] = frame_rms(&samples[num_samples - window_len..]);
                self.clip[channel] = is_clipping(peak_magnitude(samples));
            }
        } else {
            for (channel, samples) in block.iter().enumerate() {
                let samples = samples.as_ref();
                let history = &mut self.history[channel];

                history.copy_within(num_samples.., 0);
                history[window_len - num_samples..].copy_from_slice(samples);

                self.rms[channel] = frame_rms(history);
                self.clip[channel] = is_clipping(peak_magnitude(history));
            }
        }
    }

    /// Zeroes history and readings, keeping every allocation.
    pub fn reset(&mut self) {
        for channel in &mut self.history {
            channel.fill(0.0);
        }
        self.rms.fill(0.0);
        self.clip.fill(false);
    }

    // Brings the history in line with `window_len` after an integration time
    // change. Old samples are discarded.
    fn apply_pending_resize(&mut self) {
        let window_len = self.window_len;
        for channel in &mut self.history {
            if channel.len() != window_len {
                channel.clear();
                channel.resize(window_len, 0.0);
            }
        }
    }

    pub fn num_channels(&self) -> usize {
        self.rms.len()
    }

    /// Latest RMS of `channel`, linear amplitude.
    pub fn rms(&self, channel: usize) -> f32 {
        self.rms[channel]
    }

    pub fn clip(&self, channel: usize) -> bool {
        self.clip[channel]
    }

    pub fn rms_levels(&self) -> &[f32] {
        &self.rms
    }

    pub fn clips(&self) -> &[bool] {
        &self.clip
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn integration_time_ms(&self) -> f32 {
        self.integration_ms
    }

    pub fn spec(&self) -> MeterSpec {
        self.spec
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    const SR: f32 = 48000.0;

    fn spec(num_channels: usize) -> MeterSpec {
        MeterSpec {
            sample_rate: SR,
            max_block_size: 512,
            num_channels,
        }
    }

    /// 10 ms at 48 kHz: a 480 sample window.
    fn source(num_channels: usize) -> MeterSource {
        MeterSource::new(spec(num_channels), 10.0)
    }

    fn sine(amplitude: f32, period: usize, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude * (2.0 * std::f32::consts::PI * i as f32 / period as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_window_len() {
        assert_eq!(window_len_for(10.0, 48000.0), 480);
        assert_eq!(window_len_for(300.0, 44100.0), 13230);
        // floor, not round
        assert_eq!(window_len_for(1.0, 44100.0), 44);
        // never empty
        assert_eq!(window_len_for(0.0, 44100.0), 1);
        assert_eq!(window_len_for(-5.0, 44100.0), 1);
        // huge times stop at the cap instead of overflowing
        assert_eq!(window_len_for(1e30, 48000.0), 2_880_000);
    }

    #[test]
    fn test_huge_integration_time_is_clamped() {
        let mut meter = source(1);
        meter.set_integration_time(1e12);
        assert_eq!(meter.window_len(), window_len_for(MAX_INTEGRATION_MS, SR));
    }

    #[test]
    #[should_panic]
    fn test_infinite_integration_time_panics() {
        let mut meter = MeterSource::default();
        meter.set_integration_time(f32::INFINITY);
    }

    #[test]
    #[should_panic]
    fn test_configure_rejects_nan_integration_time() {
        let mut meter = MeterSource::default();
        meter.configure(spec(1), f32::NAN);
    }

    #[test]
    fn test_nan_sample_counts_as_clip() {
        let mut meter = source(1);
        let mut block = vec![0.1f32; 480];
        block[300] = f32::NAN;
        meter.measure_block(&[block]);
        assert!(meter.clip(0));
        assert!(meter.rms(0).is_nan());

        // Sliding path too
        let mut meter = source(1);
        meter.measure_block(&[vec![0.1f32, f32::NAN, 0.1]]);
        assert!(meter.clip(0));
    }

    #[test]
    fn test_num_channels_after_configure() {
        let mut meter = MeterSource::default();
        assert_eq!(meter.num_channels(), 1);

        for n in 1..=8 {
            meter.configure(spec(n), 50.0);
            assert_eq!(meter.num_channels(), n);
            assert_eq!(meter.rms_levels().len(), n);
            assert_eq!(meter.clips().len(), n);
        }
    }

    #[test]
    #[should_panic]
    fn test_configure_rejects_zero_channels() {
        let mut meter = MeterSource::default();
        meter.configure(spec(0), 10.0);
    }

    #[test]
    #[should_panic]
    fn test_configure_rejects_non_positive_sample_rate() {
        let mut meter = MeterSource::default();
        meter.configure(
            MeterSpec {
                sample_rate: 0.0,
                ..spec(2)
            },
            10.0,
        );
    }

    #[test]
    fn test_silence_bulk() {
        let mut meter = source(2);
        let silent = vec![vec![0.0f32; 1024]; 2];
        meter.measure_block(&silent);

        for ch in 0..2 {
            assert_eq!(meter.rms(ch), 0.0);
            assert!(!meter.clip(ch));
        }
    }

    #[test]
    fn test_dc_bulk() {
        let mut meter = source(1);
        meter.measure_block(&[vec![0.5f32; 480]]);
        assert_relative_eq!(meter.rms(0), 0.5, epsilon = 1e-5);
        assert!(!meter.clip(0));
    }

    #[test]
    fn test_sine_bulk() {
        let mut meter = source(1);
        // 480 samples hold exactly 10 periods of 48
        meter.measure_block(&[sine(0.8, 48, 480)]);
        assert_relative_eq!(meter.rms(0), 0.8 / 2.0f32.sqrt(), epsilon = 1e-4);
        assert!(!meter.clip(0));
    }

    #[test]
    fn test_bulk_rms_uses_only_tail() {
        let mut meter = source(1);
        let mut block = vec![0.0f32; 1000];
        block[0] = 1.5;
        meter.measure_block(&[block]);

        // Spike sits before the last 480 samples
        assert_eq!(meter.rms(0), 0.0);
        assert!(meter.clip(0));
    }

    #[test]
    fn test_bulk_spike_in_tail() {
        let mut meter = source(1);
        let mut block = vec![0.0f32; 480];
        block[479] = 1.5;
        meter.measure_block(&[block]);

        assert_relative_eq!(meter.rms(0), (1.5f32 * 1.5 / 480.0).sqrt(), epsilon = 1e-6);
        assert!(meter.clip(0));
    }

    #[test]
    fn test_negative_overs_clip() {
        let mut meter = source(1);
        let mut block = vec![0.2f32; 600];
        block[10] = -1.01;
        meter.measure_block(&[block]);
        assert!(meter.clip(0));
    }

    #[test]
    fn test_channels_measured_independently() {
        let mut meter = source(2);
        let mut right = vec![0.0f32; 480];
        right[100] = 2.0;
        meter.measure_block(&[vec![0.25f32; 480], right]);

        assert_relative_eq!(meter.rms(0), 0.25, epsilon = 1e-5);
        assert!(!meter.clip(0));
        assert!(meter.rms(1) > 0.0);
        assert!(meter.clip(1));
    }

    #[test]
    fn test_sliding_window_fills_up() {
        let mut meter = source(1);

        // Half a window of DC: the other half is still zero history
        meter.measure_block(&[vec![1.0f32; 240]]);
        assert_relative_eq!(meter.rms(0), 0.5f32.sqrt(), epsilon = 1e-5);

        meter.measure_block(&[vec![1.0f32; 240]]);
        assert_relative_eq!(meter.rms(0), 1.0, epsilon = 1e-5);
        assert!(!meter.clip(0));
    }

    #[test]
    fn test_sliding_clip_holds_while_in_window() {
        let mut meter = source(1);
        let mut spike = vec![0.0f32; 120];
        spike[0] = 1.2;
        meter.measure_block(&[spike]);
        assert!(meter.clip(0));

        // Three more blocks keep the spike inside the 480 sample window
        for _ in 0..3 {
            meter.measure_block(&[vec![0.0f32; 120]]);
            assert!(meter.clip(0));
        }

        // The fourth pushes it out
        meter.measure_block(&[vec![0.0f32; 120]]);
        assert!(!meter.clip(0));
        assert_eq!(meter.rms(0), 0.0);
    }

    #[test]
    fn test_sliding_matches_bulk_at_window_boundary() {
        let signal = sine(0.7, 37, 480);

        let mut bulk = source(1);
        bulk.measure_block(&[signal.clone()]);

        let mut sliding = source(1);
        for chunk in signal.chunks(64) {
            sliding.measure_block(&[chunk]);
        }

        assert_relative_eq!(sliding.rms(0), bulk.rms(0), epsilon = 1e-5);
        assert_eq!(sliding.clip(0), bulk.clip(0));
    }

    #[test]
    fn test_getters_are_idempotent() {
        let mut meter = source(2);
        meter.measure_block(&[sine(1.3, 20, 100), sine(0.3, 20, 100)]);

        let rms = (meter.rms(0), meter.rms(1));
        let clip = (meter.clip(0), meter.clip(1));
        for _ in 0..10 {
            assert_eq!((meter.rms(0), meter.rms(1)), rms);
            assert_eq!((meter.clip(0), meter.clip(1)), clip);
        }
    }

    #[test]
    fn test_reconfigure_resets_history() {
        let mut meter = source(1);
        meter.measure_block(&[vec![0.9f32; 100]]);
        assert!(meter.rms(0) > 0.0);

        meter.configure(spec(1), 20.0);
        assert_eq!(meter.rms(0), 0.0);

        meter.measure_block(&[vec![0.0f32; 100]]);
        assert_eq!(meter.rms(0), 0.0);
        assert!(!meter.clip(0));
    }

    #[test]
    fn test_set_integration_time_resizes_lazily() {
        let mut meter = source(1);
        meter.measure_block(&[vec![0.9f32; 100]]);

        meter.set_integration_time(20.0);
        assert_eq!(meter.window_len(), 960);
        assert_eq!(meter.num_channels(), 1);
        // Readings survive until the next block
        assert!(meter.rms(0) > 0.0);

        // History was dropped, so a silent block reads zero
        meter.measure_block(&[vec![0.0f32; 100]]);
        assert_eq!(meter.rms(0), 0.0);

        // And the window is now twice as long
        meter.measure_block(&[vec![1.0f32; 480]]);
        assert_relative_eq!(meter.rms(0), 0.5f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_measure_block_does_not_allocate() {
        let mut meter = source(2);
        meter.set_integration_time(30.0);
        let small = [vec![0.5f32; 64], vec![0.5f32; 64]];
        let large = [vec![0.5f32; 4096], vec![0.5f32; 4096]];

        assert_no_alloc::assert_no_alloc(|| {
            meter.measure_block(&small);
            meter.measure_block(&large);
            meter.reset();
        });
        assert_eq!(meter.window_len(), 1440);
    }

    #[test]
    fn test_reset_keeps_layout() {
        let mut meter = source(2);
        meter.measure_block(&[vec![1.5f32; 64], vec![0.5f32; 64]]);
        meter.reset();

        assert_eq!(meter.num_channels(), 2);
        assert_eq!(meter.window_len(), 480);
        assert_eq!(meter.rms_levels(), &[0.0, 0.0]);
        assert_eq!(meter.clips(), &[false, false]);
    }

    #[test]
    fn test_empty_block_keeps_window() {
        let mut meter = source(1);
        meter.measure_block(&[vec![0.5f32; 480]]);
        let empty: [&[f32]; 1] = [&[]];
        meter.measure_block(&empty);
        // Bulk path never fed the history, so the window is still silent
        assert_eq!(meter.rms(0), 0.0);
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_channel_panics() {
        let meter = source(2);
        meter.rms(2);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn test_channel_mismatch_asserts() {
        let mut meter = source(2);
        meter.measure_block(&[vec![0.0f32; 64]]);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_channel_mismatch_keeps_last_readings() {
        let mut meter = source(2);
        meter.measure_block(&[vec![0.5f32; 480], vec![0.5f32; 480]]);
        meter.measure_block(&[vec![0.0f32; 480]]);
        assert_relative_eq!(meter.rms(0), 0.5, epsilon = 1e-5);
    }

    proptest! {
        #[test]
        fn prop_chunked_feed_matches_single_block(
            samples in prop::collection::vec(-1.5f32..1.5, 480),
            chunk in 1usize..480,
        ) {
            let mut bulk = source(1);
            bulk.measure_block(&[samples.as_slice()]);

            let mut sliding = source(1);
            for part in samples.chunks(chunk) {
                sliding.measure_block(&[part]);
            }

            prop_assert!((sliding.rms(0) - bulk.rms(0)).abs() <= 1e-5);
            prop_assert_eq!(sliding.clip(0), bulk.clip(0));
        }
    }
}
