mod debug;
pub mod dsp;
pub mod meters;
pub mod presets;
pub mod scale;

use crate::dsp::meter_source::DEFAULT_INTEGRATION_MS;
use crate::dsp::{MeterSource, MeterSpec};
use crate::meters::Meters;
use crate::presets::{IntegrationPreset, PresetManager};
use crate::scale::MeterScale;
use assert_no_alloc::permit_alloc;
use nih_plug::prelude::*;
use std::sync::Arc;

const MIN_INTEGRATION_MS: f32 = 1.0;
const MAX_INTEGRATION_MS: f32 = 3000.0;

// -----------------------------------------------------------------------------
// PARAMETERS
// -----------------------------------------------------------------------------
#[derive(Params)]
pub struct LevelMeterParams {
    #[id = "integration_time"]
    pub integration_time: FloatParam,

    /// Overrides `integration_time` unless set to Manual
    #[id = "integration_preset"]
    pub integration_preset: EnumParam<IntegrationPreset>,

    #[id = "reset_clip"]
    pub reset_clip: BoolParam,
}

fn format_ms(v: f32) -> String {
    format!("{:.0} ms", v)
}

impl Default for LevelMeterParams {
    fn default() -> Self {
        Self {
            integration_time: FloatParam::new(
                "Integration Time",
                DEFAULT_INTEGRATION_MS,
                FloatRange::Skewed {
                    min: MIN_INTEGRATION_MS,
                    max: MAX_INTEGRATION_MS,
                    factor: FloatRange::skew_factor(-2.0),
                },
            )
            .with_value_to_string(Arc::new(format_ms)),

            integration_preset: EnumParam::new("Ballistics", IntegrationPreset::Manual),

            reset_clip: BoolParam::new("Reset Clip", false).non_automatable(),
        }
    }
}

/// Work pushed off the audio thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterTask {
    DrainLog,
}

// -----------------------------------------------------------------------------
// PLUGIN STRUCT
// -----------------------------------------------------------------------------
pub struct LevelMeterPlugin {
    params: Arc<LevelMeterParams>,
    meter: MeterSource,
    meters: Arc<Meters>,
    preset_manager: PresetManager,
}

impl Default for LevelMeterPlugin {
    fn default() -> Self {
        let meter = MeterSource::default();
        let meters = Arc::new(Meters::new());
        meters.set_num_channels(meter.num_channels());

        Self {
            params: Arc::new(LevelMeterParams::default()),
            meter,
            meters,
            preset_manager: PresetManager::new(),
        }
    }
}

impl Plugin for LevelMeterPlugin {
    const NAME: &'static str = "Level Meter";
    const VENDOR: &'static str = "levelmeter";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            ..AudioIOLayout::const_default()
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = MeterTask;

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn task_executor(&mut self) -> TaskExecutor<Self> {
        Box::new(|task| match task {
            MeterTask::DrainLog => debug::drain_log(),
        })
    }

    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        debug::init_log();

        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let num_channels = audio_io_layout
                .main_input_channels
                .map(NonZeroU32::get)
                .unwrap_or(1) as usize;
            let num_channels = num_channels.min(meters::MAX_CHANNELS);

            self.configure_meter(
                buffer_config.sample_rate,
                buffer_config.max_buffer_size as usize,
                num_channels,
            );
            true
        }))
        .unwrap_or(false)
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let newly_clipped = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.process_block(buffer.as_slice_immutable())
        }))
        .unwrap_or(false);

        if newly_clipped {
            context.execute_background(MeterTask::DrainLog);
        }

        ProcessStatus::Normal
    }

    fn reset(&mut self) {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.meter.reset();
            self.meters.reset();
        }))
        .unwrap_or(());
    }
}

impl LevelMeterPlugin {
    /// Shared readout for editors and other UI-side consumers.
    pub fn meters(&self) -> Arc<Meters> {
        self.meters.clone()
    }

    pub fn meter(&self) -> &MeterSource {
        &self.meter
    }

    /// Display scale matching the active ballistics preset.
    pub fn scale(&self) -> MeterScale {
        self.preset_manager
            .scale(self.params.integration_preset.value())
    }

    fn configure_meter(&mut self, sample_rate: f32, max_block_size: usize, num_channels: usize) {
        let spec = MeterSpec {
            sample_rate,
            max_block_size,
            num_channels,
        };
        self.meter.configure(spec, self.target_integration_ms());
        self.meters.set_num_channels(num_channels);
        self.meters.reset();
    }

    fn target_integration_ms(&self) -> f32 {
        self.preset_manager
            .integration_ms(self.params.integration_preset.value())
            .unwrap_or_else(|| self.params.integration_time.value())
    }

    /// Measures one block and publishes the result. Returns `true` when a
    /// channel started clipping since the last acknowledgement.
    fn process_block(&mut self, channels: &[&mut [f32]]) -> bool {
        // Integration changes only ever land between blocks
        let target_ms = self.target_integration_ms();
        if (target_ms - self.meter.integration_time_ms()).abs() > f32::EPSILON {
            permit_alloc(|| self.meter.set_integration_time(target_ms));
            crate::meter_log!(
                "integration time set to {} ms -> {} samples",
                target_ms,
                self.meter.window_len()
            );
        }

        if self.params.reset_clip.value() {
            self.meters.clear_clip_latches();
        }

        self.meter.measure_block(channels);
        let newly_clipped = self.meters.publish(&self.meter);

        if newly_clipped {
            for (channel, clipped) in self.meter.clips().iter().enumerate() {
                if *clipped {
                    crate::meter_log!(
                        "clip on channel {} (rms {:.3})",
                        channel,
                        self.meter.rms(channel)
                    );
                }
            }
        }

        newly_clipped
    }
}

impl ClapPlugin for LevelMeterPlugin {
    const CLAP_ID: &'static str = "com.levelmeter.rms-clip";
    const CLAP_DESCRIPTION: Option<&'static str> = Some("Windowed RMS meter with clip detection");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Analyzer,
        ClapFeature::Stereo,
        ClapFeature::Mono,
    ];
}

impl Vst3Plugin for LevelMeterPlugin {
    const VST3_CLASS_ID: [u8; 16] = *b"LevelMeterRmsClp";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Analyzer];
}

nih_export_clap!(LevelMeterPlugin);
nih_export_vst3!(LevelMeterPlugin);
