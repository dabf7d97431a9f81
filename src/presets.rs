use crate::scale::{MeterRange, MeterScale};
use anyhow::Context;
use nih_plug::prelude::Enum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// INTEGRATION PRESETS
// =============================================================================

/// Factory meter ballistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[repr(usize)]
pub enum IntegrationPreset {
    #[serde(rename = "Manual")]
    #[name = "Manual"]
    Manual,
    #[serde(rename = "Peak Program (10 ms)")]
    #[name = "Peak Program (10 ms)"]
    PeakProgram,
    #[serde(rename = "Fast (50 ms)")]
    #[name = "Fast (50 ms)"]
    Fast,
    #[serde(rename = "VU (300 ms)")]
    #[name = "VU (300 ms)"]
    Vu,
    #[serde(rename = "Slow (1000 ms)")]
    #[name = "Slow (1000 ms)"]
    Slow,
}

impl IntegrationPreset {
    pub fn all_presets() -> [IntegrationPreset; 5] {
        [
            IntegrationPreset::Manual,
            IntegrationPreset::PeakProgram,
            IntegrationPreset::Fast,
            IntegrationPreset::Vu,
            IntegrationPreset::Slow,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            IntegrationPreset::Manual => "Manual",
            IntegrationPreset::PeakProgram => "Peak Program (10 ms)",
            IntegrationPreset::Fast => "Fast (50 ms)",
            IntegrationPreset::Vu => "VU (300 ms)",
            IntegrationPreset::Slow => "Slow (1000 ms)",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            IntegrationPreset::Manual => "Integration time follows the parameter",
            IntegrationPreset::PeakProgram => "Short window that tracks transients",
            IntegrationPreset::Fast => "Responsive level for mixing",
            IntegrationPreset::Vu => "Classic VU-style averaging",
            IntegrationPreset::Slow => "Long-term loudness trend",
        }
    }

    /// Built-in integration time, `None` for `Manual`.
    pub fn integration_ms(&self) -> Option<f32> {
        match self {
            IntegrationPreset::Manual => None,
            IntegrationPreset::PeakProgram => Some(10.0),
            IntegrationPreset::Fast => Some(50.0),
            IntegrationPreset::Vu => Some(300.0),
            IntegrationPreset::Slow => Some(1000.0),
        }
    }
}

impl Default for IntegrationPreset {
    fn default() -> Self {
        IntegrationPreset::Manual
    }
}

// =============================================================================
// METER PROFILES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterProfile {
    pub integration_ms: Option<f32>,
    pub min_db: f32,
    pub max_db: f32,
    pub warning_db: f32,
    pub clip_db: f32,
}

impl Default for MeterProfile {
    fn default() -> Self {
        let scale = MeterScale::default();
        Self {
            integration_ms: None,
            min_db: scale.range.min_db,
            max_db: scale.range.max_db,
            warning_db: scale.warning_db,
            clip_db: scale.clip_db,
        }
    }
}

impl MeterProfile {
    pub fn scale(&self) -> anyhow::Result<MeterScale> {
        let range = MeterRange::new(self.min_db, self.max_db)?;
        MeterScale::new(range, self.warning_db, self.clip_db)
    }
}

#[derive(Debug)]
pub struct PresetManager {
    profiles: HashMap<String, MeterProfile>,
}

impl PresetManager {
    /// Load profiles from baked-in JSON. This is fallible but non-fatal.
    /// Falls back to a manager holding only the "Manual" profile.
    pub fn new() -> Self {
        match Self::from_json(include_str!("../presets.json")) {
            Ok(manager) => manager,
            Err(err) => {
                log::warn!("falling back to default meter profiles: {err:#}");
                Self::default()
            }
        }
    }

    /// Parses and validates a profile table. Every profile must describe a
    /// usable scale.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let profiles: HashMap<String, MeterProfile> =
            serde_json::from_str(json).context("Failed to parse meter profiles")?;

        for (name, profile) in &profiles {
            profile
                .scale()
                .with_context(|| format!("Invalid meter profile {name}"))?;
        }

        Ok(Self { profiles })
    }

    pub fn profile(&self, name: &str) -> Option<&MeterProfile> {
        self.profiles.get(name)
    }

    /// Integration time for `preset`. A profile entry overrides the preset's
    /// built-in value.
    pub fn integration_ms(&self, preset: IntegrationPreset) -> Option<f32> {
        self.profile(preset.name())
            .and_then(|profile| profile.integration_ms)
            .or_else(|| preset.integration_ms())
    }

    /// Display scale for `preset`, or the default scale when the preset has
    /// no profile.
    pub fn scale(&self, preset: IntegrationPreset) -> MeterScale {
        self.profile(preset.name())
            .and_then(|profile| profile.scale().ok())
            .unwrap_or_default()
    }
}

impl Default for PresetManager {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            IntegrationPreset::Manual.name().to_string(),
            MeterProfile::default(),
        );
        Self { profiles }
    }
}
