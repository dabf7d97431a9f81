//! Numeric meter display mapping.
//!
//! Converts linear RMS readings into dB and into a normalized 0..1 bar fill,
//! and locates the warning and clip zones on the same scale. Painting is left
//! to whatever editor consumes these numbers.

use crate::dsp::utils::gain_to_db;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_DB: f32 = -60.0;
pub const DEFAULT_MAX_DB: f32 = 6.0;
pub const DEFAULT_WARNING_DB: f32 = -6.0;
pub const DEFAULT_CLIP_DB: f32 = 0.0;
pub const DEFAULT_TICKS: [f32; 8] = [6.0, 0.0, -6.0, -12.0, -24.0, -36.0, -48.0, -60.0];

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeterRange {
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for MeterRange {
    fn default() -> Self {
        Self {
            min_db: DEFAULT_MIN_DB,
            max_db: DEFAULT_MAX_DB,
        }
    }
}

impl MeterRange {
    pub fn new(min_db: f32, max_db: f32) -> Result<Self> {
        if !(min_db.is_finite() && max_db.is_finite()) {
            return Err(anyhow!("Meter range bounds must be finite"));
        }
        if min_db >= max_db {
            return Err(anyhow!(
                "Meter range minimum {min_db} dB must lie below maximum {max_db} dB"
            ));
        }
        Ok(Self { min_db, max_db })
    }

    #[inline]
    pub fn clamp_db(&self, db: f32) -> f32 {
        db.clamp(self.min_db, self.max_db)
    }

    /// Position of `db` on the range, 0 at the bottom, 1 at the top.
    #[inline]
    pub fn normalize(&self, db: f32) -> f32 {
        (self.clamp_db(db) - self.min_db) / (self.max_db - self.min_db)
    }

    pub fn contains(&self, db: f32) -> bool {
        db >= self.min_db && db <= self.max_db
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeterZone {
    Normal,
    Warning,
    Clip,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeterScale {
    pub range: MeterRange,
    pub warning_db: f32,
    pub clip_db: f32,
    pub ticks: Vec<f32>,
}

impl Default for MeterScale {
    fn default() -> Self {
        Self {
            range: MeterRange::default(),
            warning_db: DEFAULT_WARNING_DB,
            clip_db: DEFAULT_CLIP_DB,
            ticks: DEFAULT_TICKS.to_vec(),
        }
    }
}

impl MeterScale {
    pub fn new(range: MeterRange, warning_db: f32, clip_db: f32) -> Result<Self> {
        if warning_db > clip_db {
            return Err(anyhow!(
                "Warning threshold {warning_db} dB lies above clip threshold {clip_db} dB"
            ));
        }
        Ok(Self {
            range,
            warning_db,
            clip_db,
            ticks: DEFAULT_TICKS.to_vec(),
        })
    }

    pub fn with_ticks(mut self, ticks: Vec<f32>) -> Self {
        self.ticks = ticks;
        self
    }

    /// RMS in dB, floored at the bottom of the range and clamped to the top.
    pub fn level_db(&self, rms: f32) -> f32 {
        self.range.clamp_db(gain_to_db(rms, self.range.min_db))
    }

    /// Bar fill for a linear RMS reading.
    pub fn fill(&self, rms: f32) -> f32 {
        self.range.normalize(self.level_db(rms))
    }

    pub fn warning_fill(&self) -> f32 {
        self.range.normalize(self.warning_db)
    }

    pub fn clip_fill(&self) -> f32 {
        self.range.normalize(self.clip_db)
    }

    pub fn zone(&self, rms: f32) -> MeterZone {
        let db = self.level_db(rms);
        if db >= self.clip_db {
            MeterZone::Clip
        } else if db >= self.warning_db {
            MeterZone::Warning
        } else {
            MeterZone::Normal
        }
    }

    /// Ticks inside the range, paired with their normalized position.
    pub fn tick_positions(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.ticks
            .iter()
            .copied()
            .filter(|db| self.range.contains(*db))
            .map(|db| (db, self.range.normalize(db)))
    }
}
