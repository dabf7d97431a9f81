/// Full-scale magnitude; anything strictly above it counts as a clip.
pub const FULL_SCALE: f32 = 1.0;

pub fn db_to_gain(db: f32) -> f32 {
    (10.0f32).powf(db / 20.0)
}

/// Converts a linear gain to dB. Gains at or below the linear value of
/// `floor_db` (including zero) map to `floor_db` itself.
pub fn gain_to_db(gain: f32, floor_db: f32) -> f32 {
    if gain > db_to_gain(floor_db) {
        (20.0 * gain.log10()).max(floor_db)
    } else {
        floor_db
    }
}

pub fn frame_rms(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for &v in x {
        s += v * v;
    }
    (s / (x.len().max(1) as f32)).sqrt()
}

/// Largest absolute sample. A NaN anywhere makes the result NaN.
pub fn peak_magnitude(x: &[f32]) -> f32 {
    x.iter().fold(0.0f32, |peak, &v| {
        let mag = v.abs();
        if mag > peak || mag.is_nan() {
            mag
        } else {
            peak
        }
    })
}

/// NaN peaks count as clips, a broken signal should light the indicator.
#[inline]
pub fn is_clipping(peak: f32) -> bool {
    peak > FULL_SCALE || peak.is_nan()
}
