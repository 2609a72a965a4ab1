use serde::{Deserialize, Serialize};
use std::fmt;

/// Motion measured for one frame transition (frame `i` to `i + 1`).
///
/// All values are in source-frame pixels per frame at the clip's native
/// frame rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Blended, noise-discounted magnitude used by every later stage
    pub magnitude: f64,

    /// Mean displacement magnitude before camera compensation
    pub raw: f64,

    /// Mean displacement magnitude after removing the camera estimate
    pub subject: f64,

    /// Magnitude of the median (camera) displacement vector
    pub camera: f64,

    /// Noise discount applied to the blend (1.0 = none)
    pub noise_factor: f64,
}

/// Ordered motion samples for a whole clip, one per transition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionAnalysis {
    pub samples: Vec<MotionSample>,
}

impl MotionAnalysis {
    pub fn new(samples: Vec<MotionSample>) -> Self {
        Self { samples }
    }

    /// Number of transitions (frame count - 1)
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mean_magnitude(&self) -> f64 {
        self.mean_by(|s| s.magnitude)
    }

    pub fn mean_raw(&self) -> f64 {
        self.mean_by(|s| s.raw)
    }

    pub fn mean_subject(&self) -> f64 {
        self.mean_by(|s| s.subject)
    }

    /// Share of the raw motion attributed to the camera
    pub fn camera_contribution(&self) -> f64 {
        (self.mean_raw() - self.mean_subject()).max(0.0)
    }

    /// Average noise factor over the clip (1.0 for an empty clip)
    pub fn noise_factor(&self) -> f64 {
        if self.samples.is_empty() {
            return 1.0;
        }
        self.mean_by(|s| s.noise_factor)
    }

    /// Coefficient of variation of the working magnitude, in percent
    pub fn coefficient_of_variation(&self) -> f64 {
        let mean = self.mean_magnitude();
        if self.samples.is_empty() || mean <= f64::EPSILON {
            return 0.0;
        }

        let variance = self
            .samples
            .iter()
            .map(|s| (s.magnitude - mean).powi(2))
            .sum::<f64>()
            / self.samples.len() as f64;
        variance.sqrt() / mean * 100.0
    }

    fn mean_by<F: Fn(&MotionSample) -> f64>(&self, f: F) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(f).sum::<f64>() / self.samples.len() as f64
    }
}

/// Native tempo class of a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempoClass {
    /// At or above the tempo floor
    Fast,
    /// Below the floor, within the borderline margin
    Borderline,
    /// Below the floor by more than the margin
    Slow,
}

impl fmt::Display for TempoClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TempoClass::Fast => "fast",
            TempoClass::Borderline => "borderline",
            TempoClass::Slow => "slow",
        };
        f.write_str(name)
    }
}

/// Result of classifying a clip's opening window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoClassification {
    pub class: TempoClass,

    /// Robust tempo of the opening window (px/frame at native fps)
    pub baseline: f64,

    /// Tempo floor rescaled to the clip's fps (px/frame)
    pub floor: f64,

    /// Number of leading transitions the baseline was taken from
    pub window: usize,

    /// Whether the opening window carried a noise discount
    pub noisy: bool,
}

/// Per-frame playback multipliers (> 1 plays faster, < 1 slower).
///
/// Holds exactly one value per source frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedCurve {
    values: Vec<f64>,
}

impl SpeedCurve {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Curve of all-1.0 values for `frame_count` frames
    pub fn identity(frame_count: usize) -> Self {
        Self::new(vec![1.0; frame_count])
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Multiplier at a source frame, 1.0 outside the curve
    pub fn at(&self, frame: usize) -> f64 {
        self.values.get(frame).copied().unwrap_or(1.0)
    }

    pub fn min(&self) -> f64 {
        if self.values.is_empty() {
            return 1.0;
        }
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        if self.values.is_empty() {
            return 1.0;
        }
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 1.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Output frame count implied by the curve: the time spent on each
    /// source transition is `1 / multiplier` output frames, plus the final
    /// source frame itself.
    pub fn expected_output_len(&self) -> f64 {
        match self.values.len() {
            0 => 0.0,
            n => self.values[..n - 1].iter().map(|v| 1.0 / v).sum::<f64>() + 1.0,
        }
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// `pct` is in [0, 100]. Returns 0.0 for an empty slice; non-finite values
/// sort last.
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}
