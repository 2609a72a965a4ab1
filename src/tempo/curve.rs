//! Speed curve construction.
//!
//! Turns the per-transition motion series into a smooth, bounded, per-frame
//! playback multiplier. The shaping is hybrid: motion between the tempo floor
//! and the frantic ceiling is left alone, slower stretches are pushed up
//! toward the floor, and only genuinely frantic stretches are slowed down.

use tracing::debug;

use crate::config::CurveConfig;
use crate::tempo::types::{MotionAnalysis, SpeedCurve, TempoClass, TempoClassification};

/// Motion below this (px/frame) is treated as this value when dividing
const MIN_MOTION: f64 = 1e-3;

/// Gaussian kernel half-width in standard deviations
const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// Builds per-frame speed curves from motion samples
#[derive(Debug, Clone)]
pub struct SpeedCurveBuilder {
    config: CurveConfig,
}

impl SpeedCurveBuilder {
    pub fn new(config: CurveConfig) -> Self {
        Self { config }
    }

    /// Build the curve for a clip of `analysis.len() + 1` frames.
    ///
    /// Frame `i` takes the multiplier of transition `i`; the last frame
    /// repeats the final transition's multiplier.
    pub fn build(
        &self,
        analysis: &MotionAnalysis,
        classification: &TempoClassification,
        fps: f64,
    ) -> SpeedCurve {
        if analysis.is_empty() {
            return SpeedCurve::identity(1);
        }

        let (strength, upper) = self.policy(classification);
        let lower = self.config.max_slowdown;

        let mut values: Vec<f64> = analysis
            .samples
            .iter()
            .map(|s| self.desired_multiplier(s.magnitude, classification.floor, strength))
            .map(|m| clamp_or_unity(m, lower, upper))
            .collect();

        if let Some(&last) = values.last() {
            values.push(last);
        }

        let mut values = gaussian_filter1d(&values, self.config.smoothing_sigma);
        for v in values.iter_mut() {
            *v = clamp_or_unity(*v, lower, upper);
        }

        self.apply_start_ramp(&mut values, fps);

        let curve = SpeedCurve::new(values);
        debug!(
            "Speed curve ({} class, strength {:.2}): avg {:.2}x, range {:.2}x - {:.2}x",
            classification.class,
            strength,
            curve.mean(),
            curve.min(),
            curve.max()
        );
        curve
    }

    /// Correction strength and speedup bound for a classification
    fn policy(&self, classification: &TempoClassification) -> (f64, f64) {
        match classification.class {
            TempoClass::Fast => (
                self.config.fast_correction,
                self.config.max_speedup.min(self.config.fast_max_speedup),
            ),
            // Noise inflates readings, so a noisy borderline clip is
            // probably slower than it measures
            TempoClass::Borderline if classification.noisy => {
                (self.config.slow_correction, self.config.max_speedup)
            }
            TempoClass::Borderline => (self.config.borderline_correction, self.config.max_speedup),
            TempoClass::Slow => (self.config.slow_correction, self.config.max_speedup),
        }
    }

    /// Unclamped multiplier for one transition
    fn desired_multiplier(&self, magnitude: f64, floor: f64, strength: f64) -> f64 {
        if !magnitude.is_finite() || floor <= 0.0 {
            return 1.0;
        }

        let ceiling = floor * self.config.frantic_ratio;
        let needed = if magnitude < floor {
            floor / magnitude.max(MIN_MOTION)
        } else if magnitude > ceiling {
            ceiling / magnitude
        } else {
            1.0
        };

        1.0 + (needed - 1.0) * strength
    }

    /// Ease the opening frames toward normal speed
    fn apply_start_ramp(&self, values: &mut [f64], fps: f64) {
        let ramp_frames = ((self.config.start_ramp_secs * fps).floor().max(0.0) as usize)
            .min(values.len() / 5);

        for (i, v) in values.iter_mut().take(ramp_frames).enumerate() {
            let blend = i as f64 / ramp_frames as f64;
            *v = 1.0 + (*v - 1.0) * blend * blend;
        }
    }
}

fn clamp_or_unity(value: f64, lower: f64, upper: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lower, upper)
    } else {
        1.0
    }
}

/// One-dimensional Gaussian blur with mirrored edges.
///
/// The kernel spans `4 * sigma` on each side. A sigma of zero returns the
/// input unchanged.
pub fn gaussian_filter1d(values: &[f64], sigma: f64) -> Vec<f64> {
    if values.is_empty() || sigma.is_nan() || sigma <= 0.0 {
        return values.to_vec();
    }

    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let norm: f64 = kernel.iter().sum();

    let n = values.len() as isize;
    (0..n)
        .map(|i| {
            kernel
                .iter()
                .zip(-radius..=radius)
                .map(|(w, offset)| w * values[reflect_index(i + offset, n)])
                .sum::<f64>()
                / norm
        })
        .collect()
}

/// Mirror an out-of-range index back into `0..n` (edge sample repeated)
fn reflect_index(index: isize, n: isize) -> usize {
    let period = 2 * n;
    let m = index.rem_euclid(period);
    if m < n {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}
