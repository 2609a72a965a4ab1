//! Reduction of a flow field to a single motion sample.
//!
//! The median displacement vector stands in for camera motion: a pan moves
//! most pixels coherently, while a subject usually covers a minority of the
//! frame. The subject signal is what remains after subtracting it, and the
//! sample blends that with the raw mean magnitude. A long right tail in the
//! magnitude distribution (mean far above median) is read as rain, grain or
//! sensor noise and discounted.

use crate::config::MotionConfig;
use crate::tempo::flow::FlowField;
use crate::tempo::types::{percentile, MotionSample};

/// Reduces flow fields to motion samples
#[derive(Debug, Clone)]
pub struct MotionEstimator {
    config: MotionConfig,
}

impl MotionEstimator {
    pub fn new(config: MotionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Measure one transition.
    ///
    /// Always returns finite, non-negative values; an empty or non-finite
    /// field degrades to zero motion.
    pub fn estimate(&self, field: &FlowField) -> MotionSample {
        let magnitudes: Vec<f64> = field
            .magnitudes()
            .into_iter()
            .map(|m| finite_or_zero(m as f64))
            .collect();

        if magnitudes.is_empty() {
            return MotionSample::default();
        }

        let raw = mean(&magnitudes);
        let median_magnitude = percentile(&magnitudes, 50.0);

        let dx: Vec<f64> = field.dx().iter().map(|&v| finite_component(v)).collect();
        let dy: Vec<f64> = field.dy().iter().map(|&v| finite_component(v)).collect();
        let camera_dx = percentile(&dx, 50.0);
        let camera_dy = percentile(&dy, 50.0);
        let camera = (camera_dx * camera_dx + camera_dy * camera_dy).sqrt();

        let subject = mean_of(dx.iter().zip(dy.iter()).map(|(&x, &y)| {
            let (rx, ry) = (x - camera_dx, y - camera_dy);
            (rx * rx + ry * ry).sqrt()
        }), dx.len());

        let weight = self.config.subject_weight;
        let blended = subject * weight + raw * (1.0 - weight);

        let noise_ratio = if median_magnitude > self.config.min_median_for_noise {
            raw / median_magnitude
        } else {
            1.0
        };
        let noise_factor = self.noise_factor(noise_ratio);

        MotionSample {
            magnitude: finite_or_zero(blended * noise_factor),
            raw: finite_or_zero(raw),
            subject: finite_or_zero(subject),
            camera: finite_or_zero(camera),
            noise_factor,
        }
    }

    /// Multiplicative discount for a mean/median ratio.
    ///
    /// 1.0 up to the threshold, then falling linearly with the excess until
    /// the configured maximum discount is reached.
    pub fn noise_factor(&self, ratio: f64) -> f64 {
        if !ratio.is_finite() || ratio <= self.config.noise_ratio_threshold {
            return 1.0;
        }

        let excess = ratio - self.config.noise_ratio_threshold;
        let discount = (excess * self.config.noise_discount_slope).min(self.config.max_noise_discount);
        1.0 - discount
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn finite_component(value: f32) -> f64 {
    if value.is_finite() {
        value as f64
    } else {
        0.0
    }
}

fn mean(values: &[f64]) -> f64 {
    mean_of(values.iter().copied(), values.len())
}

fn mean_of<I: Iterator<Item = f64>>(values: I, len: usize) -> f64 {
    if len == 0 {
        return 0.0;
    }
    values.sum::<f64>() / len as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> MotionEstimator {
        MotionEstimator::new(MotionConfig::default())
    }

    #[test]
    fn test_static_field_has_no_motion() {
        let sample = estimator().estimate(&FlowField::zeros(16, 16));
        assert_eq!(sample.magnitude, 0.0);
        assert_eq!(sample.noise_factor, 1.0);
    }

    #[test]
    fn test_pure_pan_is_discounted() {
        let sample = estimator().estimate(&FlowField::uniform(32, 24, 3.0, 4.0));

        assert!((sample.raw - 5.0).abs() < 1e-6);
        assert!((sample.camera - 5.0).abs() < 1e-6);
        assert!(sample.subject < 1e-6);
        assert!((sample.magnitude - 2.5).abs() < 1e-6);
        assert!(sample.magnitude < sample.raw * 0.6);
    }

    #[test]
    fn test_subject_over_static_background() {
        // A quarter of the frame moves, the rest is still
        let mut field = FlowField::zeros(20, 20);
        for y in 0..10 {
            for x in 0..10 {
                field.set(x, y, 4.0, 0.0);
            }
        }

        let sample = estimator().estimate(&field);
        assert_eq!(sample.camera, 0.0);
        assert!((sample.subject - 1.0).abs() < 1e-6);
        assert!((sample.raw - 1.0).abs() < 1e-6);
        // Median magnitude is zero, so the ratio is not trusted
        assert_eq!(sample.noise_factor, 1.0);
        assert!((sample.magnitude - 1.0).abs() < 1e-6);
    }

    /// Rows above `subject_rows` move right by `speed`; the rest is still
    fn subject_over_background(subject_rows: usize, speed: f32) -> FlowField {
        let mut field = FlowField::zeros(40, 40);
        for y in 0..subject_rows {
            for x in 0..40 {
                field.set(x, y, speed, 0.0);
            }
        }
        field
    }

    #[test]
    fn test_heavy_tailed_noise_lowers_magnitude() {
        let clean = subject_over_background(13, 2.0);

        // Rain over the still background: faint vertical grain everywhere,
        // plus a sparse column of long streaks in both directions
        let mut rainy = clean.clone();
        for y in 13..40 {
            for x in 0..40 {
                let dy = match x {
                    0 => 3.0,
                    20 => -3.0,
                    _ if x % 2 == 1 => 0.05,
                    _ => -0.05,
                };
                rainy.set(x, y, 0.0, dy);
            }
        }

        let est = estimator();
        let clean_sample = est.estimate(&clean);
        let rainy_sample = est.estimate(&rainy);

        assert_eq!(clean_sample.noise_factor, 1.0);
        assert!((clean_sample.magnitude - 0.65).abs() < 1e-6);

        assert!(rainy_sample.raw > clean_sample.raw);
        assert!((rainy_sample.noise_factor - 0.78).abs() < 1e-9);
        assert!(
            rainy_sample.magnitude < clean_sample.magnitude,
            "rainy {} vs clean {}",
            rainy_sample.magnitude,
            clean_sample.magnitude
        );
    }

    #[test]
    fn test_subject_over_jittery_background_keeps_most_motion() {
        // 30% of the frame moves 4 px over a background jittering by 0.05 px
        let mut field = subject_over_background(12, 4.0);
        for y in 12..40 {
            for x in 0..40 {
                field.set(x, y, if x % 2 == 0 { 0.05 } else { -0.05 }, 0.0);
            }
        }

        let sample = estimator().estimate(&field);
        let blend = (sample.subject + sample.raw) / 2.0;

        assert!(sample.noise_factor >= 0.78 - 1e-9);
        assert!(sample.magnitude >= blend * 0.78 - 1e-9);
        assert!(sample.magnitude > 0.9, "magnitude {}", sample.magnitude);
    }

    #[test]
    fn test_noise_factor_curve() {
        let est = estimator();
        assert_eq!(est.noise_factor(1.0), 1.0);
        assert_eq!(est.noise_factor(1.5), 1.0);
        assert!((est.noise_factor(2.25) - 0.89).abs() < 1e-12);
        assert!((est.noise_factor(3.0) - 0.78).abs() < 1e-12);
        assert!((est.noise_factor(10.0) - 0.78).abs() < 1e-12);
        assert_eq!(est.noise_factor(f64::NAN), 1.0);
    }

    #[test]
    fn test_non_finite_vectors_are_ignored() {
        let mut field = FlowField::uniform(4, 4, 1.0, 0.0);
        field.set(0, 0, f32::NAN, f32::INFINITY);

        let sample = estimator().estimate(&field);
        assert!(sample.magnitude.is_finite());
        assert!(sample.raw.is_finite());
    }

    #[test]
    fn test_empty_field() {
        let sample = estimator().estimate(&FlowField::zeros(0, 0));
        assert_eq!(sample, MotionSample::default());
    }
}
