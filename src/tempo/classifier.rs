use tracing::debug;

use crate::config::TempoConfig;
use crate::tempo::types::{percentile, MotionAnalysis, TempoClass, TempoClassification};

/// Opening windows whose mean noise factor falls below this count as noisy
const NOISY_WINDOW_FACTOR: f64 = 0.95;

/// Classifies a clip's native tempo from its opening segment
#[derive(Debug, Clone)]
pub struct TempoClassifier {
    config: TempoConfig,
}

impl TempoClassifier {
    pub fn new(config: TempoConfig) -> Self {
        Self { config }
    }

    /// Number of leading transitions that make up the opening window.
    ///
    /// The window covers `opening_window_secs` (but at least
    /// `min_opening_window` transitions), is capped at a quarter of the clip
    /// so short clips are not judged on their whole length, and never drops
    /// below one transition.
    pub fn opening_window(&self, transitions: usize, fps: f64) -> usize {
        if transitions == 0 {
            return 0;
        }

        let by_time = (self.config.opening_window_secs * fps).floor().max(0.0) as usize;
        by_time
            .max(self.config.min_opening_window)
            .min(transitions / 4)
            .max(1)
    }

    /// Classify the clip.
    ///
    /// The baseline is a percentile of the opening window rather than its
    /// mean, so a short static intro cannot drag the whole clip into the
    /// slow class.
    pub fn classify(&self, analysis: &MotionAnalysis, fps: f64) -> TempoClassification {
        let floor = self.config.floor_at(fps);
        let window = self.opening_window(analysis.len(), fps);

        if window == 0 {
            return TempoClassification {
                class: TempoClass::Fast,
                baseline: 0.0,
                floor,
                window,
                noisy: false,
            };
        }

        let opening = &analysis.samples[..window];
        let magnitudes: Vec<f64> = opening.iter().map(|s| s.magnitude).collect();
        let baseline = percentile(&magnitudes, self.config.baseline_percentile);

        let mean_noise = opening.iter().map(|s| s.noise_factor).sum::<f64>() / window as f64;
        let noisy = mean_noise < NOISY_WINDOW_FACTOR;

        let borderline_floor = floor * (1.0 - self.config.borderline_margin);
        let class = if baseline >= floor {
            TempoClass::Fast
        } else if baseline >= borderline_floor {
            TempoClass::Borderline
        } else {
            TempoClass::Slow
        };

        debug!(
            "Opening window of {} transitions: baseline {:.3} px/frame, floor {:.3}, class {}{}",
            window,
            baseline,
            floor,
            class,
            if noisy { " (noisy)" } else { "" }
        );

        TempoClassification {
            class,
            baseline,
            floor,
            window,
            noisy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tempo::types::MotionSample;

    fn series(values: &[f64]) -> MotionAnalysis {
        MotionAnalysis::new(
            values
                .iter()
                .map(|&magnitude| MotionSample {
                    magnitude,
                    raw: magnitude,
                    subject: magnitude,
                    camera: 0.0,
                    noise_factor: 1.0,
                })
                .collect(),
        )
    }

    fn classifier() -> TempoClassifier {
        TempoClassifier::new(TempoConfig::default())
    }

    #[test]
    fn test_slow_clip_at_24fps() {
        // 100 frames of 0.8 px/frame motion
        let result = classifier().classify(&series(&[0.8; 99]), 24.0);

        assert_eq!(result.window, 24);
        assert_eq!(result.class, TempoClass::Slow);
        assert!((result.baseline - 0.8).abs() < 1e-12);
        assert!((result.floor - 1.5).abs() < 1e-12);
        assert!(!result.noisy);
    }

    #[test]
    fn test_fast_and_borderline() {
        let fast = classifier().classify(&series(&[1.6; 60]), 24.0);
        assert_eq!(fast.class, TempoClass::Fast);

        let exactly_at_floor = classifier().classify(&series(&[1.5; 60]), 24.0);
        assert_eq!(exactly_at_floor.class, TempoClass::Fast);

        let borderline = classifier().classify(&series(&[1.4; 60]), 24.0);
        assert_eq!(borderline.class, TempoClass::Borderline);

        let slow = classifier().classify(&series(&[1.2; 60]), 24.0);
        assert_eq!(slow.class, TempoClass::Slow);
    }

    #[test]
    fn test_floor_is_rescaled_to_clip_fps() {
        // 0.8 px/frame at 60fps is 2.0 px/frame at 24fps
        let result = classifier().classify(&series(&[0.8; 200]), 60.0);
        assert!((result.floor - 0.6).abs() < 1e-12);
        assert_eq!(result.class, TempoClass::Fast);
    }

    #[test]
    fn test_static_intro_does_not_force_slow() {
        let mut values = vec![0.0; 10];
        values.extend(std::iter::repeat(2.0).take(90));

        let result = classifier().classify(&series(&values), 24.0);
        assert_eq!(result.window, 24);
        assert_eq!(result.class, TempoClass::Fast);
        assert_eq!(result.baseline, 2.0);
    }

    #[test]
    fn test_window_bounds() {
        let c = classifier();
        assert_eq!(c.opening_window(0, 24.0), 0);
        assert_eq!(c.opening_window(3, 24.0), 1);
        assert_eq!(c.opening_window(20, 24.0), 5);
        assert_eq!(c.opening_window(1000, 30.0), 30);
        assert_eq!(c.opening_window(1000, 5.0), 10);
    }

    #[test]
    fn test_empty_analysis_is_left_alone() {
        let result = classifier().classify(&MotionAnalysis::default(), 24.0);
        assert_eq!(result.class, TempoClass::Fast);
        assert_eq!(result.window, 0);
    }

    #[test]
    fn test_noisy_opening_is_flagged() {
        let mut analysis = series(&[1.4; 40]);
        for sample in analysis.samples.iter_mut() {
            sample.noise_factor = 0.8;
        }

        let result = classifier().classify(&analysis, 24.0);
        assert!(result.noisy);
    }
}
