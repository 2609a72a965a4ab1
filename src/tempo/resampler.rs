//! Conversion of a speed curve into an output frame timeline.
//!
//! A fractional cursor walks the source frames. Each output frame shows the
//! source frame under the cursor, and the cursor then advances by that
//! frame's multiplier: above 1.0 source frames are skipped, below 1.0 they
//! are shown more than once. Output keeps the source frame rate, so only
//! duration changes.

use crate::tempo::types::SpeedCurve;
use crate::video::Frame;

/// Tolerance for float drift in the cursor
const CURSOR_EPSILON: f64 = 1e-9;

/// Source frame indices to emit, in output order
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    indices: Vec<usize>,
    fps: f64,
}

impl Timeline {
    pub fn new(indices: Vec<usize>, fps: f64) -> Self {
        Self { indices, fps }
    }

    /// One-to-one mapping of `frame_count` source frames
    pub fn identity(frame_count: usize, fps: f64) -> Self {
        Self::new((0..frame_count).collect(), fps)
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Output duration in seconds
    pub fn duration(&self) -> f64 {
        if self.fps > 0.0 {
            self.indices.len() as f64 / self.fps
        } else {
            0.0
        }
    }

    /// Whether every source frame is emitted exactly once, in order
    pub fn is_identity(&self) -> bool {
        self.indices.iter().enumerate().all(|(i, &idx)| i == idx)
    }

    /// Gather the output frames, renumbered by output position.
    ///
    /// Indices past the end of `frames` are skipped.
    pub fn select(&self, frames: &[Frame]) -> Vec<Frame> {
        self.indices
            .iter()
            .filter_map(|&idx| frames.get(idx))
            .enumerate()
            .map(|(position, frame)| Frame::new(frame.as_image().clone(), position))
            .collect()
    }
}

/// Walks a speed curve to produce a timeline
#[derive(Debug, Clone, Default)]
pub struct FrameResampler;

impl FrameResampler {
    pub fn new() -> Self {
        Self
    }

    /// Build the timeline for a per-frame curve.
    ///
    /// Indices are non-decreasing and always within `0..curve.len()`. A curve
    /// of all 1.0 yields the identity mapping. The timeline always ends on
    /// the last source frame, even when the cursor steps over it.
    pub fn resample(&self, curve: &SpeedCurve, fps: f64) -> Timeline {
        let frame_count = curve.len();
        if frame_count == 0 {
            return Timeline::new(Vec::new(), fps);
        }

        let last = (frame_count - 1) as f64;
        let mut indices = Vec::with_capacity(frame_count);
        let mut cursor = 0.0_f64;

        while cursor <= last + CURSOR_EPSILON {
            let idx = ((cursor + CURSOR_EPSILON).floor() as usize).min(frame_count - 1);
            indices.push(idx);

            let step = curve.at(idx);
            // Guard against a degenerate curve stalling the walk
            cursor += if step.is_finite() && step > 0.0 { step } else { 1.0 };
        }

        if indices.last() != Some(&(frame_count - 1)) {
            indices.push(frame_count - 1);
        }

        Timeline::new(indices, fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resample(values: Vec<f64>) -> Timeline {
        FrameResampler::new().resample(&SpeedCurve::new(values), 24.0)
    }

    #[test]
    fn test_identity_curve() {
        let timeline = resample(vec![1.0; 50]);
        assert_eq!(timeline.len(), 50);
        assert!(timeline.is_identity());
        assert!((timeline.duration() - 50.0 / 24.0).abs() < 1e-12);
    }

    #[test]
    fn test_speedup_skips_frames() {
        let timeline = resample(vec![2.0; 11]);
        assert_eq!(timeline.indices(), &[0, 2, 4, 6, 8, 10]);
    }

    #[test]
    fn test_speedup_still_ends_on_last_frame() {
        let timeline = resample(vec![2.0; 10]);
        assert_eq!(timeline.indices(), &[0, 2, 4, 6, 8, 9]);

        let timeline = resample(vec![1.875; 100]);
        assert_eq!(timeline.indices().last(), Some(&99));
        assert!(timeline.indices().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_slowdown_repeats_frames() {
        let timeline = resample(vec![0.5; 4]);
        assert_eq!(timeline.indices(), &[0, 0, 1, 1, 2, 2, 3]);
    }

    #[test]
    fn test_indices_are_monotonic_and_in_bounds() {
        let values: Vec<f64> = (0..300)
            .map(|i| 1.3 + 0.7 * (i as f64 * 0.05).sin())
            .collect();
        let timeline = resample(values);

        assert!(timeline.indices().windows(2).all(|w| w[0] <= w[1]));
        assert!(timeline.indices().iter().all(|&idx| idx < 300));
        assert_eq!(timeline.indices()[0], 0);
    }

    #[test]
    fn test_length_tracks_curve_integral() {
        for values in [
            vec![1.875; 100],
            (0..200).map(|i| 0.6 + (i % 30) as f64 * 0.045).collect::<Vec<_>>(),
            (0..500).map(|i| if i < 250 { 2.0 } else { 0.7 }).collect(),
        ] {
            let curve = SpeedCurve::new(values);
            let expected = curve.expected_output_len();
            let actual = FrameResampler::new().resample(&curve, 30.0).len() as f64;

            assert!(
                (actual - expected).abs() <= expected * 0.02 + 2.0,
                "expected ~{:.1}, got {}",
                expected,
                actual
            );
        }
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(resample(Vec::new()).is_empty());
        assert_eq!(resample(vec![1.7]).indices(), &[0]);

        // Non-finite or zero multipliers fall back to normal speed
        assert_eq!(resample(vec![f64::NAN, 0.0, 1.0]).indices(), &[0, 1, 2]);
    }

    #[test]
    fn test_select_gathers_frames() {
        let frames: Vec<Frame> = (0..4)
            .map(|i| Frame::new_filled(2, 2, [i as u8 * 10, 0, 0], i))
            .collect();
        let timeline = Timeline::new(vec![0, 0, 3], 24.0);

        let selected = timeline.select(&frames);
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[1].get_pixel(0, 0), [0, 0, 0]);
        assert_eq!(selected[2].get_pixel(0, 0), [30, 0, 0]);
        assert_eq!(selected[2].index(), 2);
    }
}
