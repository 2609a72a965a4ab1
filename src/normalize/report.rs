use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, NormalizerError, Result};
use crate::normalize::engine::NormalizedClip;
use crate::tempo::TempoClass;

/// Per-clip summary of a normalization run, written next to the output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    /// Clip name (input file stem)
    pub clip: String,

    pub source: PathBuf,

    /// Written output, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// RFC 3339 local time the report was generated
    pub generated_at: String,

    pub fps: f64,
    pub input_frames: usize,
    pub output_frames: usize,
    pub input_duration: f64,
    pub output_duration: f64,

    pub class: TempoClass,
    pub baseline: f64,
    pub floor: f64,
    pub opening_window: usize,
    pub noisy: bool,

    pub mean_motion: f64,
    pub mean_raw_motion: f64,
    pub mean_subject_motion: f64,
    pub camera_contribution: f64,
    pub noise_factor: f64,

    pub speed_min: f64,
    pub speed_avg: f64,
    pub speed_max: f64,

    /// Coefficient of variation of motion (percent) in the source
    pub motion_cv_before: f64,

    /// Same, re-measured on the output when verification ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion_cv_after: Option<f64>,
}

impl NormalizationReport {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(clip: S, source: P, result: &NormalizedClip) -> Self {
        let analysis = &result.analysis;
        let classification = &result.classification;
        let curve = &result.curve;

        Self {
            clip: clip.into(),
            source: source.into(),
            output: None,
            generated_at: Local::now().to_rfc3339(),
            fps: result.fps,
            input_frames: result.frame_count,
            output_frames: result.timeline.len(),
            input_duration: seconds(result.frame_count, result.fps),
            output_duration: result.timeline.duration(),
            class: classification.class,
            baseline: classification.baseline,
            floor: classification.floor,
            opening_window: classification.window,
            noisy: classification.noisy,
            mean_motion: analysis.mean_magnitude(),
            mean_raw_motion: analysis.mean_raw(),
            mean_subject_motion: analysis.mean_subject(),
            camera_contribution: analysis.camera_contribution(),
            noise_factor: analysis.noise_factor(),
            speed_min: curve.min(),
            speed_avg: curve.mean(),
            speed_max: curve.max(),
            motion_cv_before: analysis.coefficient_of_variation(),
            motion_cv_after: None,
        }
    }

    pub fn with_output<P: Into<PathBuf>>(mut self, output: P) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_verification(mut self, motion_cv_after: f64) -> Self {
        self.motion_cv_after = Some(motion_cv_after);
        self
    }

    /// Output duration relative to input duration
    pub fn duration_ratio(&self) -> f64 {
        if self.input_frames == 0 {
            1.0
        } else {
            self.output_frames as f64 / self.input_frames as f64
        }
    }

    /// One-line summary for console output
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{}: {} (baseline {:.2} / floor {:.2} px/frame), speed {:.2}x-{:.2}x avg {:.2}x, {} -> {} frames ({:.1}s -> {:.1}s, {:.0}%)",
            self.clip,
            self.class,
            self.baseline,
            self.floor,
            self.speed_min,
            self.speed_max,
            self.speed_avg,
            self.input_frames,
            self.output_frames,
            self.input_duration,
            self.output_duration,
            self.duration_ratio() * 100.0
        );
        if let Some(after) = self.motion_cv_after {
            line.push_str(&format!(", motion CV {:.1}% -> {:.1}%", self.motion_cv_before, after));
        }
        line
    }

    /// Write as TOML
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| NormalizerError::generic(format!("Failed to serialize report: {}", e)))?;

        std::fs::write(path, content).map_err(|e| EncodeError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

fn seconds(frames: usize, fps: f64) -> f64 {
    if fps > 0.0 {
        frames as f64 / fps
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tempo::{
        MotionAnalysis, MotionSample, SpeedCurve, TempoClassification, Timeline,
    };
    use tempfile::tempdir;

    fn clip() -> NormalizedClip {
        let sample = MotionSample {
            magnitude: 0.8,
            raw: 1.0,
            subject: 0.6,
            camera: 0.4,
            noise_factor: 1.0,
        };
        NormalizedClip {
            fps: 24.0,
            frame_count: 48,
            analysis: MotionAnalysis::new(vec![sample; 47]),
            classification: TempoClassification {
                class: TempoClass::Slow,
                baseline: 0.8,
                floor: 1.5,
                window: 11,
                noisy: false,
            },
            curve: SpeedCurve::new(vec![2.0; 48]),
            timeline: Timeline::new((0..48).step_by(2).collect(), 24.0),
        }
    }

    #[test]
    fn test_report_from_clip() {
        let report = NormalizationReport::new("beach", "/in/beach.mp4", &clip());

        assert_eq!(report.input_frames, 48);
        assert_eq!(report.output_frames, 24);
        assert_eq!(report.input_duration, 2.0);
        assert_eq!(report.output_duration, 1.0);
        assert_eq!(report.duration_ratio(), 0.5);
        assert!((report.camera_contribution - 0.4).abs() < 1e-9);
        assert_eq!(report.motion_cv_after, None);
        assert!(report.summary().starts_with("beach: slow"));
        assert!(report.summary().contains("(2.0s -> 1.0s, 50%)"));
    }

    #[test]
    fn test_report_toml_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beach_report.toml");

        let report = NormalizationReport::new("beach", "/in/beach.mp4", &clip())
            .with_output("/out/beach_normalized.mp4")
            .with_verification(3.5);
        report.save_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("class = \"slow\""));

        let loaded: NormalizationReport = toml::from_str(&text).unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_unverified_report_omits_after_cv() {
        let report = NormalizationReport::new("beach", "/in/beach.mp4", &clip());
        let text = toml::to_string_pretty(&report).unwrap();
        assert!(!text.contains("motion_cv_after"));
        assert!(!text.contains("output ="));
    }
}
