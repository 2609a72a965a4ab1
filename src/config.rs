use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for the tempo normalizer
///
/// Every tunable of the pipeline lives here. The value is validated once and
/// then shared read-only by every stage, so clips processed concurrently can
/// each carry their own configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tempo floor and classification settings
    pub tempo: TempoConfig,

    /// Per-transition motion reduction settings
    pub motion: MotionConfig,

    /// Speed curve shaping settings
    pub curve: CurveConfig,

    /// Optical flow settings
    pub flow: FlowConfig,

    /// Input handling settings
    pub video: VideoConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.tempo.validate()?;
        self.motion.validate()?;
        self.curve.validate()?;
        self.flow.validate()?;
        self.video.validate()?;
        Ok(())
    }
}

fn invalid<V: ToString>(key: &str, value: V) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn positive(key: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(key, value).into());
    }
    Ok(())
}

/// Tempo floor and opening-window classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Minimum acceptable tempo in px/frame at `reference_fps`
    pub min_tempo_at_reference: f64,

    /// Frame rate the tempo floor is expressed at
    pub reference_fps: f64,

    /// Length of the opening window used for classification (seconds)
    pub opening_window_secs: f64,

    /// Lower bound on the opening window (transitions)
    pub min_opening_window: usize,

    /// Percentile of the opening window taken as the baseline tempo
    pub baseline_percentile: f64,

    /// Fraction below the floor still treated as borderline
    pub borderline_margin: f64,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            min_tempo_at_reference: 1.5,
            reference_fps: 24.0,
            opening_window_secs: 1.0,
            min_opening_window: 10,
            baseline_percentile: 50.0,
            borderline_margin: 0.15,
        }
    }
}

impl TempoConfig {
    /// Tempo floor rescaled to a clip's native frame rate.
    ///
    /// Motion per frame shrinks as the frame rate grows, so a 60fps clip
    /// needs only 0.6 px/frame to match 1.5 px/frame at 24fps.
    pub fn floor_at(&self, fps: f64) -> f64 {
        self.min_tempo_at_reference * (self.reference_fps / fps)
    }

    fn validate(&self) -> Result<()> {
        positive("tempo.min_tempo_at_reference", self.min_tempo_at_reference)?;
        positive("tempo.reference_fps", self.reference_fps)?;

        if !self.opening_window_secs.is_finite() || self.opening_window_secs < 0.0 {
            return Err(invalid("tempo.opening_window_secs", self.opening_window_secs).into());
        }

        if !(0.0..=100.0).contains(&self.baseline_percentile) {
            return Err(invalid("tempo.baseline_percentile", self.baseline_percentile).into());
        }

        if !(0.0..1.0).contains(&self.borderline_margin) {
            return Err(invalid("tempo.borderline_margin", self.borderline_margin).into());
        }

        Ok(())
    }
}

/// Reduction of a flow field to one motion sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Weight of the camera-compensated signal in the blend (raw gets the rest)
    pub subject_weight: f64,

    /// Mean/median magnitude ratio above which the noise discount engages
    pub noise_ratio_threshold: f64,

    /// Discount per unit of ratio above the threshold
    pub noise_discount_slope: f64,

    /// Largest discount ever applied (must stay below 1.0)
    pub max_noise_discount: f64,

    /// Median magnitudes below this (px) are too small to form a ratio
    pub min_median_for_noise: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            subject_weight: 0.5,
            noise_ratio_threshold: 1.5,
            noise_discount_slope: 0.22 / 1.5,
            max_noise_discount: 0.22,
            min_median_for_noise: 0.01,
        }
    }
}

impl MotionConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.subject_weight) {
            return Err(invalid("motion.subject_weight", self.subject_weight).into());
        }

        positive("motion.noise_ratio_threshold", self.noise_ratio_threshold)?;

        if !self.noise_discount_slope.is_finite() || self.noise_discount_slope < 0.0 {
            return Err(invalid("motion.noise_discount_slope", self.noise_discount_slope).into());
        }

        if !(0.0..1.0).contains(&self.max_noise_discount) {
            return Err(invalid("motion.max_noise_discount", self.max_noise_discount).into());
        }

        if !self.min_median_for_noise.is_finite() || self.min_median_for_noise < 0.0 {
            return Err(invalid("motion.min_median_for_noise", self.min_median_for_noise).into());
        }

        Ok(())
    }
}

/// Speed curve bounds, smoothing and per-class strengths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveConfig {
    /// Largest playback multiplier (speed up)
    pub max_speedup: f64,

    /// Smallest playback multiplier (slow down)
    pub max_slowdown: f64,

    /// Gaussian smoothing sigma in samples
    pub smoothing_sigma: f64,

    /// Motion above `floor * frantic_ratio` is slowed down
    pub frantic_ratio: f64,

    /// Fraction of the needed correction applied to fast clips
    pub fast_correction: f64,

    /// Fraction of the needed correction applied to borderline clips
    pub borderline_correction: f64,

    /// Fraction of the needed correction applied to slow clips
    pub slow_correction: f64,

    /// Speedup cap for clips that are already fast
    pub fast_max_speedup: f64,

    /// Duration of the ease-in at the start of the curve (seconds, 0 disables).
    ///
    /// Off by default: the ramp keeps the opening at source tempo, and the
    /// opening is what the classifier reads when an output is re-run.
    pub start_ramp_secs: f64,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            max_speedup: 2.0,
            max_slowdown: 0.6,
            smoothing_sigma: 10.0,
            frantic_ratio: 3.0,
            fast_correction: 0.5,
            borderline_correction: 0.7,
            slow_correction: 1.0,
            fast_max_speedup: 1.25,
            start_ramp_secs: 0.0,
        }
    }
}

impl CurveConfig {
    fn validate(&self) -> Result<()> {
        positive("curve.max_slowdown", self.max_slowdown)?;
        positive("curve.max_speedup", self.max_speedup)?;

        if self.max_slowdown > self.max_speedup {
            return Err(invalid(
                "curve.speed_range",
                format!("{}-{}", self.max_slowdown, self.max_speedup),
            ).into());
        }

        if self.max_slowdown > 1.0 {
            return Err(invalid("curve.max_slowdown", self.max_slowdown).into());
        }

        if self.max_speedup < 1.0 {
            return Err(invalid("curve.max_speedup", self.max_speedup).into());
        }

        if !self.smoothing_sigma.is_finite() || self.smoothing_sigma < 0.0 {
            return Err(invalid("curve.smoothing_sigma", self.smoothing_sigma).into());
        }

        if !self.frantic_ratio.is_finite() || self.frantic_ratio < 1.0 {
            return Err(invalid("curve.frantic_ratio", self.frantic_ratio).into());
        }

        for (key, value) in [
            ("curve.fast_correction", self.fast_correction),
            ("curve.borderline_correction", self.borderline_correction),
            ("curve.slow_correction", self.slow_correction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(key, value).into());
            }
        }

        if !self.fast_max_speedup.is_finite() || self.fast_max_speedup < 1.0 {
            return Err(invalid("curve.fast_max_speedup", self.fast_max_speedup).into());
        }

        if !self.start_ramp_secs.is_finite() || self.start_ramp_secs < 0.0 {
            return Err(invalid("curve.start_ramp_secs", self.start_ramp_secs).into());
        }

        Ok(())
    }
}

/// Dense optical flow settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Longest side of the analysis raster; larger frames are downscaled
    pub max_dimension: u32,

    /// Number of pyramid levels (1 = single scale)
    pub pyramid_levels: usize,

    /// Half-size of the Lucas-Kanade integration window
    pub window_radius: usize,

    /// Refinement iterations per pyramid level
    pub iterations: usize,

    /// Spacing of flow samples on the analysis raster
    pub grid_step: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_dimension: 160,
            pyramid_levels: 3,
            window_radius: 3,
            iterations: 4,
            grid_step: 2,
        }
    }
}

impl FlowConfig {
    fn validate(&self) -> Result<()> {
        if self.max_dimension < 8 {
            return Err(invalid("flow.max_dimension", self.max_dimension).into());
        }

        if self.pyramid_levels == 0 {
            return Err(invalid("flow.pyramid_levels", self.pyramid_levels).into());
        }

        if self.window_radius == 0 {
            return Err(invalid("flow.window_radius", self.window_radius).into());
        }

        if self.iterations == 0 {
            return Err(invalid("flow.iterations", self.iterations).into());
        }

        if self.grid_step == 0 {
            return Err(invalid("flow.grid_step", self.grid_step).into());
        }

        Ok(())
    }
}

/// Input handling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Frame rate assumed when the source reports an unusable one
    pub fallback_fps: f64,

    /// Frame rates above this are treated as unusable
    pub max_fps: f64,

    /// Number of worker threads for flow extraction
    pub processing_threads: usize,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            fallback_fps: 24.0,
            max_fps: 120.0,
            processing_threads: num_cpus::get(),
        }
    }
}

impl VideoConfig {
    /// Replace a missing or implausible native frame rate with the fallback
    pub fn sanitize_fps(&self, fps: f64) -> f64 {
        if fps.is_finite() && fps > 0.0 && fps <= self.max_fps {
            fps
        } else {
            tracing::warn!("Invalid frame rate {}, using {}fps", fps, self.fallback_fps);
            self.fallback_fps
        }
    }

    fn validate(&self) -> Result<()> {
        positive("video.fallback_fps", self.fallback_fps)?;
        positive("video.max_fps", self.max_fps)?;

        if self.fallback_fps > self.max_fps {
            return Err(invalid(
                "video.fps_range",
                format!("{}-{}", self.fallback_fps, self.max_fps),
            ).into());
        }

        if self.processing_threads == 0 {
            return Err(invalid("video.processing_threads", self.processing_threads).into());
        }

        Ok(())
    }
}
