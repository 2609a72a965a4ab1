//! # Tempo Module
//!
//! The motion-to-timing pipeline:
//!
//! 1. [`FlowExtractor`] measures dense optical flow between neighbouring frames
//! 2. [`MotionEstimator`] reduces each flow field to one [`MotionSample`]
//! 3. [`TempoClassifier`] judges the clip's native tempo from its opening
//! 4. [`SpeedCurveBuilder`] turns the motion series into playback multipliers
//! 5. [`FrameResampler`] walks the curve to pick which source frames to show
//!
//! Every stage is a pure function of its inputs and the configuration.

pub mod classifier;
pub mod curve;
pub mod flow;
pub mod motion;
pub mod resampler;
pub mod types;

pub use classifier::TempoClassifier;
pub use curve::{gaussian_filter1d, SpeedCurveBuilder};
pub use flow::{FlowExtractor, FlowField};
pub use motion::MotionEstimator;
pub use resampler::{FrameResampler, Timeline};
pub use types::{
    percentile, MotionAnalysis, MotionSample, SpeedCurve, TempoClass, TempoClassification,
};
