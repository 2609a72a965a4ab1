//! # Tempo-Normalizer
//!
//! Motion-based tempo normalization for video clips.
//!
//! Generated and slow-motion footage often plays back sluggishly: the camera
//! and subject barely move from one frame to the next. This library measures
//! apparent motion with optical flow, separates camera pans from subject
//! motion, discounts rain/grain-like noise, classifies the clip's native
//! tempo, and then replays the *existing* frames along a new timeline so
//! the motion reaches a minimum tempo. Frames are repeated or skipped, never
//! blended, so the output stays as sharp as the source.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tempo_normalizer::{
//!     config::Config,
//!     normalize::{NormalizationEngine, OutputOptions},
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let engine = NormalizationEngine::new(Config::default())?;
//! let report = engine
//!     .normalize_file("clip.mp4", "normalized/", &OutputOptions::default())
//!     .await?;
//!
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Working with decoded frames
//!
//! The core never touches files. Given frames from any decoder, the engine
//! returns the timeline of source indices to emit:
//!
//! ```rust,no_run
//! use tempo_normalizer::{Config, Frame, NormalizationEngine};
//!
//! # fn frames() -> Vec<Frame> { Vec::new() }
//! # fn main() -> tempo_normalizer::Result<()> {
//! let engine = NormalizationEngine::new(Config::default())?;
//! let frames: Vec<Frame> = frames();
//!
//! let result = engine.normalize_frames(&frames, 24.0);
//! let output = result.output_frames(&frames);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`tempo`] - Flow, motion, classification, speed curve and resampling
//! - [`video`] - Frames, decoders and encoders
//! - [`normalize`] - The per-clip engine and its report
//! - [`config`] - Configuration management

pub mod config;
pub mod error;
pub mod normalize;
pub mod tempo;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    error::{NormalizerError, Result},
    normalize::{NormalizationEngine, NormalizationReport, OutputOptions},
    tempo::{SpeedCurve, TempoClass, Timeline},
    video::Frame,
};
