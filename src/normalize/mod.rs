//! # Normalize Module
//!
//! The engine that drives a clip from decoded frames to a written,
//! tempo-normalized output, and the report it leaves behind.

pub mod engine;
pub mod report;

pub use engine::{NormalizationEngine, NormalizedClip, OutputOptions};
pub use report::NormalizationReport;
