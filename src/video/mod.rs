//! # Video Module
//!
//! Frame types plus decoding and encoding collaborators. Decoders produce
//! every frame of a clip in display order; sinks write the resampled
//! sequence back out at the clip's native frame rate.

pub mod types;
pub mod loader;
pub mod writer;

pub use types::{Frame, VideoClip, VideoMetadata};
pub use loader::{open_source, FfmpegSource, FrameSource, ImageSequenceSource};
pub use writer::{check_ffmpeg_available, FfmpegWriter, FrameSink, PngSequenceWriter};
