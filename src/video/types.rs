use image::{imageops, GrayImage, ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Represents a single decoded video frame
///
/// A thin wrapper around an RGB image buffer plus the frame's position in
/// its source clip. Frames are never modified once decoded; resampling only
/// changes which frames appear and how often.
#[derive(Clone, Debug)]
pub struct Frame {
    buffer: RgbImage,
    index: usize,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage, index: usize) -> Self {
        Self { buffer, index }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3], index: usize) -> Self {
        let buffer = ImageBuffer::from_fn(width, height, |_, _| Rgb(color));
        Self { buffer, index }
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>, index: usize) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer, index })
    }

    /// Position of this frame in the source clip
    pub fn index(&self) -> usize {
        self.index
    }

    /// Get the width of the frame
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    /// Get the height of the frame
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Get the frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Get the underlying image buffer
    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    /// Single-channel intensity version of the frame, downscaled so that its
    /// longest side does not exceed `max_dimension`.
    pub fn luma(&self, max_dimension: u32) -> GrayImage {
        let gray = imageops::grayscale(&self.buffer);
        let (width, height) = gray.dimensions();
        let longest = width.max(height);

        if longest <= max_dimension || longest == 0 {
            return gray;
        }

        let scale = max_dimension as f64 / longest as f64;
        let target_w = ((width as f64 * scale).round() as u32).max(1);
        let target_h = ((height as f64 * scale).round() as u32).max(1);
        imageops::resize(&gray, target_w, target_h, imageops::FilterType::Triangle)
    }

    /// Save the frame as a PNG file
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), image::ImageError> {
        self.buffer.save(path)
    }
}

/// Represents a clip to normalize, with whatever metadata is known about it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoClip {
    /// Path to the video file or frame directory
    pub path: PathBuf,

    /// Name/identifier for the clip (file stem)
    pub name: String,

    /// Frame rate the clip is processed at, once decoded
    pub fps: Option<f64>,

    /// Resolution (width, height)
    pub resolution: Option<(u32, u32)>,

    /// Number of frames actually decoded
    pub frame_count: Option<usize>,
}

impl VideoClip {
    /// Create a new clip for the given path
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("clip")
            .to_string();

        Self {
            path,
            name,
            fps: None,
            resolution: None,
            frame_count: None,
        }
    }

    /// Get the file extension
    pub fn extension(&self) -> Option<&str> {
        self.path.extension()?.to_str()
    }

    /// Check if this clip is a container format the FFmpeg decoder handles
    pub fn is_video_file(&self) -> bool {
        matches!(
            self.extension().map(|ext| ext.to_lowercase()).as_deref(),
            Some("mp4" | "avi" | "mov" | "mkv" | "webm" | "m4v")
        )
    }

    /// Record what decoding found out about the clip
    pub fn record_decoded(&mut self, metadata: &VideoMetadata, fps: f64, frame_count: usize) {
        self.fps = Some(fps);
        self.resolution = Some(metadata.dimensions());
        self.frame_count = Some(frame_count);
    }

    /// Duration in seconds (if frame count and fps are known)
    pub fn duration(&self) -> Option<f64> {
        match (self.frame_count, self.fps) {
            (Some(count), Some(fps)) if fps > 0.0 => Some(count as f64 / fps),
            _ => None,
        }
    }
}

/// Stream properties reported by a frame source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,

    /// Native frame rate as reported; may be zero or garbage
    pub fps: f64,

    /// Frame count if the container reports one
    pub frame_count: Option<usize>,
}

impl VideoMetadata {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bytes in one packed RGB24 frame
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}
