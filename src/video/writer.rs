use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, info};

use crate::error::{EncodeError, Result};
use crate::video::loader::drain_to_string;
use crate::video::types::Frame;

/// H.264 constant rate factor for encoded output
const OUTPUT_CRF: u8 = 18;

/// Destination for a resampled frame sequence
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the output, returning where it was written
    fn finish(&mut self) -> Result<PathBuf>;

    /// Number of frames written so far
    fn frames_written(&self) -> usize;
}

/// Write every frame, then close the sink
pub fn write_all(sink: &mut dyn FrameSink, frames: &[Frame]) -> Result<PathBuf> {
    for frame in frames {
        sink.write_frame(frame)?;
    }
    sink.finish()
}

pub fn check_ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Numbered PNG files (`frame_000000.png`, ...) in a directory
pub struct PngSequenceWriter {
    dir: PathBuf,
    count: usize,
}

impl PngSequenceWriter {
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        debug!("Writing PNG sequence to {}", dir.display());
        Ok(Self { dir, count: 0 })
    }
}

impl FrameSink for PngSequenceWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let path = self.dir.join(format!("frame_{:06}.png", self.count));
        frame.save_png(&path).map_err(|e| EncodeError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.count += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<PathBuf> {
        info!("Saved {} frames to {}", self.count, self.dir.display());
        Ok(self.dir.clone())
    }

    fn frames_written(&self) -> usize {
        self.count
    }
}

/// Encodes frames by piping raw RGB24 into `ffmpeg`
pub struct FfmpegWriter {
    path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    dimensions: (u32, u32),
    count: usize,
}

impl FfmpegWriter {
    /// Start an encoder for `width`x`height` frames at `fps`.
    ///
    /// Output is H.264/yuv420p, so odd dimensions are padded by one pixel.
    pub fn create<P: AsRef<Path>>(path: P, width: u32, height: u32, fps: f64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !check_ffmpeg_available() {
            return Err(EncodeError::EncodingFailed {
                reason: "FFmpeg not found. Please install FFmpeg.".to_string(),
            }
            .into());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-y", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", width, height)])
            .args(["-r", &format!("{:.6}", fps)])
            .args(["-i", "-"])
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .args(["-crf", &OUTPUT_CRF.to_string()])
            .arg(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncodeError::EncodingFailed {
                reason: format!("Failed to spawn FFmpeg process: {}", e),
            })?;

        let stdin = child.stdin.take();
        let stderr = child.stderr.take().map(drain_to_string);
        debug!("Encoding {}x{} @ {:.3}fps to {}", width, height, fps, path.display());

        Ok(Self {
            path,
            child,
            stdin,
            stderr,
            dimensions: (width, height),
            count: 0,
        })
    }
}

impl FrameSink for FfmpegWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != self.dimensions {
            return Err(EncodeError::EncodingFailed {
                reason: format!(
                    "frame {} is {:?}, encoder expects {:?}",
                    self.count,
                    frame.dimensions(),
                    self.dimensions
                ),
            }
            .into());
        }

        let stdin = self.stdin.as_mut().ok_or_else(|| EncodeError::EncodingFailed {
            reason: "encoder already finished".to_string(),
        })?;
        stdin
            .write_all(frame.as_image().as_raw())
            .map_err(|e| EncodeError::WriteFailed {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        self.count += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<PathBuf> {
        // Closing stdin signals end of stream
        drop(self.stdin.take());

        let status = self.child.wait().map_err(|e| EncodeError::EncodingFailed {
            reason: format!("FFmpeg execution failed: {}", e),
        })?;

        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(EncodeError::EncodingFailed {
                reason: format!("FFmpeg failed: {}", stderr.trim()),
            }
            .into());
        }

        info!("Encoded {} frames to {}", self.count, self.path.display());
        Ok(self.path.clone())
    }

    fn frames_written(&self) -> usize {
        self.count
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        // An unfinished encoder is abandoned rather than left running
        if self.stdin.take().is_some() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_png_sequence_writer_numbers_frames() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("normalized");
        let frames: Vec<Frame> = (0..3)
            .map(|i| Frame::new_filled(4, 4, [0, i as u8 * 50, 0], 7))
            .collect();

        let mut writer = PngSequenceWriter::create(&out).unwrap();
        let written = write_all(&mut writer, &frames).unwrap();

        assert_eq!(written, out);
        assert_eq!(writer.frames_written(), 3);
        assert!(out.join("frame_000000.png").exists());
        assert!(out.join("frame_000002.png").exists());
        assert!(!out.join("frame_000003.png").exists());

        let last = image::open(out.join("frame_000002.png")).unwrap().to_rgb8();
        assert_eq!(last.get_pixel(0, 0).0, [0, 100, 0]);
    }
}
