use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use image::GenericImageView;
use tracing::{debug, info, warn};

use crate::error::{DecodeError, Result};
use crate::video::types::{Frame, VideoClip, VideoMetadata};

/// A decoder that yields a clip's frames in display order
pub trait FrameSource: Send {
    fn metadata(&self) -> &VideoMetadata;

    /// Next frame, or `None` once the stream is exhausted.
    ///
    /// Any failure is fatal for the clip; sources never substitute
    /// placeholder frames.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Decode everything that remains
    fn read_all(&mut self) -> Result<Vec<Frame>> {
        let mut frames = Vec::with_capacity(self.metadata().frame_count.unwrap_or(0));
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

/// Open the right source for a clip path.
///
/// Directories are read as image sequences at `fallback_fps`; container
/// files go through FFmpeg.
pub fn open_source<P: AsRef<Path>>(path: P, fallback_fps: f64) -> Result<Box<dyn FrameSource>> {
    let path = path.as_ref();

    if path.is_dir() {
        return Ok(Box::new(ImageSequenceSource::open(path, fallback_fps)?));
    }

    if !path.exists() {
        return Err(DecodeError::LoadFailed {
            path: path.display().to_string(),
        }
        .into());
    }

    let clip = VideoClip::new(path);
    if clip.is_video_file() {
        Ok(Box::new(FfmpegSource::open(path)?))
    } else {
        Err(DecodeError::UnsupportedFormat {
            format: clip.extension().unwrap_or("none").to_string(),
        }
        .into())
    }
}

// ============================================================================
// Image sequences
// ============================================================================

/// Frames stored as numbered image files in a directory, read in file name
/// order
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    position: usize,
    metadata: VideoMetadata,
}

impl ImageSequenceSource {
    pub fn open<P: AsRef<Path>>(dir: P, fps: f64) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|_| DecodeError::LoadFailed {
            path: dir.display().to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_image_file(&path) {
                files.push(path);
            }
        }
        files.sort();

        let (width, height) = match files.first() {
            Some(first) => image::image_dimensions(first).map_err(|e| DecodeError::LoadFailed {
                path: format!("{}: {}", first.display(), e),
            })?,
            None => {
                warn!("No image files found in {}", dir.display());
                (0, 0)
            }
        };

        info!(
            "Image sequence {}: {} frames, {}x{}",
            dir.display(),
            files.len(),
            width,
            height
        );

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            frame_count: Some(files.len()),
        };

        Ok(Self {
            files,
            position: 0,
            metadata,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.position) else {
            return Ok(None);
        };
        let index = self.position;

        let image = image::open(path).map_err(|e| DecodeError::FrameUnavailable {
            index,
            reason: format!("{}: {}", path.display(), e),
        })?;

        let found = image.dimensions();
        let expected = self.metadata.dimensions();
        if found != expected {
            return Err(DecodeError::InconsistentDimensions {
                index,
                expected,
                found,
            }
            .into());
        }

        self.position += 1;
        Ok(Some(Frame::new(image.to_rgb8(), index)))
    }
}

fn is_image_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some(ext) if matches!(
            ext.to_lowercase().as_str(),
            "png" | "jpg" | "jpeg"
        )
    )
}

// ============================================================================
// FFmpeg pipe
// ============================================================================

/// Decodes a container file by piping raw RGB24 frames out of `ffmpeg`
pub struct FfmpegSource {
    path: PathBuf,
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    position: usize,
    finished: bool,
    metadata: VideoMetadata,
}

impl FfmpegSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = probe(&path)?;

        if metadata.width == 0 || metadata.height == 0 {
            return Err(DecodeError::DecodingFailed {
                reason: format!("{}: stream reports no frame size", path.display()),
            }
            .into());
        }

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DecodeError::LoadFailed {
                path: format!("{}: cannot start ffmpeg: {}", path.display(), e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| DecodeError::DecodingFailed {
            reason: "ffmpeg stdout unavailable".to_string(),
        })?;
        let stderr = child.stderr.take().map(drain_to_string);

        info!(
            "Decoding {}: {}x{} @ {:.3}fps",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.fps
        );

        Ok(Self {
            path,
            child,
            stdout,
            stderr,
            position: 0,
            finished: false,
            metadata,
        })
    }

    /// Reap the decoder once its output is drained
    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        let status = self.child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            debug!("ffmpeg finished {} after {} frames", self.path.display(), self.position);
            return Ok(());
        }

        Err(DecodeError::DecodingFailed {
            reason: format!("ffmpeg exited with {}: {}", status, stderr.trim()),
        }
        .into())
    }
}

impl FrameSource for FfmpegSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let frame_size = self.metadata.frame_size();
        let mut buffer = vec![0u8; frame_size];
        let filled = read_full(&mut self.stdout, &mut buffer)?;

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        if filled < frame_size {
            let _ = self.child.kill();
            self.finished = true;
            return Err(DecodeError::FrameUnavailable {
                index: self.position,
                reason: format!("truncated frame ({} of {} bytes)", filled, frame_size),
            }
            .into());
        }

        let index = self.position;
        self.position += 1;
        let frame = Frame::from_rgb_bytes(self.metadata.width, self.metadata.height, buffer, index)
            .ok_or_else(|| DecodeError::FrameUnavailable {
                index,
                reason: "buffer does not match frame size".to_string(),
            })?;
        Ok(Some(frame))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Collect a child's stderr on its own thread so a chatty process never
/// blocks on a full pipe while its stdout is being consumed
pub(crate) fn drain_to_string<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = pipe.read_to_end(&mut bytes);
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

/// Read until `buffer` is full or the stream ends; returns bytes read
fn read_full<R: Read>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Query the first video stream with ffprobe
pub fn probe<P: AsRef<Path>>(path: P) -> Result<VideoMetadata> {
    let path = path.as_ref();
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| DecodeError::LoadFailed {
            path: format!("{}: cannot start ffprobe: {}", path.display(), e),
        })?;

    if !output.status.success() {
        return Err(DecodeError::LoadFailed {
            path: format!(
                "{}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
        .into());
    }

    Ok(parse_probe_output(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `key=value` lines from ffprobe.
///
/// Prefers `avg_frame_rate`, falling back to `r_frame_rate`; an unusable
/// rate is reported as 0 and left for the caller to sanitize.
fn parse_probe_output(text: &str) -> VideoMetadata {
    let mut metadata = VideoMetadata {
        width: 0,
        height: 0,
        fps: 0.0,
        frame_count: None,
    };
    let mut avg_rate = None;
    let mut base_rate = None;

    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "width" => metadata.width = value.parse().unwrap_or(0),
            "height" => metadata.height = value.parse().unwrap_or(0),
            "avg_frame_rate" => avg_rate = parse_rate(value),
            "r_frame_rate" => base_rate = parse_rate(value),
            "nb_frames" => metadata.frame_count = value.parse().ok(),
            _ => {}
        }
    }

    metadata.fps = avg_rate.or(base_rate).unwrap_or(0.0);
    metadata
}

/// Parse an ffprobe rate such as `30000/1001` or `25`
fn parse_rate(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.trim().parse().ok()?,
    };

    (rate.is_finite() && rate > 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NormalizerError;
    use tempfile::tempdir;

    fn write_sequence(dir: &Path, count: usize, size: (u32, u32)) {
        for i in 0..count {
            let frame = Frame::new_filled(size.0, size.1, [i as u8, 0, 0], i);
            frame.save_png(dir.join(format!("frame_{:04}.png", i))).unwrap();
        }
    }

    #[test]
    fn test_image_sequence_reads_in_name_order() {
        let dir = tempdir().unwrap();
        write_sequence(dir.path(), 5, (8, 6));
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), 24.0).unwrap();
        assert_eq!(source.metadata().dimensions(), (8, 6));
        assert_eq!(source.metadata().frame_count, Some(5));

        let frames = source.read_all().unwrap();
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index(), i);
            assert_eq!(frame.get_pixel(0, 0), [i as u8, 0, 0]);
        }
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_image_sequence_rejects_size_change() {
        let dir = tempdir().unwrap();
        write_sequence(dir.path(), 2, (8, 6));
        Frame::new_filled(4, 4, [0, 0, 0], 2)
            .save_png(dir.path().join("frame_0002.png"))
            .unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), 24.0).unwrap();
        let err = source.read_all().unwrap_err();
        assert!(matches!(
            err,
            NormalizerError::Decode(DecodeError::InconsistentDimensions { index: 2, .. })
        ));
    }

    #[test]
    fn test_empty_directory_has_no_frames() {
        let dir = tempdir().unwrap();
        let mut source = open_source(dir.path(), 24.0).unwrap();
        assert!(source.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_open_source_errors() {
        let dir = tempdir().unwrap();

        let missing = open_source(dir.path().join("missing.mp4"), 24.0);
        assert!(matches!(
            missing,
            Err(NormalizerError::Decode(DecodeError::LoadFailed { .. }))
        ));

        let text = dir.path().join("clip.txt");
        std::fs::write(&text, "not a video").unwrap();
        assert!(matches!(
            open_source(&text, 24.0),
            Err(NormalizerError::Decode(DecodeError::UnsupportedFormat { .. }))
        ));
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("24/1"), Some(24.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.001);
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("N/A"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let text = "width=1280\nheight=720\nr_frame_rate=24/1\navg_frame_rate=0/0\nnb_frames=N/A\n";
        let meta = parse_probe_output(text);

        assert_eq!(meta.dimensions(), (1280, 720));
        assert_eq!(meta.fps, 24.0);
        assert_eq!(meta.frame_count, None);
    }

    #[test]
    fn test_read_full_reports_short_reads() {
        let data = [1u8, 2, 3, 4, 5];
        let mut reader = &data[..];
        let mut buffer = [0u8; 3];

        assert_eq!(read_full(&mut reader, &mut buffer).unwrap(), 3);
        assert_eq!(read_full(&mut reader, &mut buffer).unwrap(), 2);
        assert_eq!(read_full(&mut reader, &mut buffer).unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_large_stderr_does_not_stall_stdout() {
        // Well past a 64 KiB pipe buffer, written before any stdout
        let mut child = Command::new("sh")
            .args(["-c", "head -c 300000 /dev/zero | tr '\\0' x >&2; printf done"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let stderr = drain_to_string(child.stderr.take().unwrap());
        let mut stdout = String::new();
        child.stdout.take().unwrap().read_to_string(&mut stdout).unwrap();

        assert!(child.wait().unwrap().success());
        assert_eq!(stdout, "done");
        assert_eq!(stderr.join().unwrap().len(), 300_000);
    }
}
