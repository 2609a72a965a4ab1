use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    error::{NormalizerError, Result},
    normalize::report::NormalizationReport,
    tempo::{
        FlowExtractor, FrameResampler, MotionAnalysis, MotionEstimator, SpeedCurve,
        SpeedCurveBuilder, TempoClassification, TempoClassifier, Timeline,
    },
    video::{open_source, FfmpegWriter, Frame, FrameSink, PngSequenceWriter, VideoClip},
};

/// What to produce for each clip besides the normalized frames
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    /// Write a PNG sequence directory instead of an encoded video
    pub png_sequence: bool,

    /// Save a TOML report next to the output
    pub write_report: bool,

    /// Re-measure motion on the output for the report
    pub verify: bool,
}

/// Everything the pipeline derived for one clip
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedClip {
    /// Native (sanitized) frame rate, shared by input and output
    pub fps: f64,
    pub frame_count: usize,
    pub analysis: MotionAnalysis,
    pub classification: TempoClassification,
    pub curve: SpeedCurve,
    pub timeline: Timeline,
}

impl NormalizedClip {
    /// The frames to emit, in output order
    pub fn output_frames(&self, frames: &[Frame]) -> Vec<Frame> {
        self.timeline.select(frames)
    }
}

/// Main normalization engine
///
/// The engine follows a clear pipeline:
/// 1. Decoding - Read every frame of the clip and its native frame rate
/// 2. Motion Analysis - Optical flow per frame pair, reduced to motion samples
/// 3. Classification - Judge the clip's native tempo from its opening
/// 4. Speed Curve - Per-frame playback multipliers toward the tempo floor
/// 5. Resampling & Output - Repeat or skip source frames and write them out
///
/// Cloning is cheap; clones share the configuration and the flow worker pool.
#[derive(Clone)]
pub struct NormalizationEngine {
    config: Arc<Config>,
    extractor: FlowExtractor,
    estimator: MotionEstimator,
    classifier: TempoClassifier,
    curve_builder: SpeedCurveBuilder,
    resampler: FrameResampler,
    pool: Arc<ThreadPool>,
}

impl NormalizationEngine {
    /// Create an engine, rejecting an invalid configuration before any
    /// frame is touched
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.video.processing_threads)
            .thread_name(|i| format!("flow-{}", i))
            .build()
            .map_err(|e| NormalizerError::generic(format!("Failed to build worker pool: {}", e)))?;

        debug!(
            "Normalization engine ready: floor {:.2} px/frame @ {}fps, speed {:.2}x-{:.2}x, {} threads",
            config.tempo.min_tempo_at_reference,
            config.tempo.reference_fps,
            config.curve.max_slowdown,
            config.curve.max_speedup,
            config.video.processing_threads
        );

        Ok(Self {
            extractor: FlowExtractor::new(config.flow.clone()),
            estimator: MotionEstimator::new(config.motion.clone()),
            classifier: TempoClassifier::new(config.tempo.clone()),
            curve_builder: SpeedCurveBuilder::new(config.curve.clone()),
            resampler: FrameResampler::new(),
            pool: Arc::new(pool),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ==========================================
    // CORE PIPELINE (in-memory frames)
    // ==========================================

    /// Measure one motion sample per frame transition.
    ///
    /// Pairs are independent, so they are spread across the worker pool;
    /// each flow field is dropped as soon as it has been reduced.
    pub fn analyze_motion(&self, frames: &[Frame]) -> MotionAnalysis {
        if frames.len() < 2 {
            return MotionAnalysis::default();
        }

        let samples = self.pool.install(|| {
            frames
                .par_windows(2)
                .map(|pair| self.estimator.estimate(&self.extractor.extract(&pair[0], &pair[1])))
                .collect()
        });

        MotionAnalysis::new(samples)
    }

    /// Classification, curve and timeline for an already measured clip of
    /// `frame_count` frames
    pub fn plan(&self, analysis: MotionAnalysis, frame_count: usize, fps: f64) -> NormalizedClip {
        let fps = self.config.video.sanitize_fps(fps);
        let classification = self.classifier.classify(&analysis, fps);

        if frame_count < 2 || analysis.is_empty() {
            return NormalizedClip {
                fps,
                frame_count,
                analysis,
                classification,
                curve: SpeedCurve::identity(frame_count),
                timeline: Timeline::identity(frame_count, fps),
            };
        }

        let curve = self.curve_builder.build(&analysis, &classification, fps);
        let timeline = self.resampler.resample(&curve, fps);

        NormalizedClip {
            fps,
            frame_count,
            analysis,
            classification,
            curve,
            timeline,
        }
    }

    /// Run the whole pipeline over decoded frames.
    ///
    /// Fewer than two frames yield the identity mapping.
    pub fn normalize_frames(&self, frames: &[Frame], fps: f64) -> NormalizedClip {
        let analysis = self.analyze_motion(frames);
        self.plan(analysis, frames.len(), fps)
    }

    // ==========================================
    // FILE PIPELINE
    // ==========================================

    /// Normalize one clip file or frame directory into `output_dir`.
    ///
    /// The CPU-heavy work runs on the blocking pool; a decode failure aborts
    /// this clip without producing any output.
    pub async fn normalize_file<P: AsRef<Path>>(
        &self,
        input: P,
        output_dir: P,
        options: &OutputOptions,
    ) -> Result<NormalizationReport> {
        let engine = self.clone();
        let input = input.as_ref().to_path_buf();
        let output_dir = output_dir.as_ref().to_path_buf();
        let options = options.clone();

        task::spawn_blocking(move || engine.process_clip(&input, &output_dir, &options))
            .await
            .map_err(|e| NormalizerError::generic(format!("Clip task failed: {}", e)))?
    }

    /// Normalize several clips concurrently.
    ///
    /// Results come back in input order; one failing clip does not stop the
    /// others.
    pub async fn normalize_batch(
        &self,
        inputs: &[PathBuf],
        output_dir: &Path,
        options: &OutputOptions,
    ) -> Vec<(PathBuf, Result<NormalizationReport>)> {
        info!("🎬 Normalizing {} clip(s) into {}", inputs.len(), output_dir.display());

        let mut set = JoinSet::new();
        for (position, input) in inputs.iter().enumerate() {
            let engine = self.clone();
            let input = input.clone();
            let output_dir = output_dir.to_path_buf();
            let options = options.clone();

            set.spawn(async move {
                let result = engine.normalize_file(&input, &output_dir, &options).await;
                (position, input, result)
            });
        }

        let mut results = Vec::with_capacity(inputs.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((position, input, result)) => {
                    if let Err(e) = &result {
                        error!("❌ {}: {}", input.display(), e.user_message());
                    }
                    results.push((position, input, result));
                }
                Err(e) => error!("Clip task panicked or was cancelled: {}", e),
            }
        }

        results.sort_by_key(|(position, _, _)| *position);
        results
            .into_iter()
            .map(|(_, input, result)| (input, result))
            .collect()
    }

    fn process_clip(
        &self,
        input: &Path,
        output_dir: &Path,
        options: &OutputOptions,
    ) -> Result<NormalizationReport> {
        let mut clip = VideoClip::new(input);
        info!("Processing clip: {}", clip.name);

        // Pipeline Step 1: Decoding
        let frames = self.decode(&mut clip)?;
        let fps = clip.fps.unwrap_or(self.config.video.fallback_fps);

        // Pipeline Steps 2-4: Motion, classification, speed curve
        let result = self.normalize_frames(&frames, fps);
        info!(
            "   {} clip: baseline {:.2} px/frame (floor {:.2}){}",
            result.classification.class,
            result.classification.baseline,
            result.classification.floor,
            if result.classification.noisy { ", noisy" } else { "" }
        );
        info!(
            "   Speed: {:.2}x - {:.2}x (avg {:.2}x)",
            result.curve.min(),
            result.curve.max(),
            result.curve.mean()
        );

        // Pipeline Step 5: Resampling & Output
        let output_frames = result.output_frames(&frames);
        drop(frames);
        info!("   Frames: {} -> {}", result.frame_count, output_frames.len());

        let mut report = NormalizationReport::new(clip.name.clone(), input, &result);
        if let Some(written) = self.write_output(&clip, &output_frames, result.fps, output_dir, options)? {
            report = report.with_output(written);
        }

        if options.verify {
            let after = self.analyze_motion(&output_frames).coefficient_of_variation();
            debug!(
                "Motion CV {:.1}% -> {:.1}%",
                result.analysis.coefficient_of_variation(),
                after
            );
            report = report.with_verification(after);
        }

        if options.write_report {
            let report_path = output_dir.join(format!("{}_report.toml", clip.name));
            report.save_to_file(&report_path)?;
            debug!("Report saved to {}", report_path.display());
        }

        info!("✅ {}", report.summary());
        Ok(report)
    }

    /// Decode every frame; any failure aborts the clip
    fn decode(&self, clip: &mut VideoClip) -> Result<Vec<Frame>> {
        let mut source = open_source(&clip.path, self.config.video.fallback_fps)?;
        let frames = source.read_all()?;
        clip.record_decoded(
            source.metadata(),
            self.config.video.sanitize_fps(source.metadata().fps),
            frames.len(),
        );

        debug!(
            "Decoded {} frames ({:.2}s) from {}",
            frames.len(),
            clip.duration().unwrap_or(0.0),
            clip.path.display()
        );
        Ok(frames)
    }

    fn write_output(
        &self,
        clip: &VideoClip,
        frames: &[Frame],
        fps: f64,
        output_dir: &Path,
        options: &OutputOptions,
    ) -> Result<Option<PathBuf>> {
        if frames.is_empty() {
            warn!("{} has no frames to write", clip.name);
            return Ok(None);
        }

        std::fs::create_dir_all(output_dir)?;

        let mut sink: Box<dyn FrameSink> = if options.png_sequence {
            Box::new(PngSequenceWriter::create(output_dir.join(&clip.name))?)
        } else {
            let path = output_dir.join(format!("{}_normalized.mp4", clip.name));
            let (width, height) = clip
                .resolution
                .unwrap_or_else(|| frames[0].dimensions());
            Box::new(FfmpegWriter::create(path, width, height, fps)?)
        };

        crate::video::writer::write_all(sink.as_mut(), frames).map(Some)
    }
}
