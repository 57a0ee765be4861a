//! Frame ingestion driver.
//!
//! Probes the input kind (video file, single image, image directory),
//! samples frames according to the configured rate and the size-tiered
//! safety caps, runs the classifier, and writes one JSON line per
//! processed frame: an individual per-frame record file plus a
//! truncate-on-write latest-frame file that always holds the newest
//! line. The judger consumes the per-frame files independently.
//!
//! Video decoding is feature-gated behind `ingest-video-ffmpeg`; a
//! synthetic `stub://` source is always compiled for tests and smoke
//! runs without media files.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::classify::FrameClassifier;
use crate::frame::Frame;
use crate::records::{frame_record_filename, FrameRecord};

const VIDEO_EXTS: &[&str] = &[
    "mp4", "avi", "mov", "mkv", "flv", "wmv", "webm", "mpg", "mpeg", "m4v", "ts", "mts",
];
const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// Consecutive frame read failures tolerated before a run aborts.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    VideoFile,
    ImageFile,
    ImageDirectory,
    Synthetic,
    Missing,
    Unknown,
}

/// Classify an input path by existence and extension.
pub fn probe_input(input: &str) -> InputKind {
    if input.starts_with("stub://") {
        return InputKind::Synthetic;
    }
    let path = Path::new(input);
    if !path.exists() {
        return InputKind::Missing;
    }
    if path.is_dir() {
        return InputKind::ImageDirectory;
    }
    match extension_of(path) {
        Some(ext) if VIDEO_EXTS.contains(&ext.as_str()) => InputKind::VideoFile,
        Some(ext) if IMAGE_EXTS.contains(&ext.as_str()) => InputKind::ImageFile,
        _ => InputKind::Unknown,
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[derive(Clone, Debug)]
pub struct DriverConfig {
    pub input: String,
    /// Directory receiving one `NNNNNN.jsonl` record file per frame.
    pub out_dir: PathBuf,
    /// Truncated and rewritten with the newest record line each frame.
    pub latest_frame_file: PathBuf,
    /// Target sampling rate for video inputs; zero processes every
    /// stepped frame the tier cap allows.
    pub sample_fps: f64,
    /// Frames to process per 100 images in directory mode.
    pub sample_fp100: u32,
    pub max_frames: usize,
    pub start_frame: i64,
    /// Inclusive end frame for video inputs; negative means to the end.
    pub end_frame: i64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            input: String::new(),
            out_dir: PathBuf::from("out"),
            latest_frame_file: PathBuf::from("out/last_frame.jsonl"),
            sample_fps: 1.0,
            sample_fp100: 20,
            max_frames: 10_000,
            start_frame: 0,
            end_frame: -1,
        }
    }
}

pub struct IngestDriver {
    cfg: DriverConfig,
    classifier: FrameClassifier,
}

impl IngestDriver {
    pub fn new(cfg: DriverConfig, classifier: FrameClassifier) -> Result<Self> {
        fs::create_dir_all(&cfg.out_dir)
            .with_context(|| format!("failed to create out dir {}", cfg.out_dir.display()))?;
        if let Some(parent) = cfg.latest_frame_file.parent() {
            fs::create_dir_all(parent)?;
        }
        if classifier.seat_count() == 0 {
            log::warn!("seat registry is empty; every frame will report zero seats");
        }
        Ok(Self { cfg, classifier })
    }

    /// Run to completion. Returns the number of frames processed.
    pub fn run(&mut self) -> Result<usize> {
        match probe_input(&self.cfg.input) {
            InputKind::Missing => bail!("input does not exist: {}", self.cfg.input),
            InputKind::Unknown => bail!("unrecognized input kind: {}", self.cfg.input),
            InputKind::ImageFile => {
                let path = PathBuf::from(&self.cfg.input);
                let frame = Frame::from_image_path(&path)?;
                self.on_frame(&frame, 0, &self.cfg.input.clone())?;
                Ok(1)
            }
            InputKind::ImageDirectory => self.process_image_dir(),
            InputKind::VideoFile | InputKind::Synthetic => self.process_video(),
        }
    }

    /// Directory mode: iterate image files in name order, sampling
    /// `sample_fp100` of every hundred.
    fn process_image_dir(&mut self) -> Result<usize> {
        let dir = PathBuf::from(&self.cfg.input);
        let images = list_image_files(&dir)?;
        if images.is_empty() {
            log::warn!("no image files in {}", dir.display());
            return Ok(0);
        }
        let step = image_stepsize(images.len(), self.cfg.sample_fp100);
        log::info!(
            "image directory mode: {} files, stepping by {step}",
            images.len()
        );

        let mut processed = 0usize;
        let mut frame_index = 0i64;
        let mut consecutive_failures = 0u32;
        for (i, path) in images.iter().enumerate() {
            if i % step != 0 {
                continue;
            }
            let frame = match Frame::from_image_path(path) {
                Ok(frame) => {
                    consecutive_failures = 0;
                    frame
                }
                Err(e) => {
                    consecutive_failures += 1;
                    log::error!("failed to read {}: {e:#}", path.display());
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        bail!("aborting after {consecutive_failures} consecutive read failures");
                    }
                    continue;
                }
            };
            self.on_frame(&frame, frame_index, &path.to_string_lossy())?;
            frame_index += 1;
            processed += 1;
            if processed >= self.cfg.max_frames {
                log::info!("max frame budget ({}) reached", self.cfg.max_frames);
                break;
            }
        }
        log::info!("image directory run complete: processed={processed}");
        Ok(processed)
    }

    /// Video mode: sequential decode with index-stepped sampling under
    /// the size-tiered cap.
    fn process_video(&mut self) -> Result<usize> {
        let mut source = VideoSource::open(&self.cfg.input)?;
        let total = source.total_frames();
        let plan = video_sample_plan(total, self.cfg.sample_fps, source.fps());
        let end_frame = if self.cfg.end_frame < 0 {
            i64::MAX
        } else {
            self.cfg.end_frame
        };
        log::info!(
            "video mode: total={total} fps={:.2} step={} cap={}",
            source.fps(),
            plan.stepsize,
            plan.max_samples
        );

        let mut processed = 0usize;
        let mut consecutive_failures = 0u32;
        loop {
            let (idx, frame) = match source.next_frame() {
                Ok(Some(item)) => {
                    consecutive_failures = 0;
                    item
                }
                Ok(None) => break,
                Err(e) => {
                    consecutive_failures += 1;
                    log::error!("frame decode failed: {e:#}");
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        bail!("aborting after {consecutive_failures} consecutive decode failures");
                    }
                    continue;
                }
            };
            if idx > end_frame {
                break;
            }
            if idx < self.cfg.start_frame || (idx - self.cfg.start_frame) % plan.stepsize != 0 {
                continue;
            }
            self.on_frame(&frame, idx, &self.cfg.input.clone())?;
            processed += 1;
            if processed >= plan.max_samples || processed >= self.cfg.max_frames {
                log::info!("sample budget reached at frame {idx}");
                break;
            }
        }
        log::info!("video run complete: processed={processed}");
        Ok(processed)
    }

    /// Classify one frame and write its record line to the per-frame
    /// file and the latest-frame file.
    fn on_frame(&mut self, frame: &Frame, frame_index: i64, image_path: &str) -> Result<()> {
        let ts_ms = crate::now_ms()?;
        let snapshots = self.classifier.process_frame(frame, ts_ms, frame_index)?;
        for snap in &snapshots {
            log::debug!(
                "frame {frame_index} seat {} {} pc={:.2} oc={:.2} fg={:.3}",
                snap.seat_id,
                snap.occupancy_state,
                snap.person_conf_max,
                snap.object_conf_max,
                snap.fg_ratio
            );
        }

        let record = FrameRecord::from_snapshots(&snapshots, ts_ms, frame_index, image_path);
        let line = record.to_json_line()?;

        let record_path = self.cfg.out_dir.join(frame_record_filename(frame_index));
        write_line(&record_path, &line)?;
        write_line(&self.cfg.latest_frame_file, &line)?;
        Ok(())
    }
}

fn write_line(path: &Path, line: &str) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("failed to write {}", path.display()))?;
    writeln!(file, "{line}")?;
    Ok(())
}

fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        match extension_of(&path) {
            Some(ext) if ["jpg", "jpeg", "png"].contains(&ext.as_str()) => out.push(path),
            _ => {}
        }
    }
    out.sort();
    Ok(out)
}

/// Stepsize for directory mode: process `sample_fp100` images of every
/// hundred. Out-of-range rates fall back to count-based defaults.
pub fn image_stepsize(image_count: usize, sample_fp100: u32) -> usize {
    if sample_fp100 == 0 || sample_fp100 > 100 {
        return if image_count <= 500 {
            5
        } else if image_count <= 1000 {
            10
        } else {
            50
        };
    }
    ((100 / sample_fp100) as usize + 1).max(1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoSamplePlan {
    pub stepsize: i64,
    pub max_samples: usize,
}

/// Derive the frame stepsize and sample cap for a video of `total`
/// frames. Long videos are capped by tier so a pathological input never
/// floods the classifier.
pub fn video_sample_plan(total: i64, sample_fps: f64, native_fps: f64) -> VideoSamplePlan {
    let base = if sample_fps > 0.0 && native_fps > 0.0 {
        if sample_fps >= native_fps {
            (native_fps * 5.0) as i64
        } else {
            (native_fps / sample_fps) as i64
        }
    } else {
        1
    };
    let cap: i64 = if total > 6_000 {
        600
    } else if total > 4_000 {
        total / 20 + 1
    } else if total > 1_000 {
        total / 50 + 1
    } else if total > 200 {
        total / 20 + 1
    } else {
        total.max(1)
    };
    let stepsize = base.max(total / cap).max(1);
    VideoSamplePlan {
        stepsize,
        max_samples: cap as usize,
    }
}

// ----------------------------------------------------------------------------
// Video sources
// ----------------------------------------------------------------------------

pub struct VideoSource {
    backend: VideoBackend,
}

enum VideoBackend {
    Synthetic(SyntheticVideo),
    #[cfg(feature = "ingest-video-ffmpeg")]
    Ffmpeg(ffmpeg_video::FfmpegVideo),
}

impl VideoSource {
    pub fn open(input: &str) -> Result<Self> {
        if let Some(spec) = input.strip_prefix("stub://") {
            return Ok(Self {
                backend: VideoBackend::Synthetic(SyntheticVideo::parse(spec)?),
            });
        }
        #[cfg(feature = "ingest-video-ffmpeg")]
        {
            Ok(Self {
                backend: VideoBackend::Ffmpeg(ffmpeg_video::FfmpegVideo::open(input)?),
            })
        }
        #[cfg(not(feature = "ingest-video-ffmpeg"))]
        {
            Err(anyhow!(
                "video input requires the ingest-video-ffmpeg feature: {input}"
            ))
        }
    }

    pub fn total_frames(&self) -> i64 {
        match &self.backend {
            VideoBackend::Synthetic(v) => v.total,
            #[cfg(feature = "ingest-video-ffmpeg")]
            VideoBackend::Ffmpeg(v) => v.total_frames(),
        }
    }

    pub fn fps(&self) -> f64 {
        match &self.backend {
            VideoBackend::Synthetic(v) => v.fps,
            #[cfg(feature = "ingest-video-ffmpeg")]
            VideoBackend::Ffmpeg(v) => v.fps(),
        }
    }

    /// Decode the next frame, or `None` at end of stream. The returned
    /// index counts source frames, not processed ones.
    pub fn next_frame(&mut self) -> Result<Option<(i64, Frame)>> {
        match &mut self.backend {
            VideoBackend::Synthetic(v) => v.next_frame(),
            #[cfg(feature = "ingest-video-ffmpeg")]
            VideoBackend::Ffmpeg(v) => v.next_frame(),
        }
    }
}

/// Deterministic generated video for tests: `stub://WxH@TOTAL`, all
/// parts optional (`stub://` alone gives 640x480, 300 frames).
struct SyntheticVideo {
    width: u32,
    height: u32,
    total: i64,
    fps: f64,
    index: i64,
}

impl SyntheticVideo {
    fn parse(spec: &str) -> Result<Self> {
        let mut width = 640u32;
        let mut height = 480u32;
        let mut total = 300i64;
        if !spec.is_empty() {
            let (dims, count) = match spec.split_once('@') {
                Some((dims, count)) => (dims, Some(count)),
                None => (spec, None),
            };
            if !dims.is_empty() {
                let (w, h) = dims
                    .split_once('x')
                    .ok_or_else(|| anyhow!("bad synthetic spec: {spec}"))?;
                width = w.parse().context("bad synthetic width")?;
                height = h.parse().context("bad synthetic height")?;
            }
            if let Some(count) = count {
                total = count.parse().context("bad synthetic frame count")?;
            }
        }
        Ok(Self {
            width,
            height,
            total,
            fps: 25.0,
            index: 0,
        })
    }

    fn next_frame(&mut self) -> Result<Option<(i64, Frame)>> {
        if self.index >= self.total {
            return Ok(None);
        }
        let idx = self.index;
        self.index += 1;
        // A slowly drifting gradient so the background model sees
        // plausible, mostly-static content.
        let mut frame = Frame::black(self.width, self.height);
        let drift = (idx / 50) as u8;
        for (i, px) in frame.pixels_mut().iter_mut().enumerate() {
            *px = ((i as i64 % 251) as u8).wrapping_add(drift);
        }
        Ok(Some((idx, frame)))
    }
}

#[cfg(feature = "ingest-video-ffmpeg")]
mod ffmpeg_video {
    use anyhow::{anyhow, Context, Result};
    use ffmpeg_next as ffmpeg;

    use crate::frame::Frame;

    pub(super) struct FfmpegVideo {
        input: ffmpeg::format::context::Input,
        stream_index: usize,
        decoder: ffmpeg::codec::decoder::Video,
        scaler: ffmpeg::software::scaling::Context,
        total_frames: i64,
        fps: f64,
        index: i64,
    }

    impl FfmpegVideo {
        pub(super) fn open(path: &str) -> Result<Self> {
            ffmpeg::init().context("initialize ffmpeg")?;
            let input = ffmpeg::format::input(&path)
                .with_context(|| format!("failed to open video {path}"))?;
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| anyhow!("no video track in {path}"))?;
            let stream_index = stream.index();
            let total_frames = stream.frames();
            let rate = stream.avg_frame_rate();
            let fps = if rate.denominator() != 0 {
                rate.numerator() as f64 / rate.denominator() as f64
            } else {
                0.0
            };
            let context =
                ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                    .context("load video decoder parameters")?;
            let decoder = context.decoder().video().context("open video decoder")?;
            let scaler = ffmpeg::software::scaling::context::Context::get(
                decoder.format(),
                decoder.width(),
                decoder.height(),
                ffmpeg::util::format::pixel::Pixel::RGB24,
                decoder.width(),
                decoder.height(),
                ffmpeg::software::scaling::flag::Flags::BILINEAR,
            )
            .context("create RGB scaler")?;
            Ok(Self {
                input,
                stream_index,
                decoder,
                scaler,
                total_frames,
                fps,
                index: 0,
            })
        }

        pub(super) fn total_frames(&self) -> i64 {
            self.total_frames
        }

        pub(super) fn fps(&self) -> f64 {
            self.fps
        }

        pub(super) fn next_frame(&mut self) -> Result<Option<(i64, Frame)>> {
            let mut decoded = ffmpeg::frame::Video::empty();
            let mut rgb = ffmpeg::frame::Video::empty();
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .context("send packet to decoder")?;
                if self.decoder.receive_frame(&mut decoded).is_ok() {
                    self.scaler
                        .run(&decoded, &mut rgb)
                        .context("scale frame to RGB")?;
                    let frame = rgb_frame_to_pixels(&rgb)?;
                    let idx = self.index;
                    self.index += 1;
                    return Ok(Some((idx, frame)));
                }
            }
            Ok(None)
        }
    }

    /// Copy an RGB24 ffmpeg frame into a tightly packed pixel buffer,
    /// honoring the stride padding ffmpeg may add per row.
    fn rgb_frame_to_pixels(rgb: &ffmpeg::frame::Video) -> Result<Frame> {
        let width = rgb.width();
        let height = rgb.height();
        let stride = rgb.stride(0);
        let data = rgb.data(0);
        let row_bytes = (width * 3) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            pixels.extend_from_slice(&data[start..start + row_bytes]);
        }
        Frame::new(pixels, width, height)
    }
}

// ----------------------------------------------------------------------------
// Bulk frame extraction
// ----------------------------------------------------------------------------

/// Extract sampled frames from a video to `out_dir` as
/// `{prefix}{index:06}.jpg`. Returns the number written.
pub fn bulk_extract(
    input: &str,
    out_dir: &Path,
    prefix: &str,
    jpeg_quality: u8,
    sample_fps: f64,
    max_frames: usize,
) -> Result<usize> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let mut source = VideoSource::open(input)?;
    let plan = video_sample_plan(source.total_frames(), sample_fps, source.fps());

    let bar = ProgressBar::new(plan.max_samples.min(max_frames) as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} extract [{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut extracted = 0usize;
    let mut consecutive_failures = 0u32;
    loop {
        let (idx, frame) = match source.next_frame() {
            Ok(Some(item)) => {
                consecutive_failures = 0;
                item
            }
            Ok(None) => break,
            Err(e) => {
                consecutive_failures += 1;
                log::error!("extraction decode failed: {e:#}");
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    bail!("extraction aborted after {consecutive_failures} consecutive failures");
                }
                continue;
            }
        };
        if idx % plan.stepsize != 0 {
            continue;
        }
        let path = out_dir.join(format!("{prefix}{idx:06}.jpg"));
        write_jpeg(&path, &frame, jpeg_quality)?;
        extracted += 1;
        bar.inc(1);
        if extracted >= plan.max_samples || extracted >= max_frames {
            break;
        }
    }
    bar.finish_with_message(format!("{extracted} frames"));
    log::info!("bulk extraction complete: {extracted} frames to {}", out_dir.display());
    Ok(extracted)
}

fn write_jpeg(path: &Path, frame: &Frame, quality: u8) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
        std::io::BufWriter::new(file),
        quality.clamp(1, 100),
    );
    encoder
        .encode(
            frame.pixels(),
            frame.width(),
            frame.height(),
            image::ExtendedColorType::Rgb8,
        )
        .with_context(|| format!("JPEG encode failed for {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_distinguishes_input_kinds() {
        assert_eq!(probe_input("stub://"), InputKind::Synthetic);
        assert_eq!(probe_input("/no/such/path.mp4"), InputKind::Missing);
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            probe_input(dir.path().to_str().unwrap()),
            InputKind::ImageDirectory
        );
        let video = dir.path().join("a.MP4");
        fs::write(&video, b"x").unwrap();
        assert_eq!(probe_input(video.to_str().unwrap()), InputKind::VideoFile);
        let image = dir.path().join("b.jpg");
        fs::write(&image, b"x").unwrap();
        assert_eq!(probe_input(image.to_str().unwrap()), InputKind::ImageFile);
        let other = dir.path().join("c.txt");
        fs::write(&other, b"x").unwrap();
        assert_eq!(probe_input(other.to_str().unwrap()), InputKind::Unknown);
    }

    #[test]
    fn image_stepsize_honors_rate_and_fallbacks() {
        assert_eq!(image_stepsize(1000, 20), 6);
        assert_eq!(image_stepsize(1000, 100), 2);
        // Out-of-range rates use count-based defaults.
        assert_eq!(image_stepsize(300, 0), 5);
        assert_eq!(image_stepsize(800, 0), 10);
        assert_eq!(image_stepsize(5000, 101), 50);
    }

    #[test]
    fn long_videos_are_capped_by_tier() {
        let plan = video_sample_plan(60_000, 0.0, 30.0);
        assert_eq!(plan.max_samples, 600);
        assert!(plan.stepsize >= 100);

        let plan = video_sample_plan(5_000, 0.0, 30.0);
        assert_eq!(plan.max_samples, 251);

        let plan = video_sample_plan(2_000, 0.0, 30.0);
        assert_eq!(plan.max_samples, 41);

        let plan = video_sample_plan(100, 0.0, 30.0);
        assert_eq!(plan.max_samples, 100);
        assert_eq!(plan.stepsize, 1);
    }

    #[test]
    fn sample_fps_widens_the_step() {
        // 30 fps video sampled at 1 fps steps every 30 frames.
        let plan = video_sample_plan(100, 1.0, 30.0);
        assert_eq!(plan.stepsize, 30);
    }

    #[test]
    fn synthetic_source_yields_the_declared_count() {
        let mut source = VideoSource::open("stub://32x24@5").unwrap();
        assert_eq!(source.total_frames(), 5);
        let mut count = 0;
        while let Some((idx, frame)) = source.next_frame().unwrap() {
            assert_eq!(idx, count);
            assert_eq!(frame.width(), 32);
            assert_eq!(frame.height(), 24);
            count += 1;
        }
        assert_eq!(count, 5);
    }

    #[test]
    fn synthetic_spec_defaults() {
        let source = VideoSource::open("stub://").unwrap();
        assert_eq!(source.total_frames(), 300);
        assert!((source.fps() - 25.0).abs() < 1e-9);
    }
}
