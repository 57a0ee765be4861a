//! visiond - the vision stage daemon
//!
//! Samples frames from a video file, image directory, single image, or
//! the synthetic stub source, runs the occupancy classifier, and writes
//! one JSON record line per processed frame for judgerd to consume.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use seatwatch_kernel::classify::FrameClassifier;
use seatwatch_kernel::config::VisionSettings;
use seatwatch_kernel::detect::DetectorBackend;
use seatwatch_kernel::driver::{DriverConfig, IngestDriver};
use seatwatch_kernel::{SeatRegistry, Snapshotter};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file, image file, image directory, or stub:// source.
    #[arg(long, env = "SEATWATCH_INPUT")]
    input: String,
    /// JSON config file; falls back to SEATWATCH_VISION_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seat descriptor path, overriding the config file.
    #[arg(long)]
    seats: Option<String>,
    /// Record output directory, overriding the config file.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Sampling rate in frames per second for video inputs.
    #[arg(long)]
    sample_fps: Option<f64>,
    /// Stop after this many processed frames.
    #[arg(long)]
    max_frames: Option<usize>,
    /// Disable snapshot artifacts entirely.
    #[arg(long, default_value_t = false)]
    no_snapshots: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => VisionSettings::load_from(path)?,
        None => VisionSettings::load()?,
    };
    if let Some(seats) = args.seats {
        settings.seats_path = seats;
    }
    if let Some(out_dir) = args.out_dir {
        settings.latest_frame_file = out_dir.join("last_frame.jsonl");
        settings.out_dir = out_dir;
    }
    if let Some(fps) = args.sample_fps {
        settings.sample_fps = fps;
    }
    if let Some(max) = args.max_frames {
        settings.max_frames = max;
    }

    let seats = SeatRegistry::load(&settings.seats_path);
    log::info!(
        "loaded {} seats from {}",
        seats.len(),
        settings.seats_path
    );

    let detector = make_detector(&settings);
    log::info!(
        "detector backend: {} (ready={})",
        detector.name(),
        detector.is_ready()
    );

    let snapshotter = if args.no_snapshots {
        None
    } else {
        Some(Snapshotter::new(&settings.snapshot_dir, settings.snapshot)?)
    };

    let classifier = FrameClassifier::new(
        settings.classifier.clone(),
        seats,
        detector,
        snapshotter,
    );

    let driver_cfg = DriverConfig {
        input: args.input,
        out_dir: settings.out_dir.clone(),
        latest_frame_file: settings.latest_frame_file.clone(),
        sample_fps: settings.sample_fps,
        sample_fp100: settings.sample_fp100,
        max_frames: settings.max_frames,
        ..DriverConfig::default()
    };
    let mut driver = IngestDriver::new(driver_cfg, classifier)?;
    let processed = driver.run()?;
    log::info!("visiond finished: {processed} frames processed");
    Ok(())
}

#[cfg(feature = "backend-tract")]
fn make_detector(settings: &VisionSettings) -> Box<dyn DetectorBackend> {
    use seatwatch_kernel::detect::TractDetector;

    // The adapter-stage filter is looser than the seat thresholds.
    let conf = settings.classifier.conf_thres_object.min(0.25);
    if settings.object_model_path.is_empty() {
        Box::new(TractDetector::single(
            &settings.model_path,
            settings.input_size,
            conf,
        ))
    } else {
        Box::new(TractDetector::person_and_object(
            &settings.model_path,
            &settings.object_model_path,
            settings.input_size,
            conf,
        ))
    }
}

#[cfg(not(feature = "backend-tract"))]
fn make_detector(settings: &VisionSettings) -> Box<dyn DetectorBackend> {
    log::warn!("built without backend-tract; using the stub detector");
    Box::new(seatwatch_kernel::StubDetector::new(settings.input_size, 0))
}
