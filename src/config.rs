//! Runtime configuration for the vision and judger stages.
//!
//! Settings come from an optional JSON config file, then `SEATWATCH_*`
//! environment overrides, then validation. Defaults run the full
//! pipeline against the synthetic stub source with no file at all.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::classify::ClassifierConfig;
use crate::judger::JudgerConfig;
use crate::snapshot::SnapshotPolicy;

const DEFAULT_SEATS_PATH: &str = "config/seats.json";
const DEFAULT_MODEL_PATH: &str = "weights/detector.onnx";
const DEFAULT_OUT_DIR: &str = "out";
const DEFAULT_LATEST_FRAME_FILE: &str = "out/last_frame.jsonl";
const DEFAULT_SNAPSHOT_DIR: &str = "cache/snap";
const DEFAULT_DB_PATH: &str = "seatwatch.db";
const DEFAULT_INPUT_SIZE: u32 = 640;

#[derive(Debug, Deserialize, Default)]
struct VisionConfigFile {
    seats_path: Option<String>,
    model_path: Option<String>,
    object_model_path: Option<String>,
    input_size: Option<u32>,
    out_dir: Option<String>,
    latest_frame_file: Option<String>,
    snapshot_dir: Option<String>,
    sample_fps: Option<f64>,
    sample_fp100: Option<u32>,
    max_frames: Option<usize>,
    classifier: Option<ClassifierConfig>,
    snapshot: Option<SnapshotPolicy>,
}

/// Settings for the vision stage (`visiond`).
#[derive(Debug, Clone)]
pub struct VisionSettings {
    pub seats_path: String,
    pub model_path: String,
    /// Second model for the legacy two-model strategy; empty selects
    /// the single multiclass model.
    pub object_model_path: String,
    pub input_size: u32,
    pub out_dir: PathBuf,
    pub latest_frame_file: PathBuf,
    pub snapshot_dir: PathBuf,
    pub sample_fps: f64,
    pub sample_fp100: u32,
    pub max_frames: usize,
    pub classifier: ClassifierConfig,
    pub snapshot: SnapshotPolicy,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            seats_path: DEFAULT_SEATS_PATH.to_string(),
            model_path: DEFAULT_MODEL_PATH.to_string(),
            object_model_path: String::new(),
            input_size: DEFAULT_INPUT_SIZE,
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            latest_frame_file: PathBuf::from(DEFAULT_LATEST_FRAME_FILE),
            snapshot_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
            sample_fps: 1.0,
            sample_fp100: 20,
            max_frames: 10_000,
            classifier: ClassifierConfig::default(),
            snapshot: SnapshotPolicy::default(),
        }
    }
}

impl VisionSettings {
    /// Load from `SEATWATCH_VISION_CONFIG` (if set), then apply env
    /// overrides and validate.
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var("SEATWATCH_VISION_CONFIG").ok().as_deref() {
            Some(path) if !path.trim().is_empty() => read_config_file(Path::new(path))?,
            _ => VisionConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VisionConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            seats_path: file.seats_path.unwrap_or(defaults.seats_path),
            model_path: file.model_path.unwrap_or(defaults.model_path),
            object_model_path: file.object_model_path.unwrap_or_default(),
            input_size: file.input_size.unwrap_or(defaults.input_size),
            out_dir: file.out_dir.map(PathBuf::from).unwrap_or(defaults.out_dir),
            latest_frame_file: file
                .latest_frame_file
                .map(PathBuf::from)
                .unwrap_or(defaults.latest_frame_file),
            snapshot_dir: file
                .snapshot_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_dir),
            sample_fps: file.sample_fps.unwrap_or(defaults.sample_fps),
            sample_fp100: file.sample_fp100.unwrap_or(defaults.sample_fp100),
            max_frames: file.max_frames.unwrap_or(defaults.max_frames),
            classifier: file.classifier.unwrap_or_default(),
            snapshot: file.snapshot.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("SEATWATCH_SEATS_PATH") {
            if !path.trim().is_empty() {
                self.seats_path = path;
            }
        }
        if let Ok(path) = std::env::var("SEATWATCH_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model_path = path;
            }
        }
        if let Ok(dir) = std::env::var("SEATWATCH_OUT_DIR") {
            if !dir.trim().is_empty() {
                self.out_dir = PathBuf::from(dir);
            }
        }
        if let Ok(fps) = std::env::var("SEATWATCH_SAMPLE_FPS") {
            self.sample_fps = fps
                .parse()
                .map_err(|_| anyhow!("SEATWATCH_SAMPLE_FPS must be a number"))?;
        }
        if let Ok(max) = std::env::var("SEATWATCH_MAX_FRAMES") {
            self.max_frames = max
                .parse()
                .map_err(|_| anyhow!("SEATWATCH_MAX_FRAMES must be an integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(anyhow!("input_size must be greater than zero"));
        }
        for (name, v) in [
            ("conf_thres_person", self.classifier.conf_thres_person),
            ("conf_thres_person_low", self.classifier.conf_thres_person_low),
            ("conf_thres_object", self.classifier.conf_thres_object),
            ("nms_iou", self.classifier.nms_iou),
            ("iou_seat_intersect", self.classifier.iou_seat_intersect),
            ("fg_ratio_thres", self.classifier.fg_ratio_thres),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(anyhow!("{name} must be within 0..=1, got {v}"));
            }
        }
        if self.classifier.conf_thres_person_low > self.classifier.conf_thres_person {
            return Err(anyhow!(
                "conf_thres_person_low must not exceed conf_thres_person"
            ));
        }
        if self.snapshot.min_interval_ms < 0 || self.snapshot.heartbeat_ms < 0 {
            return Err(anyhow!("snapshot intervals must be non-negative"));
        }
        if self.max_frames == 0 {
            return Err(anyhow!("max_frames must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Default)]
struct JudgerConfigFile {
    record_dir: Option<String>,
    db_path: Option<String>,
    anomaly_threshold_secs: Option<i64>,
    poll_interval_ms: Option<u64>,
}

/// Settings for the judger stage (`judgerd`).
#[derive(Debug, Clone)]
pub struct JudgerSettings {
    pub record_dir: PathBuf,
    pub db_path: String,
    pub judger: JudgerConfig,
}

impl Default for JudgerSettings {
    fn default() -> Self {
        Self {
            record_dir: PathBuf::from(DEFAULT_OUT_DIR),
            db_path: DEFAULT_DB_PATH.to_string(),
            judger: JudgerConfig::default(),
        }
    }
}

impl JudgerSettings {
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var("SEATWATCH_JUDGER_CONFIG").ok().as_deref() {
            Some(path) if !path.trim().is_empty() => read_judger_file(Path::new(path))?,
            _ => JudgerConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: JudgerConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            record_dir: file
                .record_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.record_dir),
            db_path: file.db_path.unwrap_or(defaults.db_path),
            judger: JudgerConfig {
                anomaly_threshold_secs: file
                    .anomaly_threshold_secs
                    .unwrap_or(defaults.judger.anomaly_threshold_secs),
                poll_interval_ms: file
                    .poll_interval_ms
                    .unwrap_or(defaults.judger.poll_interval_ms),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("SEATWATCH_RECORD_DIR") {
            if !dir.trim().is_empty() {
                self.record_dir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = std::env::var("SEATWATCH_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(secs) = std::env::var("SEATWATCH_ANOMALY_SECS") {
            self.judger.anomaly_threshold_secs = secs
                .parse()
                .map_err(|_| anyhow!("SEATWATCH_ANOMALY_SECS must be an integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.judger.anomaly_threshold_secs <= 0 {
            return Err(anyhow!("anomaly_threshold_secs must be positive"));
        }
        if self.judger.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be positive"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<VisionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {e}", path.display()))
}

fn read_judger_file(path: &Path) -> Result<JudgerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = VisionSettings::default();
        assert!(cfg.validate().is_ok());
        let cfg = JudgerSettings::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn threshold_ordering_is_enforced() {
        let mut cfg = VisionSettings::default();
        cfg.classifier.conf_thres_person_low = 0.9;
        cfg.classifier.conf_thres_person = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut cfg = VisionSettings::default();
        cfg.classifier.nms_iou = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_anomaly_threshold_is_rejected() {
        let mut cfg = JudgerSettings::default();
        cfg.judger.anomaly_threshold_secs = 0;
        assert!(cfg.validate().is_err());
    }
}
