//! Seatwatch Kernel
//!
//! This crate implements the core pipeline for camera-based seat occupancy
//! monitoring: a per-frame vision stage that classifies each seat from
//! detector output, a background-motion signal, and seat geometry, and an
//! independent temporal judger stage that turns the noisy per-frame stream
//! into durable seat statuses, transition events, and unattended-object
//! alerts.
//!
//! # Architecture
//!
//! The two stages are decoupled by a file boundary, never shared memory:
//!
//! 1. `visiond` samples frames from a video or image-directory source,
//!    runs the classifier, and appends one JSON line per processed frame.
//! 2. `judgerd` polls the record directory, consumes each file exactly
//!    once, and maintains per-seat state machines with hysteresis.
//!
//! This lets the slow, model-bound vision stage and the fast, policy-bound
//! judger stage fail, restart, and scale independently.
//!
//! # Module Structure
//!
//! - `geometry`, `nms`: rectangle/polygon primitives and box suppression
//! - `motion`: adaptive background model and foreground ratios
//! - `detect`: detector backends (stub, tract-onnx) behind one trait
//! - `seats`: seat descriptor registry
//! - `classify`: the per-frame occupancy classifier
//! - `snapshot`: image-artifact throttling
//! - `driver`: frame ingestion and record serialization
//! - `judger`: the temporal state machine and its persistence sinks

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};

pub mod classify;
pub mod config;
pub mod detect;
pub mod driver;
pub mod frame;
pub mod geometry;
pub mod judger;
pub mod motion;
pub mod nms;
pub mod records;
pub mod seats;
pub mod snapshot;

pub use classify::{occupancy_from_evidence, FrameClassifier};
pub use detect::{DetectionBox, DetectorBackend, RawDetection, StubDetector};
pub use frame::Frame;
pub use judger::{Alert, SeatDurableState, SeatEvent, SeatSnapshotRecord, SeatStateJudger};
pub use motion::BackgroundModel;
pub use seats::{SeatDefinition, SeatRegistry};
pub use snapshot::{SnapshotPolicy, Snapshotter};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> Result<i64> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(elapsed.as_millis() as i64)
}

// -------------------- Occupancy States --------------------

/// Per-frame, per-seat visual classification produced by the vision stage.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccupancyState {
    Free,
    Person,
    ObjectOnly,
    PersonAndObject,
    #[default]
    Unknown,
}

impl OccupancyState {
    /// Stable small integer used in the snapshot state hash.
    pub fn ordinal(self) -> i32 {
        match self {
            OccupancyState::Free => 0,
            OccupancyState::Person => 1,
            OccupancyState::ObjectOnly => 2,
            OccupancyState::PersonAndObject => 3,
            OccupancyState::Unknown => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OccupancyState::Free => "FREE",
            OccupancyState::Person => "PERSON",
            OccupancyState::ObjectOnly => "OBJECT_ONLY",
            OccupancyState::PersonAndObject => "PERSON_AND_OBJECT",
            OccupancyState::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for OccupancyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable, hysteresis-protected seat status maintained by the judger.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SeatStatus {
    #[default]
    Unseated,
    Seated,
    Anomaly,
}

impl SeatStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SeatStatus::Unseated => "Unseated",
            SeatStatus::Seated => "Seated",
            SeatStatus::Anomaly => "Anomaly",
        }
    }
}

impl std::fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// -------------------- Frame Snapshots --------------------

/// One seat's classification for one processed frame.
///
/// Produced by the classifier, consumed by the snapshot throttler and
/// serialized into the driver's record stream. Never mutated after
/// creation. Every known seat gets exactly one snapshot per processed
/// frame, so the judger always sees a gap-free per-seat time series.
#[derive(Clone, Debug, Default)]
pub struct SeatFrameSnapshot {
    pub seat_id: i32,
    pub ts_ms: i64,
    pub frame_index: i64,

    pub has_person: bool,
    pub has_object: bool,

    /// Highest person confidence among boxes assigned to this seat.
    pub person_conf_max: f32,
    /// Highest allow-listed object confidence among assigned boxes.
    pub object_conf_max: f32,
    /// Fraction of the seat region flagged foreground by the background
    /// model, 0..=1.
    pub fg_ratio: f32,

    pub person_count: u32,
    pub object_count: u32,

    pub occupancy_state: OccupancyState,

    pub seat_roi: Rect,
    pub seat_poly: Vec<Point>,
    pub person_boxes: Vec<DetectionBox>,
    pub object_boxes: Vec<DetectionBox>,

    /// Set when this frame triggered an image artifact for the seat.
    pub snapshot_path: Option<String>,

    pub t_pre_ms: i32,
    pub t_inf_ms: i32,
    pub t_post_ms: i32,
}
