//! Serialized wire records crossing the vision/judger file boundary.
//!
//! One `FrameRecord` per processed frame, written as a single JSON line.
//! The judger parses these back independently, so field names here are a
//! wire contract, not an implementation detail.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::{OccupancyState, SeatFrameSnapshot};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoxRecord {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub conf: f32,
    pub cls_id: i32,
    pub cls_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeatRecord {
    pub seat_id: i32,
    pub ts_ms: i64,
    pub frame_index: i64,
    pub has_person: bool,
    pub has_object: bool,
    pub person_conf: f32,
    pub object_conf: f32,
    pub fg_ratio: f32,
    pub person_count: u32,
    pub object_count: u32,
    pub occupancy_state: OccupancyState,
    #[serde(default)]
    pub snapshot_path: String,
    pub seat_roi: Rect,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seat_poly: Vec<[i32; 2]>,
    #[serde(default)]
    pub person_boxes: Vec<BoxRecord>,
    #[serde(default)]
    pub object_boxes: Vec<BoxRecord>,
    #[serde(default)]
    pub t_pre_ms: i32,
    #[serde(default)]
    pub t_inf_ms: i32,
    #[serde(default)]
    pub t_post_ms: i32,
}

/// One processed frame: the line-level envelope around the seat entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameRecord {
    pub ts_ms: i64,
    pub frame_index: i64,
    pub image_path: String,
    #[serde(default)]
    pub annotated_path: String,
    pub seats: Vec<SeatRecord>,
}

impl FrameRecord {
    pub fn from_snapshots(
        snapshots: &[SeatFrameSnapshot],
        ts_ms: i64,
        frame_index: i64,
        image_path: &str,
    ) -> Self {
        Self {
            ts_ms,
            frame_index,
            image_path: image_path.to_string(),
            annotated_path: String::new(),
            seats: snapshots.iter().map(SeatRecord::from_snapshot).collect(),
        }
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

impl SeatRecord {
    pub fn from_snapshot(snap: &SeatFrameSnapshot) -> Self {
        Self {
            seat_id: snap.seat_id,
            ts_ms: snap.ts_ms,
            frame_index: snap.frame_index,
            has_person: snap.has_person,
            has_object: snap.has_object,
            person_conf: snap.person_conf_max,
            object_conf: snap.object_conf_max,
            fg_ratio: snap.fg_ratio,
            person_count: snap.person_count,
            object_count: snap.object_count,
            occupancy_state: snap.occupancy_state,
            snapshot_path: snap.snapshot_path.clone().unwrap_or_default(),
            seat_roi: snap.seat_roi,
            seat_poly: snap.seat_poly.iter().map(|p| [p.x, p.y]).collect(),
            person_boxes: snap.person_boxes.iter().map(box_record).collect(),
            object_boxes: snap.object_boxes.iter().map(box_record).collect(),
            t_pre_ms: snap.t_pre_ms,
            t_inf_ms: snap.t_inf_ms,
            t_post_ms: snap.t_post_ms,
        }
    }
}

fn box_record(b: &crate::detect::DetectionBox) -> BoxRecord {
    BoxRecord {
        x: b.rect.x,
        y: b.rect.y,
        w: b.rect.w,
        h: b.rect.h,
        conf: b.conf,
        cls_id: b.cls_id,
        cls_name: b.cls_name.clone(),
    }
}

/// Frame record filenames are the zero-padded frame index, one file per
/// frame, so the judger can track consumption at file granularity.
pub fn frame_record_filename(frame_index: i64) -> String {
    format!("{frame_index:06}.jsonl")
}
