//! Snapshot throttling and image artifact output.
//!
//! Bounds I/O under rapid occupancy flicker: a seat only earns a new
//! JPEG when its state hash changes or a heartbeat interval elapses,
//! and never faster than the minimum inter-snapshot interval. The very
//! first observation of a seat always produces one.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};

use crate::frame::Frame;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SnapshotPolicy {
    /// Floor between two snapshots of the same seat; always applies
    /// after the first one.
    pub min_interval_ms: i64,
    /// Periodic proof-of-state snapshot even without a change. Zero
    /// disables the heartbeat.
    pub heartbeat_ms: i64,
    /// When set, an unchanged state hash produces nothing (heartbeat
    /// aside). When clear, the min interval alone gates output.
    pub on_change_only: bool,
    pub jpg_quality: u8,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            min_interval_ms: 2_000,
            heartbeat_ms: 60_000,
            on_change_only: true,
            jpg_quality: 85,
        }
    }
}

struct SeatSnapState {
    last_ts_ms: i64,
    last_state_hash: i32,
}

pub struct Snapshotter {
    dir: PathBuf,
    policy: SnapshotPolicy,
    per_seat: HashMap<i32, SeatSnapState>,
}

impl Snapshotter {
    pub fn new<P: AsRef<Path>>(dir: P, policy: SnapshotPolicy) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create snapshot dir {}", dir.display()))?;
        Ok(Self {
            dir,
            policy,
            per_seat: HashMap::new(),
        })
    }

    /// Whether the policy would emit a snapshot now, without touching
    /// the throttle state.
    pub fn due(&self, seat_id: i32, state_hash: i32, ts_ms: i64) -> bool {
        let Some(prev) = self.per_seat.get(&seat_id) else {
            return true;
        };
        let elapsed = ts_ms - prev.last_ts_ms;
        if elapsed < self.policy.min_interval_ms {
            return false;
        }
        if !self.policy.on_change_only {
            return true;
        }
        let changed = state_hash != prev.last_state_hash;
        let heartbeat = self.policy.heartbeat_ms > 0 && elapsed >= self.policy.heartbeat_ms;
        changed || heartbeat
    }

    /// Save a JPEG of `frame` for this seat if the policy allows it.
    /// Returns the written path, or `None` when throttled. An encoding
    /// failure is logged and reported as `None`; it does not advance
    /// the throttle state.
    pub fn maybe_save(
        &mut self,
        seat_id: i32,
        state_hash: i32,
        ts_ms: i64,
        frame: &Frame,
    ) -> Option<String> {
        if !self.due(seat_id, state_hash, ts_ms) {
            return None;
        }
        let path = self.dir.join(format!("seat_{seat_id}_{ts_ms}.jpg"));
        if let Err(e) = self.write_jpeg(&path, frame) {
            log::warn!("snapshot write failed for seat {seat_id}: {e:#}");
            return None;
        }
        self.per_seat.insert(
            seat_id,
            SeatSnapState {
                last_ts_ms: ts_ms,
                last_state_hash: state_hash,
            },
        );
        Some(path.to_string_lossy().into_owned())
    }

    fn write_jpeg(&self, path: &Path, frame: &Frame) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut encoder =
            JpegEncoder::new_with_quality(BufWriter::new(file), self.policy.jpg_quality);
        encoder
            .encode(
                frame.pixels(),
                frame.width(),
                frame.height(),
                image::ExtendedColorType::Rgb8,
            )
            .context("JPEG encode failed")
    }
}

/// Cheap combination of the occupancy fields used to detect a visual
/// state change worth a new artifact.
pub fn state_hash(occupancy_ordinal: i32, person_count: u32, object_count: u32) -> i32 {
    occupancy_ordinal * 100 + person_count as i32 * 10 + object_count as i32
}
