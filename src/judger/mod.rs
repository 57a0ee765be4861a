//! Temporal seat state judger.
//!
//! Consumes the per-frame record files the vision stage writes and
//! maintains one durable state machine per seat: `Unseated`, `Seated`,
//! or `Anomaly` once a seat has been object-occupied past the
//! configured threshold. The two stages share nothing but the record
//! directory; the judger polls it and consumes each file exactly once.
//!
//! The hysteresis rules:
//! - a person sighting resets the seat's anomaly accumulator,
//! - object-only records accumulate clamped inter-record deltas,
//! - crossing the threshold flips to `Anomaly` and emits an alert,
//!   and accumulation keeps growing while the condition holds.

pub mod sink;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::records::{FrameRecord, SeatRecord};
use crate::SeatStatus;

pub use sink::{InMemoryJudgerSink, JudgerSink, SqliteJudgerSink};

/// Largest per-record time increment. A stale or out-of-order
/// timestamp can therefore inflate a duration by at most this much.
const MAX_STEP_SECS: i64 = 5;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgerConfig {
    /// Seconds of accumulated object-only occupancy before a seat is
    /// judged anomalous.
    pub anomaly_threshold_secs: i64,
    /// Directory poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for JudgerConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold_secs: 120,
            poll_interval_ms: 2_000,
        }
    }
}

/// Durable per-seat state. Created on the first record seen for a seat
/// id and kept for the process lifetime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeatDurableState {
    pub seat_id: String,
    pub status: SeatStatus,
    /// Seconds since the current status began, including the frame gap
    /// that caused the transition.
    pub status_duration_sec: i64,
    pub confidence: f32,
    pub timestamp: String,
    pub source_frame_id: i64,
}

/// Emitted on a status change or alongside an alert; never stored by
/// the judger itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeatEvent {
    pub seat_id: String,
    pub state: String,
    pub timestamp: String,
    pub duration_sec: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub seat_id: String,
    pub alert_type: String,
    pub alert_desc: String,
    pub timestamp: String,
    /// Cleared by the downstream consumer, never by the judger.
    pub is_processed: bool,
}

/// Unconditional per-record telemetry row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeatSnapshotRecord {
    pub seat_id: String,
    pub state: String,
    pub person_count: u32,
    pub timestamp: String,
}

/// Everything one record produces.
#[derive(Clone, Debug)]
pub struct StepOutput {
    pub state: SeatDurableState,
    pub event: Option<SeatEvent>,
    pub alerts: Vec<Alert>,
    pub snapshot: SeatSnapshotRecord,
}

struct SeatMemory {
    last_ts_ms: i64,
    last_status: SeatStatus,
    last_duration_sec: i64,
    anomaly_accum_sec: i64,
}

pub struct SeatStateJudger {
    cfg: JudgerConfig,
    seats: HashMap<String, SeatMemory>,
    states: HashMap<String, SeatDurableState>,
    processed_files: HashSet<String>,
    frames_flagged: u64,
}

/// Seat ids are prefixed with `S` on the wire to downstream consumers.
pub fn normalize_seat_id(raw: &str) -> String {
    if raw.is_empty() {
        return "S0".to_string();
    }
    if raw.starts_with('S') {
        raw.to_string()
    } else {
        format!("S{raw}")
    }
}

fn ms_to_timestamp(ts_ms: i64) -> String {
    match Local.timestamp_millis_opt(ts_ms) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
            dt.format("%Y-%m-%d %H:%M:%S").to_string()
        }
        chrono::LocalResult::None => "1970-01-01 00:00:00".to_string(),
    }
}

impl SeatStateJudger {
    pub fn new(cfg: JudgerConfig) -> Self {
        Self {
            cfg,
            seats: HashMap::new(),
            states: HashMap::new(),
            processed_files: HashSet::new(),
            frames_flagged: 0,
        }
    }

    pub fn state_of(&self, seat_id: &str) -> Option<&SeatDurableState> {
        self.states.get(seat_id)
    }

    /// Frames whose records produced an event, an alert, or any seat in
    /// a non-Unseated status. Downstream retention uses this to decide
    /// which source frames are worth keeping.
    pub fn frames_flagged(&self) -> u64 {
        self.frames_flagged
    }

    pub fn seat_count(&self) -> usize {
        self.states.len()
    }

    /// Advance one seat's state machine by one record.
    pub fn step(&mut self, record: &SeatRecord) -> StepOutput {
        let seat_id = normalize_seat_id(&record.seat_id.to_string());
        let timestamp = ms_to_timestamp(record.ts_ms);

        let memory = self.seats.entry(seat_id.clone()).or_insert(SeatMemory {
            last_ts_ms: 0,
            last_status: SeatStatus::Unseated,
            last_duration_sec: 0,
            anomaly_accum_sec: 0,
        });
        let first_sighting = memory.last_ts_ms == 0;

        // Clamped inter-record delta in seconds.
        let mut dt_sec = 0i64;
        if !first_sighting && record.ts_ms > 0 {
            dt_sec = ((record.ts_ms - memory.last_ts_ms) / 1000).max(0);
        }
        dt_sec = dt_sec.min(MAX_STEP_SECS);

        let has_person =
            record.occupancy_state == crate::OccupancyState::Person || record.person_count > 0;
        let has_object_only = record.occupancy_state == crate::OccupancyState::ObjectOnly
            || (record.object_count > 0 && record.person_count == 0);

        let mut confidence = 0.90f32;
        let mut alerts = Vec::new();
        let status = if has_person {
            memory.anomaly_accum_sec = 0;
            confidence = if record.person_conf > 0.0 {
                record.person_conf
            } else {
                0.95
            };
            SeatStatus::Seated
        } else if has_object_only {
            memory.anomaly_accum_sec += dt_sec;
            if memory.anomaly_accum_sec >= self.cfg.anomaly_threshold_secs {
                confidence = if record.object_conf > 0.0 {
                    record.object_conf
                } else {
                    0.85
                };
                alerts.push(Alert {
                    alert_id: format!("{seat_id}_{timestamp}"),
                    seat_id: seat_id.clone(),
                    alert_type: "AnomalyOccupied".to_string(),
                    alert_desc: format!(
                        "Seat occupied by object for {} seconds",
                        memory.anomaly_accum_sec
                    ),
                    timestamp: timestamp.clone(),
                    is_processed: false,
                });
                SeatStatus::Anomaly
            } else {
                SeatStatus::Unseated
            }
        } else {
            // FREE and UNKNOWN both read as "no evidence".
            memory.anomaly_accum_sec = 0;
            SeatStatus::Unseated
        };

        // Duration carries across same-status records and resets to the
        // gap delta (not zero) on a transition. Entering Anomaly is the
        // exception: the anomalous occupancy began when accumulation
        // started, so the full accumulator is reported.
        let status_changed = first_sighting || memory.last_status != status;
        let duration_sec = if !status_changed {
            memory.last_duration_sec + dt_sec
        } else if status == SeatStatus::Anomaly {
            memory.anomaly_accum_sec
        } else {
            dt_sec
        };

        memory.last_ts_ms = record.ts_ms;
        memory.last_status = status;
        memory.last_duration_sec = duration_sec;

        let state = SeatDurableState {
            seat_id: seat_id.clone(),
            status,
            status_duration_sec: duration_sec,
            confidence,
            timestamp: timestamp.clone(),
            source_frame_id: record.frame_index,
        };
        self.states.insert(seat_id.clone(), state.clone());

        let event = if status_changed || !alerts.is_empty() {
            Some(SeatEvent {
                seat_id: seat_id.clone(),
                state: status.as_str().to_string(),
                timestamp: timestamp.clone(),
                duration_sec,
            })
        } else {
            None
        };

        let snapshot = SeatSnapshotRecord {
            seat_id,
            state: status.as_str().to_string(),
            person_count: record.person_count,
            timestamp,
        };

        StepOutput {
            state,
            event,
            alerts,
            snapshot,
        }
    }

    /// Process every record line in one file, writing outputs to the
    /// sink. Sink failures are logged and do not stop the loop; the
    /// in-memory state still advances.
    pub fn process_file(&mut self, path: &Path, sink: &mut dyn JudgerSink) -> Result<usize> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut processed = 0usize;
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let record = match FrameRecord::from_json_line(line) {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("skipping malformed record line in {}: {e}", path.display());
                    continue;
                }
            };
            let mut flagged = false;
            for seat in &record.seats {
                let out = self.step(seat);
                flagged |= out.event.is_some()
                    || !out.alerts.is_empty()
                    || out.state.status != SeatStatus::Unseated;
                log::info!(
                    "seat {} : {} dur={} conf={:.2}",
                    out.state.seat_id,
                    out.state.status,
                    out.state.status_duration_sec,
                    out.state.confidence
                );
                if let Some(event) = &out.event {
                    if let Err(e) = sink.insert_event(event) {
                        log::error!("event insert failed for {}: {e:#}", event.seat_id);
                    }
                }
                if let Err(e) = sink.insert_snapshot(&out.snapshot) {
                    log::error!("snapshot insert failed for {}: {e:#}", out.snapshot.seat_id);
                }
                for alert in &out.alerts {
                    log::warn!("alert {}: {}", alert.alert_id, alert.alert_desc);
                    if let Err(e) = sink.insert_alert(alert) {
                        log::error!("alert insert failed for {}: {e:#}", alert.alert_id);
                    }
                }
            }
            if flagged {
                self.frames_flagged += 1;
            }
            processed += 1;
        }
        Ok(processed)
    }

    /// Poll `dir` for new `.jsonl` files until `running` clears.
    /// Each file is consumed exactly once, keyed by filename; a file
    /// that fails to read is marked consumed so it cannot wedge the
    /// loop.
    pub fn run(
        &mut self,
        dir: &Path,
        sink: &mut dyn JudgerSink,
        running: Arc<AtomicBool>,
    ) -> Result<()> {
        if !dir.is_dir() {
            anyhow::bail!("record directory does not exist: {}", dir.display());
        }
        log::info!("judger watching {}", dir.display());
        let poll = Duration::from_millis(self.cfg.poll_interval_ms);
        while running.load(Ordering::SeqCst) {
            self.poll_once(dir, sink)?;
            std::thread::sleep(poll);
        }
        log::info!("judger stopping");
        Ok(())
    }

    /// One polling pass over the record directory.
    pub fn poll_once(&mut self, dir: &Path, sink: &mut dyn JudgerSink) -> Result<usize> {
        let mut entries: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file() && p.extension().map(|e| e == "jsonl").unwrap_or(false)
            })
            .collect();
        entries.sort();

        let mut total = 0usize;
        for path in entries {
            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if self.processed_files.contains(&filename) {
                continue;
            }
            log::debug!("new record file: {filename}");
            match self.process_file(&path, sink) {
                Ok(count) => total += count,
                Err(e) => log::error!("failed to process {filename}: {e:#}"),
            }
            self.processed_files.insert(filename);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::OccupancyState;

    fn record(seat_id: i32, ts_ms: i64, occupancy: OccupancyState) -> SeatRecord {
        let (person_count, object_count) = match occupancy {
            OccupancyState::Person => (1, 0),
            OccupancyState::ObjectOnly => (0, 1),
            _ => (0, 0),
        };
        SeatRecord {
            seat_id,
            ts_ms,
            frame_index: 0,
            has_person: person_count > 0,
            has_object: object_count > 0,
            person_conf: if person_count > 0 { 0.9 } else { 0.0 },
            object_conf: if object_count > 0 { 0.6 } else { 0.0 },
            fg_ratio: 0.0,
            person_count,
            object_count,
            occupancy_state: occupancy,
            snapshot_path: String::new(),
            seat_roi: Rect::new(0, 0, 10, 10),
            seat_poly: Vec::new(),
            person_boxes: Vec::new(),
            object_boxes: Vec::new(),
            t_pre_ms: 0,
            t_inf_ms: 0,
            t_post_ms: 0,
        }
    }

    #[test]
    fn seat_ids_are_normalized_with_prefix() {
        assert_eq!(normalize_seat_id("1"), "S1");
        assert_eq!(normalize_seat_id("S7"), "S7");
        assert_eq!(normalize_seat_id(""), "S0");
    }

    #[test]
    fn person_resets_the_anomaly_accumulator() {
        let mut judger = SeatStateJudger::new(JudgerConfig {
            anomaly_threshold_secs: 6,
            ..JudgerConfig::default()
        });
        let mut ts = 1_000_000i64;
        judger.step(&record(1, ts, OccupancyState::ObjectOnly));
        ts += 2_000;
        judger.step(&record(1, ts, OccupancyState::ObjectOnly));
        // Person wipes 2s of accumulation.
        ts += 2_000;
        let out = judger.step(&record(1, ts, OccupancyState::Person));
        assert_eq!(out.state.status, SeatStatus::Seated);
        // Object-only again must start from zero.
        ts += 2_000;
        let out = judger.step(&record(1, ts, OccupancyState::ObjectOnly));
        assert_eq!(out.state.status, SeatStatus::Unseated);
        assert!(out.alerts.is_empty());
    }

    #[test]
    fn stale_timestamp_is_clamped_per_record() {
        let mut judger = SeatStateJudger::new(JudgerConfig {
            anomaly_threshold_secs: 100,
            ..JudgerConfig::default()
        });
        judger.step(&record(1, 1_000_000, OccupancyState::ObjectOnly));
        // One hour gap still only adds MAX_STEP_SECS.
        let out = judger.step(&record(1, 1_000_000 + 3_600_000, OccupancyState::ObjectOnly));
        assert_eq!(out.state.status_duration_sec, MAX_STEP_SECS);
        assert_eq!(out.state.status, SeatStatus::Unseated);
    }

    #[test]
    fn first_record_emits_a_transition_event() {
        let mut judger = SeatStateJudger::new(JudgerConfig::default());
        let out = judger.step(&record(4, 1_000_000, OccupancyState::Free));
        assert_eq!(out.state.seat_id, "S4");
        assert_eq!(out.state.status, SeatStatus::Unseated);
        assert!(out.event.is_some());
        assert_eq!(out.state.status_duration_sec, 0);
    }

    #[test]
    fn snapshot_rows_flow_on_every_record() {
        let mut judger = SeatStateJudger::new(JudgerConfig::default());
        let a = judger.step(&record(1, 1_000_000, OccupancyState::Free));
        let b = judger.step(&record(1, 1_002_000, OccupancyState::Free));
        assert!(a.event.is_some());
        assert!(b.event.is_none());
        assert_eq!(b.snapshot.state, "Unseated");
        assert_eq!(b.snapshot.seat_id, "S1");
    }
}
