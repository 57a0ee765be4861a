//! Temporal judger behavior over realistic record sequences.

use std::fs;

use seatwatch_kernel::geometry::Rect;
use seatwatch_kernel::judger::{
    InMemoryJudgerSink, JudgerConfig, SeatStateJudger,
};
use seatwatch_kernel::records::{FrameRecord, SeatRecord};
use seatwatch_kernel::{OccupancyState, SeatStatus};

fn seat_record(seat_id: i32, ts_ms: i64, occupancy: OccupancyState) -> SeatRecord {
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
        seat_roi: Rect::new(0, 0, 100, 100),
        seat_poly: Vec::new(),
        person_boxes: Vec::new(),
        object_boxes: Vec::new(),
        t_pre_ms: 0,
        t_inf_ms: 0,
        t_post_ms: 0,
    }
}

fn judger(anomaly_secs: i64) -> SeatStateJudger {
    SeatStateJudger::new(JudgerConfig {
        anomaly_threshold_secs: anomaly_secs,
        ..JudgerConfig::default()
    })
}

#[test]
fn anomaly_fires_exactly_at_the_threshold() {
    let mut judger = judger(6);
    let base = 1_000_000i64;

    // Establish the seat, then three object-only records 2s apart.
    let out = judger.step(&seat_record(1, base, OccupancyState::Free));
    assert_eq!(out.state.status, SeatStatus::Unseated);

    let out = judger.step(&seat_record(1, base + 2_000, OccupancyState::ObjectOnly));
    assert_eq!(out.state.status, SeatStatus::Unseated);
    assert!(out.alerts.is_empty());

    let out = judger.step(&seat_record(1, base + 4_000, OccupancyState::ObjectOnly));
    assert_eq!(out.state.status, SeatStatus::Unseated);
    assert!(out.alerts.is_empty());

    let out = judger.step(&seat_record(1, base + 6_000, OccupancyState::ObjectOnly));
    assert_eq!(out.state.status, SeatStatus::Anomaly);
    assert_eq!(out.alerts.len(), 1);
    let alert = &out.alerts[0];
    assert_eq!(alert.alert_type, "AnomalyOccupied");
    assert_eq!(alert.seat_id, "S1");
    assert_eq!(alert.alert_desc, "Seat occupied by object for 6 seconds");
    assert!(!alert.is_processed);
    assert!(alert.alert_id.starts_with("S1_"));
}

#[test]
fn accumulation_continues_past_the_threshold() {
    let mut judger = judger(4);
    let base = 1_000_000i64;
    judger.step(&seat_record(1, base, OccupancyState::Free));
    judger.step(&seat_record(1, base + 2_000, OccupancyState::ObjectOnly));
    let out = judger.step(&seat_record(1, base + 4_000, OccupancyState::ObjectOnly));
    assert_eq!(out.state.status, SeatStatus::Anomaly);
    assert_eq!(out.state.status_duration_sec, 4);

    // Still anomalous; reported duration keeps growing.
    let out = judger.step(&seat_record(1, base + 6_000, OccupancyState::ObjectOnly));
    assert_eq!(out.state.status, SeatStatus::Anomaly);
    assert_eq!(out.state.status_duration_sec, 6);
    assert_eq!(
        out.alerts[0].alert_desc,
        "Seat occupied by object for 6 seconds"
    );
}

#[test]
fn duration_is_monotone_while_status_is_stable() {
    let mut judger = judger(3_600);
    let base = 1_000_000i64;
    let mut last = -1i64;
    for step in 0..10 {
        let out = judger.step(&seat_record(1, base + step * 2_000, OccupancyState::Person));
        assert_eq!(out.state.status, SeatStatus::Seated);
        assert!(out.state.status_duration_sec >= last);
        last = out.state.status_duration_sec;
    }
    assert_eq!(last, 18);
}

#[test]
fn end_to_end_scenario_matches_expected_statuses() {
    // Threshold 4s; 5 records 2s apart: free, object, object, person, free.
    let mut judger = judger(4);
    let base = 1_000_000i64;
    let sequence = [
        (OccupancyState::Free, SeatStatus::Unseated, 0, 0),
        (OccupancyState::ObjectOnly, SeatStatus::Unseated, 2, 0),
        (OccupancyState::ObjectOnly, SeatStatus::Anomaly, 4, 1),
        (OccupancyState::Person, SeatStatus::Seated, 2, 0),
        (OccupancyState::Free, SeatStatus::Unseated, 2, 0),
    ];
    for (i, (occupancy, status, duration, alerts)) in sequence.iter().enumerate() {
        let out = judger.step(&seat_record(1, base + i as i64 * 2_000, *occupancy));
        assert_eq!(out.state.status, *status, "step {i}");
        assert_eq!(out.state.status_duration_sec, *duration, "step {i}");
        assert_eq!(out.alerts.len(), *alerts, "step {i}");
    }
}

#[test]
fn directory_poll_consumes_each_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut judger = judger(3_600);
    let mut sink = InMemoryJudgerSink::new();

    let record = FrameRecord {
        ts_ms: 1_000_000,
        frame_index: 0,
        image_path: "a.jpg".to_string(),
        annotated_path: String::new(),
        seats: vec![seat_record(1, 1_000_000, OccupancyState::Person)],
    };
    let line = record.to_json_line().unwrap();
    fs::write(dir.path().join("000000.jsonl"), format!("{line}\n")).unwrap();

    let processed = judger.poll_once(dir.path(), &mut sink).unwrap();
    assert_eq!(processed, 1);
    assert_eq!(sink.snapshots.len(), 1);
    assert_eq!(sink.events.len(), 1);

    // Same file again: already consumed.
    let processed = judger.poll_once(dir.path(), &mut sink).unwrap();
    assert_eq!(processed, 0);
    assert_eq!(sink.snapshots.len(), 1);

    // A new file advances the same seat without a second transition.
    let record2 = FrameRecord {
        ts_ms: 1_002_000,
        frame_index: 1,
        image_path: "b.jpg".to_string(),
        annotated_path: String::new(),
        seats: vec![seat_record(1, 1_002_000, OccupancyState::Person)],
    };
    fs::write(
        dir.path().join("000001.jsonl"),
        format!("{}\n", record2.to_json_line().unwrap()),
    )
    .unwrap();
    let processed = judger.poll_once(dir.path(), &mut sink).unwrap();
    assert_eq!(processed, 1);
    assert_eq!(sink.snapshots.len(), 2);
    assert_eq!(sink.events.len(), 1);
    assert_eq!(judger.state_of("S1").unwrap().status, SeatStatus::Seated);
    // Both frames held a seated seat, so both count as flagged.
    assert_eq!(judger.frames_flagged(), 2);
}

#[test]
fn malformed_lines_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut judger = judger(3_600);
    let mut sink = InMemoryJudgerSink::new();

    let record = FrameRecord {
        ts_ms: 1_000_000,
        frame_index: 0,
        image_path: "a.jpg".to_string(),
        annotated_path: String::new(),
        seats: vec![seat_record(2, 1_000_000, OccupancyState::Free)],
    };
    let good = record.to_json_line().unwrap();
    fs::write(
        dir.path().join("000000.jsonl"),
        format!("{{not json}}\n{good}\n\n"),
    )
    .unwrap();

    let processed = judger.poll_once(dir.path(), &mut sink).unwrap();
    assert_eq!(processed, 1);
    assert_eq!(sink.snapshots.len(), 1);
    assert_eq!(sink.snapshots[0].seat_id, "S2");
}
