//! Persistence sinks for judger output.
//!
//! The judger hands durable recording to a `JudgerSink`; sink failures
//! are logged by the caller and never stall the per-record state
//! machine. `SqliteJudgerSink` is the production sink,
//! `InMemoryJudgerSink` backs tests.

use anyhow::Result;
use rusqlite::{params, Connection};

use super::{Alert, SeatEvent, SeatSnapshotRecord};

pub trait JudgerSink {
    fn insert_event(&mut self, event: &SeatEvent) -> Result<()>;
    fn insert_snapshot(&mut self, snapshot: &SeatSnapshotRecord) -> Result<()>;
    fn insert_alert(&mut self, alert: &Alert) -> Result<()>;
}

pub struct SqliteJudgerSink {
    conn: Connection,
}

impl SqliteJudgerSink {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut sink = Self { conn };
        sink.ensure_schema()?;
        Ok(sink)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS seat_events (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              seat_id TEXT NOT NULL,
              state TEXT NOT NULL,
              timestamp TEXT NOT NULL,
              duration_sec INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS seat_snapshots (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              timestamp TEXT NOT NULL,
              seat_id TEXT NOT NULL,
              state TEXT NOT NULL,
              person_count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS alerts (
              alert_id TEXT PRIMARY KEY,
              seat_id TEXT NOT NULL,
              alert_type TEXT NOT NULL,
              alert_desc TEXT NOT NULL,
              timestamp TEXT NOT NULL,
              is_processed INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_events_seat ON seat_events(seat_id);
            CREATE INDEX IF NOT EXISTS idx_snapshots_seat ON seat_snapshots(seat_id);
            "#,
        )?;
        Ok(())
    }
}

impl JudgerSink for SqliteJudgerSink {
    fn insert_event(&mut self, event: &SeatEvent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO seat_events (seat_id, state, timestamp, duration_sec) VALUES (?1, ?2, ?3, ?4)",
            params![event.seat_id, event.state, event.timestamp, event.duration_sec],
        )?;
        Ok(())
    }

    fn insert_snapshot(&mut self, snapshot: &SeatSnapshotRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO seat_snapshots (timestamp, seat_id, state, person_count) VALUES (?1, ?2, ?3, ?4)",
            params![
                snapshot.timestamp,
                snapshot.seat_id,
                snapshot.state,
                snapshot.person_count
            ],
        )?;
        Ok(())
    }

    fn insert_alert(&mut self, alert: &Alert) -> Result<()> {
        // Replays of an already-recorded alert id are idempotent.
        self.conn.execute(
            "INSERT OR IGNORE INTO alerts (alert_id, seat_id, alert_type, alert_desc, timestamp, is_processed) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                alert.alert_id,
                alert.seat_id,
                alert.alert_type,
                alert.alert_desc,
                alert.timestamp,
                alert.is_processed as i64
            ],
        )?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryJudgerSink {
    pub events: Vec<SeatEvent>,
    pub snapshots: Vec<SeatSnapshotRecord>,
    pub alerts: Vec<Alert>,
}

impl InMemoryJudgerSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JudgerSink for InMemoryJudgerSink {
    fn insert_event(&mut self, event: &SeatEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }

    fn insert_snapshot(&mut self, snapshot: &SeatSnapshotRecord) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn insert_alert(&mut self, alert: &Alert) -> Result<()> {
        self.alerts.push(alert.clone());
        Ok(())
    }
}
