//! judgerd - the temporal judger daemon
//!
//! Polls the record directory visiond writes into, advances the
//! per-seat state machines, and records events, snapshots, and
//! anomaly alerts to SQLite.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use seatwatch_kernel::config::JudgerSettings;
use seatwatch_kernel::judger::{SqliteJudgerSink, SeatStateJudger};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Record directory, overriding the config file.
    #[arg(long)]
    record_dir: Option<PathBuf>,
    /// SQLite database path, overriding the config file.
    #[arg(long)]
    db_path: Option<String>,
    /// Anomaly threshold in seconds, overriding the config file.
    #[arg(long)]
    anomaly_secs: Option<i64>,
    /// Run one polling pass and exit instead of looping.
    #[arg(long, default_value_t = false)]
    once: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut settings = JudgerSettings::load()?;
    if let Some(dir) = args.record_dir {
        settings.record_dir = dir;
    }
    if let Some(path) = args.db_path {
        settings.db_path = path;
    }
    if let Some(secs) = args.anomaly_secs {
        settings.judger.anomaly_threshold_secs = secs;
    }

    let mut sink = SqliteJudgerSink::open(&settings.db_path)?;
    let mut judger = SeatStateJudger::new(settings.judger);
    log::info!(
        "judgerd starting: dir={} db={} anomaly_secs={}",
        settings.record_dir.display(),
        settings.db_path,
        settings.judger.anomaly_threshold_secs
    );

    if args.once {
        let processed = judger.poll_once(&settings.record_dir, &mut sink)?;
        log::info!("single pass complete: {processed} record lines");
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown requested");
        flag.store(false, Ordering::SeqCst);
    })?;

    judger.run(&settings.record_dir, &mut sink, running)
}
