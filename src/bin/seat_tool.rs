//! seat_tool - seat descriptor and media utilities
//!
//! `list` prints the seats a descriptor resolves to (including table
//! subdivision), `normalize` rewrites a descriptor in explicit-seats
//! form, and `extract` bulk-dumps sampled video frames as JPEGs.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use seatwatch_kernel::driver::bulk_extract;
use seatwatch_kernel::SeatRegistry;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resolved seat list of a descriptor file.
    List {
        /// Seat descriptor path.
        #[arg(long)]
        seats: PathBuf,
    },
    /// Rewrite a descriptor in explicit-seats form.
    Normalize {
        #[arg(long)]
        seats: PathBuf,
        /// Output path; defaults to rewriting in place.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Bulk-extract sampled frames from a video to JPEG files.
    Extract {
        /// Video file or stub:// source.
        #[arg(long)]
        input: String,
        #[arg(long, default_value = "runtime/frames")]
        out_dir: PathBuf,
        /// Output filename prefix.
        #[arg(long, default_value = "")]
        prefix: String,
        #[arg(long, default_value_t = 1.0)]
        fps: f64,
        #[arg(long, default_value_t = 90)]
        quality: u8,
        #[arg(long, default_value_t = 10_000)]
        max_frames: usize,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::List { seats } => {
            let registry = SeatRegistry::load(&seats);
            if registry.is_empty() {
                bail!("descriptor resolved to no seats: {}", seats.display());
            }
            for seat in registry.seats() {
                let shape = if seat.has_polygon() {
                    format!("poly[{}]", seat.polygon.len())
                } else {
                    "rect".to_string()
                };
                println!(
                    "seat {:>5}  {shape:>8}  x={} y={} w={} h={}",
                    seat.seat_id, seat.rect.x, seat.rect.y, seat.rect.w, seat.rect.h
                );
            }
        }
        Command::Normalize { seats, out } => {
            let registry = SeatRegistry::load(&seats);
            if registry.is_empty() {
                bail!("descriptor resolved to no seats: {}", seats.display());
            }
            let target = out.unwrap_or(seats);
            registry.save(&target)?;
            println!("wrote {} seats to {}", registry.len(), target.display());
        }
        Command::Extract {
            input,
            out_dir,
            prefix,
            fps,
            quality,
            max_frames,
        } => {
            let extracted = bulk_extract(&input, &out_dir, &prefix, quality, fps, max_frames)?;
            println!("extracted {extracted} frames to {}", out_dir.display());
        }
    }
    Ok(())
}
