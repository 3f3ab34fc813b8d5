// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! camring, a continuous capture ring recorder.
//!
//! Usage:
//!   camring record --config camring.toml
//!   camring extract <utc_seconds_start> <duration_seconds> --dir /var/spool/camring > out.mjpeg
//!   camring dump idx_0000000000
//!   camring list --dir /var/spool/camring

use std::io::{IsTerminal, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use camring::capture::{DeviceReader, FrameSource};
use camring::config::Config;
use camring::dump::dump_index_file;
use camring::extract::{extract_range, probe_index_file, ExtractRequest};
use camring::recorder::{CaptureSession, Recorder};
use camring::storage::format::FrameDescriptor;
use camring::storage::rotate::{DirectSink, PairSink, Rotator, IDX_PREFIX};
use camring::storage::writer::{WriteThread, WthSink};

#[derive(Parser)]
#[command(name = "camring", about = "Continuous capture ring recorder", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record the configured capture device until CTRL+C.
    Record {
        #[arg(short, long, default_value = "camring.toml")]
        config: PathBuf,
    },
    /// Extract a time window of recorded frames to stdout.
    Extract {
        /// Window start as UTC seconds.
        start: u64,
        /// Window length in seconds.
        duration: u64,
        /// Directory holding the idx_/frm_ pairs.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Pad or trim each wall second to the declared frame rate.
        #[arg(long)]
        normalize: bool,
    },
    /// Print structural validation of one index file.
    Dump {
        /// Index file to inspect.
        file: PathBuf,
    },
    /// List rotation slots found in a directory.
    List {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Record { config } => {
            run_record(config).await;
        }
        Command::Extract { start, duration, dir, normalize } => {
            run_extract(start, duration, dir, normalize);
        }
        Command::Dump { file } => {
            run_dump(file);
        }
        Command::List { dir } => {
            run_list(dir);
        }
    }
}

async fn run_record(config_path: PathBuf) {
    let cfg = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        device = %cfg.capture.device.display(),
        dir = %cfg.storage.dir.display(),
        fps = cfg.capture.fps,
        size_limit_mb = cfg.storage.file_size_limit_mb,
        max_files = cfg.storage.max_files,
        writer_thread = cfg.storage.writer_thread,
        "Starting recorder"
    );

    if let Err(e) = std::fs::create_dir_all(&cfg.storage.dir) {
        error!(error = %e, "Cannot create storage directory");
        std::process::exit(1);
    }

    let (mut source, _device) = match DeviceReader::new(&cfg.capture).spawn().await {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "Capture setup failed");
            std::process::exit(1);
        }
    };

    let desc = FrameDescriptor {
        fps: cfg.capture.fps,
        width: cfg.capture.width,
        height: cfg.capture.height,
    };
    let rotator = Rotator::new(
        &cfg.storage.dir,
        cfg.storage.file_size_limit_mb * 1024 * 1024,
        cfg.storage.max_files,
    );
    let session = CaptureSession::begin();

    let result = if cfg.storage.writer_thread {
        let wth = match WriteThread::spawn(cfg.storage.ring_capacity_mb * 1024 * 1024) {
            Ok(w) => w,
            Err(e) => {
                error!(error = %e, "Writer thread setup failed");
                std::process::exit(1);
            }
        };
        let mut recorder = Recorder::new(WthSink::new(wth.client()), rotator, desc, session);
        let r = drive(&mut recorder, &mut source).await;
        wth.shutdown();
        r
    } else {
        let mut recorder = Recorder::new(DirectSink::new(), rotator, desc, session);
        drive(&mut recorder, &mut source).await
    };

    if let Err(e) = result {
        error!(error = %e, "Recording failed");
        std::process::exit(1);
    }
}

/// Run the recorder until the stream ends or CTRL+C arrives.
async fn drive<S: PairSink>(
    recorder: &mut Recorder<S>,
    source: &mut FrameSource,
) -> camring::error::Result<()> {
    let interrupted = {
        let run = recorder.run(source);
        tokio::pin!(run);
        tokio::select! {
            res = &mut run => {
                res?;
                false
            }
            _ = tokio::signal::ctrl_c() => true,
        }
    };
    if interrupted {
        info!("Received CTRL+C, shutting down");
        recorder.finish();
    }
    Ok(())
}

fn run_extract(start: u64, duration: u64, dir: PathBuf, normalize: bool) {
    let stdout = std::io::stdout();
    let terminal = stdout.is_terminal();
    if terminal {
        info!("Output is a terminal, payload dump disabled");
    }

    let req = ExtractRequest { dir, start_utc: start, duration, normalize };
    let result = if terminal {
        extract_range(&req, None)
    } else {
        let mut out = std::io::BufWriter::new(stdout.lock());
        let r = extract_range(&req, Some(&mut out));
        if let Err(e) = out.flush() {
            error!(error = %e, "Output flush failed");
            std::process::exit(1);
        }
        r
    };

    match result {
        Ok(summary) => {
            info!(
                frames = summary.frames,
                bytes = summary.bytes,
                "Extraction complete"
            );
        }
        Err(e) => {
            error!(error = %e, "Extraction failed");
            std::process::exit(1);
        }
    }
}

fn run_dump(file: PathBuf) {
    let mut out = std::io::stdout();
    match dump_index_file(&file, &mut out) {
        Ok(stats) => {
            info!(records = stats.records, errors = stats.errors, "Dump complete");
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn run_list(dir: PathBuf) {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(&dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(IDX_PREFIX))
                    .unwrap_or(false)
            })
            .collect(),
        Err(e) => {
            eprintln!("Error: cannot read '{}': {e}", dir.display());
            std::process::exit(1);
        }
    };
    files.sort();

    if files.is_empty() {
        println!("No index files found in '{}'", dir.display());
        return;
    }

    println!(
        "{:<16} {:>6} {:>8} {:>4} {:>9}  {:<20} {:<16}",
        "FILE", "SLOT", "FRAMES", "FPS", "GEOMETRY", "START (UTC)", "LAST FRAME"
    );
    println!("{}", "-".repeat(88));
    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match probe_index_file(path) {
            Ok(probe) => {
                let abs = probe.header.record_start_abs();
                let start = chrono::DateTime::from_timestamp(abs.sec as i64, 0)
                    .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "?".into());
                println!(
                    "{:<16} {:>6} {:>8} {:>4} {:>4}x{:<4}  {:<20} {:<16}",
                    name,
                    probe.header.seq,
                    probe.frame_count,
                    probe.header.desc.fps,
                    probe.header.desc.width,
                    probe.header.desc.height,
                    start,
                    probe.last.tv.to_string(),
                );
            }
            Err(e) => {
                println!("{name:<16} unreadable: {e}");
            }
        }
    }
    println!("\nTotal: {} index files", files.len());
}
