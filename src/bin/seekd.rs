//! seekd - object search daemon
//!
//! This daemon:
//! 1. Loads configuration (file named by SEEK_CONFIG, then SEEK_* overrides)
//! 2. Loads the label list and detection model
//! 3. Pulls frames from the configured source and delivers them at the source fps
//! 4. Reports the first confident match of the target label, then idles until reset

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lens_seek::{CameraSource, SeekConfig, Session};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML by extension). Overrides SEEK_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stop after the first accepted detection instead of waiting for Ctrl-C.
    #[arg(long)]
    exit_on_match: bool,
    /// Reset the latch this many seconds after a match and keep searching.
    #[arg(long)]
    rearm_after: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SeekConfig::load_from(path)?,
        None => SeekConfig::load()?,
    };
    log::info!(
        "seekd target='{}' threshold={:.2} model={} source={}",
        config.target_label,
        config.accuracy_threshold,
        config.model_path.display(),
        config.source.url
    );

    let (session, mut subscription) = Session::open(&config)?;
    let mut source = CameraSource::new(config.source.clone())?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::SeqCst);
    })?;

    let frame_interval = Duration::from_secs_f64(1.0 / f64::from(config.source.fps));
    let mut last_snapshot = None;
    let mut matched_at: Option<Instant> = None;

    while !shutdown.load(Ordering::SeqCst) {
        let started = Instant::now();
        match source.next_frame()? {
            Some(frame) => {
                if !session.deliver(frame) {
                    log::warn!("session stopped accepting frames");
                    break;
                }
            }
            None => {
                log::info!("source exhausted");
                break;
            }
        }

        let state = subscription.poll();
        if let Some(snapshot) = &state.snapshot {
            if last_snapshot != Some(snapshot.sequence) {
                last_snapshot = Some(snapshot.sequence);
                matched_at = Some(Instant::now());
                let caption = state
                    .overlay
                    .as_ref()
                    .map(|overlay| overlay.caption.as_str())
                    .unwrap_or("");
                log::info!(
                    "match on frame #{} ({}), snapshot {}x{} ({} bytes png)",
                    snapshot.sequence,
                    caption,
                    snapshot.width,
                    snapshot.height,
                    snapshot.png.len()
                );
                if args.exit_on_match {
                    break;
                }
            }
        }
        if let (Some(secs), Some(at)) = (args.rearm_after, matched_at) {
            if at.elapsed() >= Duration::from_secs(secs) {
                matched_at = None;
                session.reset();
            }
        }

        if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let captured = source.stats();
    let stats = session.shutdown()?;
    log::info!(
        "seekd exiting: {} frames captured from {}, {} processed, {} skipped while latched",
        captured.frames_captured,
        captured.url,
        stats.frames_processed,
        stats.frames_skipped
    );
    Ok(())
}
