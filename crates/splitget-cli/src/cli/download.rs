//! Runs the blocking coordinator off the async runtime, with a progress line
//! and Ctrl-C cancellation.

use anyhow::{Context, Result};
use splitget_core::config::SplitgetConfig;
use splitget_core::control::CancelToken;
use splitget_core::http::CurlRangeClient;
use splitget_core::progress::{ProgressStats, ProgressTracker};
use splitget_core::{Coordinator, DownloadOutcome};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub const EXIT_OK: i32 = 0;
pub const EXIT_PARTIAL: i32 = 2;
pub const EXIT_INTEGRITY: i32 = 3;
pub const EXIT_CANCELLED: i32 = 130;

pub fn exit_code(outcome: &DownloadOutcome) -> i32 {
    match outcome {
        DownloadOutcome::Success { .. } | DownloadOutcome::AlreadyComplete { .. } => EXIT_OK,
        DownloadOutcome::PartialFailure { .. } => EXIT_PARTIAL,
        DownloadOutcome::IntegrityMismatch { .. } => EXIT_INTEGRITY,
        DownloadOutcome::Cancelled => EXIT_CANCELLED,
    }
}

fn progress_line(stats: &ProgressStats) -> String {
    let done_mib = stats.bytes_done as f64 / 1_048_576.0;
    let total_mib = stats.total_bytes as f64 / 1_048_576.0;
    let eta = stats
        .eta_secs()
        .map(|s| format!("{:.0}s", s))
        .unwrap_or_else(|| "?".to_string());
    format!(
        "\r  {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  ETA {}  ",
        done_mib,
        total_mib,
        stats.fraction() * 100.0,
        stats.bytes_per_sec() / 1_048_576.0,
        eta
    )
}

pub async fn run_download(
    url: &str,
    workers: usize,
    output: PathBuf,
    cfg: &SplitgetConfig,
) -> Result<DownloadOutcome> {
    let cancel = CancelToken::new();
    let progress = ProgressTracker::new();
    let coordinator = Coordinator::new(CurlRangeClient::new(cfg.client_options()))
        .with_retry_policy(cfg.retry_policy())
        .with_cancel_token(cancel.clone())
        .with_progress(progress.clone());

    println!("{} -> {} ({} workers)", url, output.display(), workers);

    let url_owned = url.to_string();
    let target = output.clone();
    let mut job = tokio::task::spawn_blocking(move || {
        coordinator.run(&url_owned, workers, &target)
    });

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    let result = loop {
        tokio::select! {
            res = &mut job => break res,
            _ = ticker.tick() => {
                let stats = progress.snapshot();
                if stats.total_bytes > 0 {
                    print!("{}", progress_line(&stats));
                    let _ = std::io::stdout().flush();
                }
            }
            sig = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = sig {
                    tracing::warn!("cannot listen for Ctrl-C: {}", e);
                    continue;
                }
                tracing::info!("interrupt received, stopping workers");
                eprintln!("\ninterrupted, saving progress...");
                cancel.cancel();
            }
        }
    };
    println!();

    let outcome = result
        .context("download task panicked")?
        .with_context(|| format!("downloading {}", url))?;
    report(&outcome, &output);
    Ok(outcome)
}

fn report(outcome: &DownloadOutcome, output: &std::path::Path) {
    match outcome {
        DownloadOutcome::Success { bytes } => {
            println!("saved {} ({} bytes)", output.display(), bytes)
        }
        DownloadOutcome::AlreadyComplete { bytes } => {
            println!("{} already complete ({} bytes)", output.display(), bytes)
        }
        DownloadOutcome::PartialFailure { failed_workers } => eprintln!(
            "download incomplete: ranges {:?} failed; run again to resume",
            failed_workers
        ),
        DownloadOutcome::IntegrityMismatch { expected, actual } => eprintln!(
            "integrity check failed: expected {} bytes, found {}",
            expected, actual
        ),
        DownloadOutcome::Cancelled => eprintln!("cancelled; run again to resume"),
    }
}
