//! Command line front end for splitget.

mod download;

use anyhow::{Context, Result};
use clap::Parser;
use splitget_core::config;
use splitget_core::url_model::derive_filename;
use splitget_core::MAX_WORKERS;
use std::path::PathBuf;

pub use download::exit_code;

/// Download one HTTP resource over several concurrent ranges, resuming
/// where a previous run left off.
#[derive(Debug, Parser)]
#[command(name = "splitget", version)]
#[command(about = "Resumable multi-range HTTP downloader", long_about = None)]
pub struct Cli {
    /// HTTP/HTTPS URL of the resource.
    pub url: String,

    /// Number of concurrent ranges (default from config).
    #[arg(short = 'n', long, value_name = "N", value_parser = parse_workers)]
    pub workers: Option<usize>,

    /// Directory to save into (default: current directory).
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output file name or path; overrides the name derived from the URL.
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

fn parse_workers(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n) if (1..=MAX_WORKERS).contains(&n) => Ok(n),
        Ok(_) => Err(format!("must be between 1 and {}", MAX_WORKERS)),
        Err(e) => Err(e.to_string()),
    }
}

impl Cli {
    /// Resolve the output path: `--output` as given when absolute, otherwise
    /// joined onto the output directory.
    pub fn output_path(&self, cwd: PathBuf) -> PathBuf {
        let dir = self.output_dir.clone().unwrap_or(cwd);
        match &self.output {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => dir.join(p),
            None => dir.join(derive_filename(&self.url)),
        }
    }

    /// Parse arguments, run the download and return the process exit code.
    pub async fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();
        let cfg = config::load_or_init().context("loading config")?;
        tracing::debug!("loaded config: {:?}", cfg);

        let workers = cli.workers.unwrap_or(cfg.workers).clamp(1, MAX_WORKERS);
        let output = cli.output_path(std::env::current_dir()?);
        let outcome = download::run_download(&cli.url, workers, output, &cfg).await?;
        Ok(exit_code(&outcome))
    }
}
