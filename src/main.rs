use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
mod config;
mod error;
mod logging;
mod pipeline;
mod stages;
mod utils;

/// Fetch archival newspaper pages, decode them from JPEG 2000 and cut square thumbnails
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// File with one page URL per line
    links_file: PathBuf,

    /// Log file (appended to)
    log_file: PathBuf,

    /// Existing directory that receives the pages
    out_dir: PathBuf,

    /// Side length of the square thumbnails
    #[arg(long, default_value_t = stages::normalize::DEFAULT_DIM)]
    dim: u32,

    /// Number of downloads in flight at once
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Number of threads used to normalize images
    #[arg(long, default_value_t = 1)]
    jobs: usize,

    /// Write greyscale thumbnails
    #[arg(long, default_value_t = false)]
    greyscale: bool,

    /// Write thumbnails here instead of the output directory
    #[arg(long)]
    final_dir: Option<PathBuf>,

    /// JPEG 2000 decoder executable
    #[arg(long, default_value = "opj_decompress")]
    decoder: PathBuf,

    /// Delete every consumed file, even those whose conversion failed
    #[arg(long, default_value_t = false)]
    legacy_cleanup: bool,

    /// Keep the image decoder's default size limits
    #[arg(long, default_value_t = false)]
    pixel_limits: bool,

    /// Replace the last character of each local name (e.g. `g` for .jp2 -> .jpg)
    #[arg(long)]
    replace_last_char: Option<char>,

    /// Write a JSON report of every stage to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Wrong arity prints usage and exits like a normal run
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return Ok(());
        }
    };

    if let Err(e) = logging::init_logging(&args.log_file) {
        eprintln!(
            "Could not open log file {}: {}; logging to stderr",
            args.log_file.display(),
            e
        );
        logging::init_logging_stderr();
    }

    let config = config::PipelineConfig::from_args(args).map_err(|e| {
        error!(error = %e, "invalid configuration");
        e
    })?;
    info!(log_file = %config.log_file.display(), "configuration loaded");

    let report = pipeline::run(&config).await;

    println!();
    for stage in &report.stages {
        println!(
            "{:<10} attempted {:>5}  ok {:>5}  skipped {:>5}  failed {:>5}  ({:.1}s)",
            stage.stage.to_string(),
            stage.attempted,
            stage.succeeded,
            stage.skipped,
            stage.failed(),
            stage.elapsed_secs
        );
    }
    println!("Total time: {:.1}s", report.elapsed_secs);
    if report.total_failures() > 0 {
        println!(
            "{} items failed; see {}",
            report.total_failures(),
            config.log_file.display()
        );
    }

    if let Some(path) = &config.report {
        if let Err(e) = write_report(path, &report) {
            error!(path = %path.display(), error = %e, "Could not write report");
            eprintln!("Error writing report: {:#}", e);
        }
    }

    Ok(())
}

fn write_report(path: &std::path::Path, report: &stages::RunReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("serializing report")?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "report written");
    Ok(())
}
