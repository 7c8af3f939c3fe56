//! Stage 3: square JPEG thumbnails from the decoded PNG pages.

use crate::error::NormalizeError;
use crate::stages::convert::INTERMEDIATE_EXT;
use crate::stages::{CleanupPolicy, Stage, StageReport};
use crate::utils::files::{display_name, list_with_extension, remove_files};
use crate::utils::images::{open_image, resize_and_crop, save_jpeg};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const FINAL_EXT: &str = "jpg";
pub const DEFAULT_DIM: u32 = 1024;

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Side of the output square.
    pub dim: u32,
    /// Lift the decoder's allocation limits for oversized page scans.
    pub unlimited_pixels: bool,
    pub greyscale: bool,
    /// Where the JPEGs go; `None` writes next to the PNGs.
    pub final_dir: Option<PathBuf>,
    pub cleanup: CleanupPolicy,
    /// Worker threads; 1 processes files one at a time.
    pub jobs: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            dim: DEFAULT_DIM,
            unlimited_pixels: true,
            greyscale: false,
            final_dir: None,
            cleanup: CleanupPolicy::Verified,
            jobs: 1,
        }
    }
}

/// Normalize every `.png` in `dir` into a `dim`-wide JPEG cropped to at most `dim` rows.
pub fn normalize_dir(dir: &Path, options: &NormalizeOptions) -> StageReport {
    let started = Instant::now();
    let mut report = StageReport::new(Stage::Normalize);

    let inputs = match list_with_extension(dir, INTERMEDIATE_EXT) {
        Ok(files) => files,
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "Could not list intermediate files");
            report.fail(dir.display().to_string(), e);
            report.finish(started.elapsed());
            return report;
        }
    };
    let out_dir = options.final_dir.as_deref().unwrap_or(dir);

    info!(
        dir = %dir.display(),
        out_dir = %out_dir.display(),
        files = inputs.len(),
        dim = options.dim,
        greyscale = options.greyscale,
        jobs = options.jobs,
        "normalize started"
    );
    println!("Normalizing {} pages to {}px", inputs.len(), options.dim);

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let process = |input: &PathBuf| {
        let result = normalize_one(input, out_dir, options);
        pb.inc(1);
        result
    };

    let results: Vec<Result<(u32, u32), NormalizeError>> = if options.jobs > 1 {
        match rayon::ThreadPoolBuilder::new().num_threads(options.jobs).build() {
            Ok(pool) => pool.install(|| inputs.par_iter().map(process).collect()),
            Err(e) => {
                warn!(error = %e, "Could not build worker pool, normalizing sequentially");
                inputs.iter().map(process).collect()
            }
        }
    } else {
        inputs.iter().map(process).collect()
    };
    pb.finish_with_message("Normalize complete!");

    let mut consumed = Vec::new();
    for (input, result) in inputs.iter().zip(results) {
        report.attempted += 1;
        let name = display_name(input);
        match result {
            Ok((width, height)) => {
                debug!(file = %name, width, height, "normalized");
                report.succeeded += 1;
                consumed.push(input.clone());
            }
            Err(e) => {
                error!(file = %name, error = %e, "Could not normalize image");
                report.fail(name, e);
            }
        }
    }

    let to_delete = match options.cleanup {
        CleanupPolicy::Verified => &consumed,
        CleanupPolicy::Unconditional => &inputs,
    };
    for (path, e) in remove_files(to_delete) {
        let name = display_name(&path);
        warn!(file = %name, error = %e, "Could not remove intermediate file");
        report.fail(name, format!("cleanup failed: {e}"));
    }

    report.finish(started.elapsed());
    report
}

/// Normalize one page, returning the dimensions written.
pub fn normalize_one(
    input: &Path,
    out_dir: &Path,
    options: &NormalizeOptions,
) -> Result<(u32, u32), NormalizeError> {
    let img = open_image(input, options.unlimited_pixels)?;
    let thumb = resize_and_crop(&img, options.dim)?;

    let mut file_name = input.file_stem().unwrap_or_default().to_os_string();
    file_name.push(".");
    file_name.push(FINAL_EXT);
    let target = out_dir.join(file_name);
    save_jpeg(&thumb, options.greyscale, &target)?;

    Ok((thumb.width(), thumb.height()))
}
