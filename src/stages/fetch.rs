//! Stage 1: download every listed page that is not already on disk.

use crate::error::FetchError;
use crate::stages::convert::INTERMEDIATE_EXT;
use crate::stages::normalize::FINAL_EXT;
use crate::stages::{Stage, StageReport};
use crate::utils::files::{local_name, NamingRule};
use crate::utils::http::download_to_file;
use futures::stream::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub naming: NamingRule,
    /// Requests in flight at once; 1 keeps the strictly sequential behavior.
    pub concurrency: usize,
    /// Where thumbnails end up when not beside the pages; a thumbnail there
    /// also counts as the page being present.
    pub final_dir: Option<PathBuf>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            naming: NamingRule::Verbatim,
            concurrency: 1,
            final_dir: None,
        }
    }
}

enum Fetched {
    Downloaded { name: String, bytes: u64 },
    AlreadyPresent { name: String },
}

/// Fetch every locator in `links_file` into `out_dir`.
///
/// Only an unreadable links file is an `Err`; per-locator problems are
/// logged and recorded in the returned report.
pub async fn fetch_all(
    client: &reqwest::Client,
    links_file: &Path,
    out_dir: &Path,
    options: &FetchOptions,
) -> Result<StageReport, FetchError> {
    let started = Instant::now();
    let mut report = StageReport::new(Stage::Fetch);

    let contents = tokio::fs::read_to_string(links_file)
        .await
        .map_err(|source| FetchError::LinksFile {
            path: links_file.to_path_buf(),
            source,
        })?;

    let locators: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| {
            if line.is_empty() {
                debug!("Ignoring blank line in links file");
                false
            } else {
                true
            }
        })
        .collect();

    info!(
        links_file = %links_file.display(),
        out_dir = %out_dir.display(),
        locators = locators.len(),
        concurrency = options.concurrency,
        "fetch started"
    );
    println!("Fetching {} pages into {}", locators.len(), out_dir.display());

    let pb = ProgressBar::new(locators.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    // Names are derived up front so duplicates resolve in input order
    // even when requests overlap.
    let mut seen = HashSet::new();
    let jobs: Vec<_> = locators
        .iter()
        .map(|&locator| {
            let name = local_name(locator, options.naming);
            let duplicate = match &name {
                Ok(n) => !seen.insert(n.clone()),
                Err(_) => false,
            };
            (locator, name, duplicate)
        })
        .collect();

    let results = futures::stream::iter(jobs.into_iter().map(|(locator, name, duplicate)| async move {
        let outcome = match name {
            Ok(name) => fetch_one(client, locator, name, duplicate, out_dir, options).await,
            Err(e) => Err(e),
        };
        (locator, outcome)
    }))
    .buffered(options.concurrency.max(1));
    let mut results = std::pin::pin!(results);

    while let Some((locator, outcome)) = results.next().await {
        report.attempted += 1;
        match outcome {
            Ok(Fetched::Downloaded { name, bytes }) => {
                debug!(locator, name = %name, bytes, "downloaded");
                report.succeeded += 1;
            }
            Ok(Fetched::AlreadyPresent { name }) => {
                debug!(locator, name = %name, "already present, skipping");
                report.skipped += 1;
            }
            Err(FetchError::Status { status }) => {
                warn!(locator, status = status.as_u16(), "Could not get image");
                report.fail(locator, format!("HTTP {status}"));
            }
            Err(e) => {
                error!(locator, error = %e, "Could not get image");
                report.fail(locator, e);
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message("Fetch complete!");
    report.finish(started.elapsed());
    Ok(report)
}

async fn fetch_one(
    client: &reqwest::Client,
    locator: &str,
    name: String,
    duplicate: bool,
    out_dir: &Path,
    options: &FetchOptions,
) -> Result<Fetched, FetchError> {
    let target = out_dir.join(&name);

    if duplicate {
        warn!(locator, name = %name, "local name already produced by an earlier locator");
        return Ok(Fetched::AlreadyPresent { name });
    }

    for path in presence_paths(&target, options.final_dir.as_deref()) {
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|source| FetchError::Io {
                path: path.clone(),
                source,
            })?;
        if exists {
            if path != target {
                debug!(locator, found = %path.display(), "later stage output present");
            }
            return Ok(Fetched::AlreadyPresent { name });
        }
    }

    let bytes = download_to_file(client, locator, &target).await?;
    Ok(Fetched::Downloaded { name, bytes })
}

/// Files whose presence means the page needs no download: the page itself,
/// or what the convert and normalize stages made from it on an earlier run.
fn presence_paths(target: &Path, final_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = vec![target.to_path_buf()];
    let (Some(dir), Some(stem)) = (target.parent(), target.file_stem()) else {
        return paths;
    };

    for ext in [INTERMEDIATE_EXT, FINAL_EXT] {
        let mut file = stem.to_os_string();
        file.push(".");
        file.push(ext);
        let mut candidates = vec![dir.join(&file)];
        if ext == FINAL_EXT {
            candidates.extend(final_dir.map(|d| d.join(&file)));
        }
        for path in candidates {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}
