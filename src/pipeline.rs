//! Runs the three stages in order over the output directory.
//!
//! No stage failure stops the run: a stage that cannot start is recorded as
//! an aborted report and the next stage still looks at whatever is on disk.

use crate::config::PipelineConfig;
use crate::stages::convert::{convert_dir, OpjDecompress};
use crate::stages::fetch::fetch_all;
use crate::stages::normalize::normalize_dir;
use crate::stages::{RunReport, Stage, StageReport};
use crate::utils::http::build_client;
use std::time::Instant;
use tracing::{error, info};

pub async fn run(config: &PipelineConfig) -> RunReport {
    let started = Instant::now();
    info!(
        links_file = %config.links_file.display(),
        out_dir = %config.out_dir.display(),
        "pipeline started"
    );

    let fetch = run_fetch(config).await;

    let convert = {
        let dir = config.out_dir.clone();
        let decoder = OpjDecompress::new(config.decoder.clone());
        let policy = config.cleanup;
        tokio::task::spawn_blocking(move || convert_dir(&dir, &decoder, policy))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "convert stage panicked");
                StageReport::aborted(Stage::Convert, "convert", e)
            })
    };

    let normalize = {
        let dir = config.out_dir.clone();
        let options = config.normalize.clone();
        tokio::task::spawn_blocking(move || normalize_dir(&dir, &options))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "normalize stage panicked");
                StageReport::aborted(Stage::Normalize, "normalize", e)
            })
    };

    let report = RunReport {
        stages: vec![fetch, convert, normalize],
        elapsed_secs: started.elapsed().as_secs_f64(),
    };
    info!(
        failures = report.total_failures(),
        elapsed_secs = report.elapsed_secs,
        "pipeline finished"
    );
    report
}

async fn run_fetch(config: &PipelineConfig) -> StageReport {
    let client = match build_client() {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Could not build HTTP client");
            return StageReport::aborted(Stage::Fetch, "http client", e);
        }
    };

    match fetch_all(&client, &config.links_file, &config.out_dir, &config.fetch).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "fetch stage could not start");
            StageReport::aborted(Stage::Fetch, config.links_file.display().to_string(), e)
        }
    }
}
