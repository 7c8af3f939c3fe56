//! Stage 2: turn downloaded JPEG 2000 pages into PNG with an external decoder.

use crate::error::ConvertError;
use crate::stages::{CleanupPolicy, Stage, StageReport};
use crate::utils::files::{display_name, list_with_extension, remove_files};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Instant, SystemTime};
use tracing::{debug, error, info, warn};

pub const SOURCE_EXT: &str = "jp2";
pub const INTERMEDIATE_EXT: &str = "png";

/// What a successful decoder invocation reported.
#[derive(Debug, Default)]
pub struct DecoderRun {
    pub stderr: String,
}

/// Something that decodes every source file in a directory, writing
/// `<stem>.<format>` next to each input.
pub trait Decoder {
    fn program(&self) -> &Path;

    fn decode_dir(&self, dir: &Path, format: &str) -> Result<DecoderRun, ConvertError>;
}

/// The OpenJPEG command-line decoder
#[derive(Debug, Clone)]
pub struct OpjDecompress {
    program: PathBuf,
}

impl OpjDecompress {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for OpjDecompress {
    fn default() -> Self {
        Self::new("opj_decompress")
    }
}

impl Decoder for OpjDecompress {
    fn program(&self) -> &Path {
        &self.program
    }

    fn decode_dir(&self, dir: &Path, format: &str) -> Result<DecoderRun, ConvertError> {
        let output = Command::new(&self.program)
            .arg("-ImgDir")
            .arg(dir)
            .arg("-OutFor")
            .arg(format)
            .output()
            .map_err(|source| ConvertError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(ConvertError::DecoderFailed {
                status: output.status,
                stderr,
            });
        }

        Ok(DecoderRun { stderr })
    }
}

/// Decode every `.jp2` in `dir` to `.png`, verify the outputs, then clean up sources.
pub fn convert_dir(dir: &Path, decoder: &dyn Decoder, policy: CleanupPolicy) -> StageReport {
    let started = Instant::now();
    let mut report = StageReport::new(Stage::Convert);

    let sources = match list_with_extension(dir, SOURCE_EXT) {
        Ok(files) => files,
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "Could not list source files");
            report.fail(dir.display().to_string(), e);
            report.finish(started.elapsed());
            return report;
        }
    };

    info!(
        dir = %dir.display(),
        sources = sources.len(),
        decoder = %decoder.program().display(),
        ?policy,
        "convert started"
    );
    println!("Converting {} pages in {}", sources.len(), dir.display());

    if sources.is_empty() {
        report.finish(started.elapsed());
        return report;
    }

    // Outputs left over from an earlier run must not vouch for this one
    let stale = existing_outputs(&sources);

    match decoder.decode_dir(dir, INTERMEDIATE_EXT) {
        Ok(run) => {
            if !run.stderr.is_empty() {
                debug!(stderr = %run.stderr, "decoder diagnostics");
            }
        }
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "Decoder run failed");
            report.fail(decoder.program().display().to_string(), e);
        }
    }

    let mut converted = Vec::new();
    for source in &sources {
        report.attempted += 1;
        let output = source.with_extension(INTERMEDIATE_EXT);
        if written_this_run(&output, stale.get(&output)) {
            report.succeeded += 1;
            converted.push(source.clone());
        } else {
            let name = display_name(source);
            warn!(file = %name, "decoder produced no output");
            report.fail(name, "decoder produced no output");
        }
    }

    let to_delete = match policy {
        CleanupPolicy::Verified => &converted,
        CleanupPolicy::Unconditional => &sources,
    };
    for (path, e) in remove_files(to_delete) {
        let name = display_name(&path);
        warn!(file = %name, error = %e, "Could not remove source file");
        report.fail(name, format!("cleanup failed: {e}"));
    }

    report.finish(started.elapsed());
    report
}

fn modified(path: &Path) -> Option<SystemTime> {
    let meta = fs::metadata(path).ok()?;
    if !meta.is_file() {
        return None;
    }
    meta.modified().ok()
}

fn existing_outputs(sources: &[PathBuf]) -> HashMap<PathBuf, SystemTime> {
    sources
        .iter()
        .map(|source| source.with_extension(INTERMEDIATE_EXT))
        .filter_map(|output| modified(&output).map(|time| (output, time)))
        .collect()
}

fn written_this_run(output: &Path, before: Option<&SystemTime>) -> bool {
    match (modified(output), before) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(now), Some(before)) => now != *before,
    }
}
