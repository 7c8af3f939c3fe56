use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::info;

// Pipeline stages, in run order
pub mod convert;
pub mod fetch;
pub mod normalize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Convert,
    Normalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Convert => "convert",
            Stage::Normalize => "normalize",
        };
        f.write_str(name)
    }
}

/// Which consumed files a stage deletes once it is done with a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupPolicy {
    /// Delete only the inputs whose output was verified on disk.
    #[default]
    Verified,
    /// Delete every input in the stage's snapshot, whatever its outcome.
    Unconditional,
}

/// One item that did not make it through a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub reason: String,
}

/// Per-stage outcome record.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
    pub elapsed_secs: f64,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            attempted: 0,
            succeeded: 0,
            skipped: 0,
            failures: Vec::new(),
            elapsed_secs: 0.0,
        }
    }

    /// A report for a stage that could not start at all.
    pub fn aborted(stage: Stage, item: impl Into<String>, reason: impl fmt::Display) -> Self {
        let mut report = Self::new(stage);
        report.fail(item, reason);
        report
    }

    pub fn fail(&mut self, item: impl Into<String>, reason: impl fmt::Display) {
        self.failures.push(ItemFailure {
            item: item.into(),
            reason: reason.to_string(),
        });
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
        info!(
            stage = %self.stage,
            attempted = self.attempted,
            succeeded = self.succeeded,
            skipped = self.skipped,
            failed = self.failed(),
            elapsed_secs = self.elapsed_secs,
            "stage finished"
        );
    }
}

/// Whole-run record written by `--report`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
    pub elapsed_secs: f64,
}

impl RunReport {
    pub fn total_failures(&self) -> usize {
        self.stages.iter().map(StageReport::failed).sum()
    }
}
