use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app::error::PullCoverageError;

/// Aggregated outcome of one instrumentation run on one device, as reported
/// by the run listener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestRunResult {
    pub failed: bool,
    pub tests_run: usize,
    /// RFC 3339 timestamp of run completion.
    pub finished_at: String,
    pub report_path: Option<PathBuf>,
}

impl TestRunResult {
    pub fn new(failed: bool, tests_run: usize, report_path: Option<PathBuf>) -> Self {
        Self {
            failed,
            tests_run,
            finished_at: chrono::Utc::now().to_rfc3339(),
            report_path,
        }
    }
}

/// Final per-device outcome handed back to the caller. A coverage failure is
/// carried separately and never flips `failed`.
#[derive(Debug, Clone, Default)]
pub struct DeviceCommandResult {
    pub failed: bool,
    pub coverage_artifact: Option<PathBuf>,
    pub coverage_error: Option<PullCoverageError>,
}
