use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Instrumentation identity and coverage settings for the application under
/// test. Loaded by the embedding build tool; this crate only consumes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstrumentationConfig {
    pub application_id: String,
    pub test_application_id: String,
    pub instrumentation_runner: String,
    pub coverage_enabled: bool,
    /// Full path of the coverage file on the device. When empty, the
    /// conventional app-private location is used.
    pub remote_coverage_file: String,
}

impl InstrumentationConfig {
    pub fn resolved_test_application_id(&self) -> String {
        if self.test_application_id.is_empty() {
            format!("{}.test", self.application_id)
        } else {
            self.test_application_id.clone()
        }
    }

    pub fn resolved_remote_coverage_file(&self) -> String {
        if self.remote_coverage_file.is_empty() {
            format!("/data/data/{}/coverage.ec", self.application_id)
        } else {
            self.remote_coverage_file.clone()
        }
    }
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            test_application_id: String::new(),
            instrumentation_runner: "androidx.test.runner.AndroidJUnitRunner".to_string(),
            coverage_enabled: false,
            remote_coverage_file: String::new(),
        }
    }
}

/// Local directories the orchestrator writes into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Environment {
    pub coverage_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl Environment {
    pub fn new(coverage_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            coverage_dir: coverage_dir.into(),
            reports_dir: reports_dir.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_conventional_coverage_path() {
        let config = InstrumentationConfig {
            application_id: "com.example.app".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.resolved_remote_coverage_file(),
            "/data/data/com.example.app/coverage.ec"
        );
        assert_eq!(config.resolved_test_application_id(), "com.example.app.test");
    }

    #[test]
    fn explicit_paths_win_over_conventions() {
        let config = InstrumentationConfig {
            application_id: "com.example.app".to_string(),
            test_application_id: "com.example.tests".to_string(),
            remote_coverage_file: "/sdcard/coverage.ec".to_string(),
            ..Default::default()
        };
        assert_eq!(config.resolved_remote_coverage_file(), "/sdcard/coverage.ec");
        assert_eq!(config.resolved_test_application_id(), "com.example.tests");
    }
}
