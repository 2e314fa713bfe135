use std::error::Error;
use std::fmt;
use std::sync::Arc;

type Cause = Arc<dyn Error + Send + Sync + 'static>;

/// Failure of a single channel operation: shell execution, file transfer,
/// property query or screen-metrics computation. Timeout/unresponsive/rejected
/// transport conditions arrive here unmasked through `source()`.
#[derive(Debug, Clone)]
pub struct CommandExecutionError {
    pub operation: String,
    pub message: String,
    pub trace_id: String,
    source: Option<Cause>,
}

impl CommandExecutionError {
    pub fn new(
        operation: impl Into<String>,
        message: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            trace_id: trace_id.into(),
            source: None,
        }
    }

    pub fn with_cause(
        operation: impl Into<String>,
        message: impl Into<String>,
        trace_id: impl Into<String>,
        cause: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            trace_id: trace_id.into(),
            source: Some(Arc::new(cause)),
        }
    }
}

impl fmt::Display for CommandExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

impl Error for CommandExecutionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn Error + 'static))
    }
}

/// Failure anywhere within the 3-step coverage retrieval protocol. Distinct
/// from and independent of the test pass/fail status.
#[derive(Debug, Clone)]
pub struct PullCoverageError {
    pub message: String,
    source: Option<Cause>,
}

impl PullCoverageError {
    pub fn new(message: impl Into<String>, cause: impl Error + Send + Sync + 'static) -> Self {
        Self {
            message: message.into(),
            source: Some(Arc::new(cause)),
        }
    }
}

impl fmt::Display for PullCoverageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pull coverage failed: {}", self.message)
    }
}

impl Error for PullCoverageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn Error + 'static))
    }
}

/// Failure during orchestration (runner construction or execution). Aborts the
/// per-device run with no partial result.
#[derive(Debug, Clone)]
pub struct ExecuteCommandError {
    pub message: String,
    source: Option<Cause>,
}

impl ExecuteCommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_cause(
        message: impl Into<String>,
        cause: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Arc::new(cause)),
        }
    }
}

impl fmt::Display for ExecuteCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execute command failed: {}", self.message)
    }
}

impl Error for ExecuteCommandError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn Error + 'static))
    }
}
