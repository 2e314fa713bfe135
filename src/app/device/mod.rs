use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::error::{CommandExecutionError, PullCoverageError};

pub mod adb;
pub mod screen;
pub mod transport;

use self::screen::{px_to_dp, ScreenMetrics, ScreenSize};
use self::transport::{
    CollectingReceiver, DeviceTransport, MultilineLogReceiver, ShellOutputReceiver,
};

pub const COVERAGE_FILE_NAME: &str = "coverage.ec";
const SCREEN_SIZE_COMMAND: &str = "dumpsys window";
const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(300);
const COVERAGE_COPY_TIMEOUT: Duration = Duration::from_secs(120);
const COVERAGE_CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

/// A shell command value: command text, the variant of it that is safe to log,
/// and its timeout bounds. Immutable once constructed.
pub struct ShellCommand {
    command: String,
    logged_command: String,
    max_timeout: Option<Duration>,
    max_time_to_output: Duration,
}

impl ShellCommand {
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            logged_command: command.clone(),
            command,
            max_timeout: None,
            max_time_to_output: DEFAULT_SHELL_TIMEOUT,
        }
    }

    /// Sets the string used for logging. Erase tokens, passwords and other
    /// secure information here.
    pub fn logged_as(mut self, logged_command: impl Into<String>) -> Self {
        self.logged_command = logged_command.into();
        self
    }

    pub fn max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = Some(timeout);
        self
    }

    pub fn max_time_to_output(mut self, timeout: Duration) -> Self {
        self.max_time_to_output = timeout;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn logged_command(&self) -> &str {
        &self.logged_command
    }
}

/// Inputs for the coverage retrieval protocol.
#[derive(Debug, Clone)]
pub struct CoverageRequest {
    pub application_id: String,
    pub coverage_file_prefix: String,
    pub remote_coverage_file: String,
    pub output_dir: PathBuf,
}

struct ChannelInner {
    transport: Box<dyn DeviceTransport>,
    metrics: ScreenMetrics,
}

/// Owns exclusive access to one connected device.
///
/// Every operation acquires the same per-instance lock for its full duration,
/// so commands from multiple logical callers never interleave on one physical
/// device. Adds secure-word classification of command text and verbose
/// logging on top of the raw transport.
pub struct DeviceChannel {
    secure_words: Vec<String>,
    inner: Mutex<ChannelInner>,
}

impl DeviceChannel {
    /// `secure_words` are matched case-insensitively against command text; a
    /// hit produces an advisory warning, never a rejected command.
    pub fn new(transport: Box<dyn DeviceTransport>, secure_words: Vec<String>) -> Self {
        Self {
            secure_words: secure_words
                .into_iter()
                .map(|word| word.to_lowercase())
                .collect(),
            inner: Mutex::new(ChannelInner {
                transport,
                metrics: ScreenMetrics::Uncomputed,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelInner> {
        self.inner.lock().expect("device channel lock poisoned")
    }

    fn warn_on_secure_words(&self, command: &str) {
        let lowered = command.to_lowercase();
        for word in &self.secure_words {
            if lowered.contains(word) {
                warn!(
                    word = %word,
                    "shell command contains secure word and likely has secure information \
                     which can appear in logs at debug level; consider executing it with a \
                     sanitized logging string"
                );
            }
        }
    }

    fn shell_locked(
        inner: &mut ChannelInner,
        command: &str,
        logged_command: &str,
        receiver: &mut dyn ShellOutputReceiver,
        max_timeout: Option<Duration>,
        max_time_to_output: Duration,
        trace_id: &str,
    ) -> Result<(), CommandExecutionError> {
        debug!(trace_id = %trace_id, command = %logged_command, "execute shell command");
        inner
            .transport
            .execute_shell_command(command, receiver, max_timeout, max_time_to_output)
            .map_err(|err| {
                CommandExecutionError::with_cause(
                    "executeShellCommand",
                    format!("\"{logged_command}\" failed"),
                    trace_id,
                    err,
                )
            })
    }

    /// Executes a shell command, streaming output into `receiver`.
    pub fn execute_shell_command_with_receiver(
        &self,
        command: &str,
        receiver: &mut dyn ShellOutputReceiver,
        max_time_to_output: Duration,
    ) -> Result<(), CommandExecutionError> {
        self.warn_on_secure_words(command);
        let trace_id = Uuid::new_v4().to_string();
        let mut inner = self.lock();
        Self::shell_locked(
            &mut inner,
            command,
            command,
            receiver,
            None,
            max_time_to_output,
            &trace_id,
        )
    }

    /// Like [`execute_shell_command_with_receiver`], but logs `logged_command`
    /// instead of the raw command text. No secure-word scan runs on this path;
    /// the caller has already sanitized the logged variant.
    ///
    /// [`execute_shell_command_with_receiver`]: Self::execute_shell_command_with_receiver
    pub fn execute_shell_command_full(
        &self,
        command: &str,
        logged_command: &str,
        receiver: &mut dyn ShellOutputReceiver,
        max_timeout: Option<Duration>,
        max_time_to_output: Duration,
    ) -> Result<(), CommandExecutionError> {
        let trace_id = Uuid::new_v4().to_string();
        let mut inner = self.lock();
        Self::shell_locked(
            &mut inner,
            command,
            logged_command,
            receiver,
            max_timeout,
            max_time_to_output,
            &trace_id,
        )
    }

    /// Executes a shell command, discarding output.
    pub fn execute_shell_command(&self, command: &str) -> Result<(), CommandExecutionError> {
        let mut receiver = CollectingReceiver::new();
        self.execute_shell_command_with_receiver(command, &mut receiver, DEFAULT_SHELL_TIMEOUT)
    }

    /// Executes a shell command and returns its collected output text.
    pub fn execute_shell_command_and_return_output(
        &self,
        command: &str,
    ) -> Result<String, CommandExecutionError> {
        let receiver = CollectingReceiver::new();
        let mut handle = receiver.clone();
        self.execute_shell_command_with_receiver(command, &mut handle, DEFAULT_SHELL_TIMEOUT)?;
        Ok(receiver.output())
    }

    /// Executes a preconfigured [`ShellCommand`], streaming output into
    /// `receiver`.
    pub fn execute(
        &self,
        command: &ShellCommand,
        receiver: &mut dyn ShellOutputReceiver,
    ) -> Result<(), CommandExecutionError> {
        self.execute_shell_command_full(
            &command.command,
            &command.logged_command,
            receiver,
            command.max_timeout,
            command.max_time_to_output,
        )
    }

    pub fn pull_file(
        &self,
        remote_path: &str,
        local_path: &str,
    ) -> Result<(), CommandExecutionError> {
        let trace_id = Uuid::new_v4().to_string();
        debug!(trace_id = %trace_id, path = %remote_path, "pull file");
        let inner = self.lock();
        inner.transport.pull_file(remote_path, local_path).map_err(|err| {
            CommandExecutionError::with_cause(
                "pullFile",
                format!("\"{remote_path}\" -> \"{local_path}\" failed"),
                trace_id,
                err,
            )
        })
    }

    pub fn push_file(
        &self,
        local_path: &str,
        remote_path: &str,
    ) -> Result<(), CommandExecutionError> {
        let trace_id = Uuid::new_v4().to_string();
        debug!(trace_id = %trace_id, path = %remote_path, "push file");
        let inner = self.lock();
        inner.transport.push_file(local_path, remote_path).map_err(|err| {
            CommandExecutionError::with_cause(
                "pushFile",
                format!("\"{local_path}\" -> \"{remote_path}\" failed"),
                trace_id,
                err,
            )
        })
    }

    pub fn install_package(
        &self,
        path: &str,
        reinstall: bool,
        extra_arg: Option<&str>,
    ) -> Result<(), CommandExecutionError> {
        let trace_id = Uuid::new_v4().to_string();
        debug!(trace_id = %trace_id, path = %path, "install package");
        let inner = self.lock();
        inner
            .transport
            .install_package(path, reinstall, extra_arg)
            .map_err(|err| {
                CommandExecutionError::with_cause(
                    "installPackage",
                    format!("\"{path}\" failed"),
                    trace_id,
                    err,
                )
            })
    }

    pub fn get_system_property(
        &self,
        name: &str,
    ) -> Result<Option<String>, CommandExecutionError> {
        let trace_id = Uuid::new_v4().to_string();
        let inner = self.lock();
        inner.transport.get_system_property(name).map_err(|err| {
            CommandExecutionError::with_cause(
                "getSystemProperty",
                format!("\"{name}\" failed"),
                trace_id,
                err,
            )
        })
    }

    pub fn name(&self) -> String {
        self.lock().transport.name()
    }

    pub fn serial_number(&self) -> Option<String> {
        self.lock().transport.serial_number()
    }

    pub fn is_emulator(&self) -> bool {
        self.lock().transport.is_emulator()
    }

    pub fn is_online(&self) -> bool {
        self.lock().transport.is_online()
    }

    pub fn density(&self) -> i32 {
        self.lock().transport.density()
    }

    /// Computes screen metrics under an already-held lock. Runs at most once
    /// per channel; a window dump that cannot be parsed degrades to
    /// [`ScreenSize::UNKNOWN`] rather than failing the caller.
    fn metrics_locked(inner: &mut ChannelInner) -> ScreenSize {
        if let ScreenMetrics::Computed(size) = inner.metrics {
            return size;
        }
        let trace_id = Uuid::new_v4().to_string();
        let receiver = CollectingReceiver::new();
        let mut handle = receiver.clone();
        let size = match Self::shell_locked(
            inner,
            SCREEN_SIZE_COMMAND,
            SCREEN_SIZE_COMMAND,
            &mut handle,
            None,
            DEFAULT_SHELL_TIMEOUT,
            &trace_id,
        ) {
            Ok(()) => {
                let output = receiver.output();
                match screen::parse_screen_size(&output) {
                    Some(size) => size,
                    None => {
                        warn!(trace_id = %trace_id, "failed to parse screen size from window dump");
                        ScreenSize::UNKNOWN
                    }
                }
            }
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "failed to query screen size");
                ScreenSize::UNKNOWN
            }
        };
        inner.metrics = ScreenMetrics::Computed(size);
        size
    }

    pub fn width(&self) -> u32 {
        Self::metrics_locked(&mut self.lock()).width
    }

    pub fn height(&self) -> u32 {
        Self::metrics_locked(&mut self.lock()).height
    }

    pub fn width_in_dp(&self) -> i64 {
        let mut inner = self.lock();
        let size = Self::metrics_locked(&mut inner);
        px_to_dp(size.width, inner.transport.density())
    }

    pub fn height_in_dp(&self) -> i64 {
        let mut inner = self.lock();
        let size = Self::metrics_locked(&mut inner);
        px_to_dp(size.height, inner.transport.density())
    }

    /// Pulls the coverage file produced by an instrumented run.
    ///
    /// Three steps under one lock hold, so no other caller can interleave:
    /// copy the app-private coverage file to a world-readable temp path via
    /// `run-as`, pull it to `<output_dir>/<prefix>-coverage.ec`, then remove
    /// the temp copy. If the copy or the pull fails, cleanup is skipped and
    /// the temp file may be left behind on the device.
    pub fn pull_coverage_file(
        &self,
        request: &CoverageRequest,
    ) -> Result<PathBuf, PullCoverageError> {
        let trace_id = Uuid::new_v4().to_string();
        info!(
            trace_id = %trace_id,
            coverage_file = %request.remote_coverage_file,
            "fetching coverage data"
        );

        let mut inner = self.lock();
        let serial = inner
            .transport
            .serial_number()
            .unwrap_or_else(|| inner.transport.name());
        let mut receiver = MultilineLogReceiver::new(serial);

        let temporary_copy = format!(
            "/data/local/tmp/{}.{}",
            request.application_id, COVERAGE_FILE_NAME
        );
        let copy_command = format!(
            "run-as {} cat {} | cat > {}",
            request.application_id, request.remote_coverage_file, temporary_copy
        );
        Self::shell_locked(
            &mut inner,
            &copy_command,
            &copy_command,
            &mut receiver,
            None,
            COVERAGE_COPY_TIMEOUT,
            &trace_id,
        )
        .map_err(|err| PullCoverageError::new("staging coverage file on device", err))?;

        let local_path = request.output_dir.join(format!(
            "{}-{}",
            request.coverage_file_prefix, COVERAGE_FILE_NAME
        ));
        inner
            .transport
            .pull_file(&temporary_copy, &local_path.to_string_lossy())
            .map_err(|err| {
                PullCoverageError::new(
                    "pulling coverage file",
                    CommandExecutionError::with_cause(
                        "pullFile",
                        format!("\"{temporary_copy}\" failed"),
                        trace_id.as_str(),
                        err,
                    ),
                )
            })?;

        let cleanup_command = format!("rm {temporary_copy}");
        Self::shell_locked(
            &mut inner,
            &cleanup_command,
            &cleanup_command,
            &mut receiver,
            None,
            COVERAGE_CLEANUP_TIMEOUT,
            &trace_id,
        )
        .map_err(|err| PullCoverageError::new("removing temporary coverage copy", err))?;

        Ok(local_path)
    }
}

/// Two channels address the same device iff both serials are present and
/// equal, or both are absent and the names are equal.
impl PartialEq for DeviceChannel {
    fn eq(&self, other: &Self) -> bool {
        let serial = self.serial_number();
        let other_serial = other.serial_number();
        match (serial, other_serial) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.name() == other.name(),
            _ => false,
        }
    }
}

impl fmt::Display for DeviceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        write!(
            f,
            "DeviceChannel{{sn={:?}, online={}, name='{}'}}",
            inner.transport.serial_number(),
            inner.transport.is_online(),
            inner.transport.name()
        )
    }
}

impl fmt::Debug for DeviceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests;
