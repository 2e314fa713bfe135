use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

/// Receives shell-command output as it is produced by the device.
pub trait ShellOutputReceiver: Send {
    fn add_output(&mut self, data: &[u8]);
    fn flush(&mut self) {}
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Accumulates all output into a string, shared so callers can read it back
/// after handing the receiver to the channel.
#[derive(Clone, Default)]
pub struct CollectingReceiver {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CollectingReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> String {
        let buffer = self.buffer.lock().expect("receiver buffer poisoned");
        String::from_utf8_lossy(&buffer).to_string()
    }
}

impl ShellOutputReceiver for CollectingReceiver {
    fn add_output(&mut self, data: &[u8]) {
        self.buffer
            .lock()
            .expect("receiver buffer poisoned")
            .extend_from_slice(data);
    }
}

/// Logs each completed output line at debug level, tagged with the serial the
/// output came from. Used by the coverage protocol.
pub struct MultilineLogReceiver {
    serial: String,
    pending: Vec<u8>,
}

impl MultilineLogReceiver {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            pending: Vec::new(),
        }
    }

    fn drain_lines(&mut self) {
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim_end();
            if !trimmed.is_empty() {
                debug!(serial = %self.serial, "{}", trimmed);
            }
        }
    }
}

impl ShellOutputReceiver for MultilineLogReceiver {
    fn add_output(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
        self.drain_lines();
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            let text = String::from_utf8_lossy(&self.pending).to_string();
            let trimmed = text.trim_end();
            if !trimmed.is_empty() {
                debug!(serial = %self.serial, "{}", trimmed);
            }
            self.pending.clear();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Unresponsive,
    Rejected,
    Io,
}

/// Raw transport failure. The channel wraps these without masking the kind.
#[derive(Debug, Clone)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Rejected, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Io, message)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Unresponsive => "unresponsive",
            TransportErrorKind::Rejected => "rejected",
            TransportErrorKind::Io => "io",
        };
        write!(f, "{kind}: {}", self.message)
    }
}

impl Error for TransportError {}

/// The raw per-device transport the channel consumes. Implementations are not
/// required to serialize calls; the channel does that.
pub trait DeviceTransport: Send {
    fn execute_shell_command(
        &self,
        command: &str,
        receiver: &mut dyn ShellOutputReceiver,
        max_timeout: Option<Duration>,
        max_time_to_output: Duration,
    ) -> Result<(), TransportError>;

    fn pull_file(&self, remote_path: &str, local_path: &str) -> Result<(), TransportError>;

    fn push_file(&self, local_path: &str, remote_path: &str) -> Result<(), TransportError>;

    fn install_package(
        &self,
        path: &str,
        reinstall: bool,
        extra_arg: Option<&str>,
    ) -> Result<(), TransportError>;

    fn get_system_property(&self, name: &str) -> Result<Option<String>, TransportError>;

    fn serial_number(&self) -> Option<String>;

    fn name(&self) -> String;

    fn density(&self) -> i32;

    fn is_emulator(&self) -> bool;

    fn is_online(&self) -> bool;
}
