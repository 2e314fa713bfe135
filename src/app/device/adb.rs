use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::app::device::transport::{
    DeviceTransport, ShellOutputReceiver, TransportError, TransportErrorKind,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const FILE_OP_TIMEOUT: Duration = Duration::from_secs(300);

/// `DeviceTransport` backed by the adb host binary. One instance per serial;
/// the channel layered on top serializes calls.
pub struct AdbTransport {
    program: String,
    serial: String,
    cached_density: Mutex<Option<i32>>,
    cached_name: Mutex<Option<String>>,
}

impl AdbTransport {
    pub fn new(program: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            serial: serial.into(),
            cached_density: Mutex::new(None),
            cached_name: Mutex::new(None),
        }
    }

    fn spawn(&self, args: &[&str]) -> Result<Child, TransportError> {
        Command::new(&self.program)
            .arg("-s")
            .arg(&self.serial)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| TransportError::io(format!("failed to spawn adb: {err}")))
    }

    /// Runs an adb subcommand to completion, collecting stdout. Non-zero exit
    /// is reported as a rejected command with stderr attached.
    fn run_collected(&self, args: &[&str], timeout: Duration) -> Result<String, TransportError> {
        let mut child = self.spawn(args)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::io("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransportError::io("failed to capture stderr"))?;

        // Drain both pipes off-thread so a chatty child cannot block on a full
        // pipe buffer and trip the timeout.
        let stdout_handle = std::thread::spawn(move || drain(stdout));
        let stderr_handle = std::thread::spawn(move || drain(stderr));

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() > timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = stdout_handle.join();
                        let _ = stderr_handle.join();
                        return Err(TransportError::timeout(format!(
                            "adb {} timed out after {:?}",
                            args.first().copied().unwrap_or(""),
                            timeout
                        )));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(TransportError::io(format!("failed to poll adb: {err}")));
                }
            }
        };

        let stdout_bytes = stdout_handle.join().unwrap_or_default();
        let stderr_bytes = stderr_handle.join().unwrap_or_default();

        if !status.success() {
            return Err(TransportError::rejected(format!(
                "adb {} exited with {:?}: {}",
                args.first().copied().unwrap_or(""),
                status.code(),
                String::from_utf8_lossy(&stderr_bytes).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&stdout_bytes).to_string())
    }

    fn getprop(&self, name: &str) -> Result<Option<String>, TransportError> {
        let output = self.run_collected(&["shell", "getprop", name], Duration::from_secs(10))?;
        let value = output.trim();
        if value.is_empty() {
            Ok(None)
        } else {
            Ok(Some(value.to_string()))
        }
    }
}

fn drain(mut reader: impl Read) -> Vec<u8> {
    let mut buffer = Vec::<u8>::new();
    let mut temp = [0u8; 4096];
    loop {
        match reader.read(&mut temp) {
            Ok(0) => break,
            Ok(count) => buffer.extend_from_slice(&temp[..count]),
            Err(_) => break,
        }
    }
    buffer
}

impl DeviceTransport for AdbTransport {
    fn execute_shell_command(
        &self,
        command: &str,
        receiver: &mut dyn ShellOutputReceiver,
        max_timeout: Option<Duration>,
        max_time_to_output: Duration,
    ) -> Result<(), TransportError> {
        let mut child = self.spawn(&["shell", command])?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::io("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransportError::io("failed to capture stderr"))?;
        let stderr_handle = std::thread::spawn(move || drain(stderr));

        // Stream chunks back on a channel so output reaches the receiver as it
        // is produced and unresponsiveness can be detected.
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let reader_handle = std::thread::spawn(move || {
            let mut reader = stdout;
            let mut temp = [0u8; 4096];
            loop {
                match reader.read(&mut temp) {
                    Ok(0) => break,
                    Ok(count) => {
                        if tx.send(temp[..count].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let start = Instant::now();
        let mut last_output = Instant::now();
        let result = loop {
            if receiver.is_cancelled() {
                break Ok(());
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(chunk) => {
                    receiver.add_output(&chunk);
                    last_output = Instant::now();
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    break Ok(());
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if last_output.elapsed() > max_time_to_output {
                        break Err(TransportError::new(
                            TransportErrorKind::Unresponsive,
                            format!("no output for {max_time_to_output:?}"),
                        ));
                    }
                    if let Some(max) = max_timeout {
                        if start.elapsed() > max {
                            break Err(TransportError::timeout(format!(
                                "shell command timed out after {max:?}"
                            )));
                        }
                    }
                }
            }
        };

        let _ = child.kill();
        let exit = child.wait();
        let _ = reader_handle.join();
        let _ = stderr_handle.join();
        receiver.flush();
        result?;

        match exit {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                debug!(serial = %self.serial, code = ?status.code(), "adb shell exited non-zero");
                Ok(())
            }
            Err(err) => Err(TransportError::io(format!("failed to reap adb: {err}"))),
        }
    }

    fn pull_file(&self, remote_path: &str, local_path: &str) -> Result<(), TransportError> {
        self.run_collected(&["pull", remote_path, local_path], FILE_OP_TIMEOUT)?;
        Ok(())
    }

    fn push_file(&self, local_path: &str, remote_path: &str) -> Result<(), TransportError> {
        self.run_collected(&["push", local_path, remote_path], FILE_OP_TIMEOUT)?;
        Ok(())
    }

    fn install_package(
        &self,
        path: &str,
        reinstall: bool,
        extra_arg: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut args = vec!["install"];
        if reinstall {
            args.push("-r");
        }
        if let Some(extra) = extra_arg {
            args.push(extra);
        }
        args.push(path);
        let output = self.run_collected(&args, FILE_OP_TIMEOUT)?;
        if output.to_uppercase().contains("FAILURE") {
            return Err(TransportError::rejected(format!(
                "install failed: {}",
                output.trim()
            )));
        }
        Ok(())
    }

    fn get_system_property(&self, name: &str) -> Result<Option<String>, TransportError> {
        self.getprop(name)
    }

    fn serial_number(&self) -> Option<String> {
        Some(self.serial.clone())
    }

    fn name(&self) -> String {
        let mut cached = self.cached_name.lock().expect("name cache poisoned");
        if let Some(name) = cached.as_ref() {
            return name.clone();
        }
        let name = self
            .getprop("ro.product.model")
            .ok()
            .flatten()
            .map(|model| model.replace(' ', "_"))
            .unwrap_or_else(|| self.serial.clone());
        *cached = Some(name.clone());
        name
    }

    fn density(&self) -> i32 {
        let mut cached = self.cached_density.lock().expect("density cache poisoned");
        if let Some(density) = *cached {
            return density;
        }
        let density = self
            .getprop("ro.sf.lcd_density")
            .ok()
            .flatten()
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);
        *cached = Some(density);
        density
    }

    fn is_emulator(&self) -> bool {
        self.serial.starts_with("emulator-")
    }

    fn is_online(&self) -> bool {
        self.run_collected(&["get-state"], Duration::from_secs(10))
            .map(|state| state.trim() == "device")
            .unwrap_or(false)
    }
}
