use super::*;

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::thread;

use super::transport::{DeviceTransport, ShellOutputReceiver, TransportError};

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    shell_responses: Vec<(String, String)>,
}

struct FakeTransport {
    serial: Option<String>,
    name: String,
    density: i32,
    state: Arc<StdMutex<FakeState>>,
    fail_pull: bool,
    fail_shell_containing: Option<String>,
    work_delay: Duration,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl FakeTransport {
    fn new(serial: Option<&str>, name: &str) -> Self {
        Self {
            serial: serial.map(str::to_string),
            name: name.to_string(),
            density: 420,
            state: Arc::new(StdMutex::new(FakeState::default())),
            fail_pull: false,
            fail_shell_containing: None,
            work_delay: Duration::ZERO,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn respond_to(self, prefix: &str, output: &str) -> Self {
        self.state
            .lock()
            .expect("fake state")
            .shell_responses
            .push((prefix.to_string(), output.to_string()));
        self
    }

    fn recorded_calls(state: &Arc<StdMutex<FakeState>>) -> Vec<String> {
        state.lock().expect("fake state").calls.clone()
    }
}

impl DeviceTransport for FakeTransport {
    fn execute_shell_command(
        &self,
        command: &str,
        receiver: &mut dyn ShellOutputReceiver,
        _max_timeout: Option<Duration>,
        _max_time_to_output: Duration,
    ) -> Result<(), TransportError> {
        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(current, Ordering::SeqCst);
        if !self.work_delay.is_zero() {
            thread::sleep(self.work_delay);
        }

        let response = {
            let mut state = self.state.lock().expect("fake state");
            state.calls.push(format!("shell:{command}"));
            state
                .shell_responses
                .iter()
                .find(|(prefix, _)| command.starts_with(prefix.as_str()))
                .map(|(_, output)| output.clone())
        };

        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(needle) = &self.fail_shell_containing {
            if command.contains(needle.as_str()) {
                return Err(TransportError::rejected(format!(
                    "refused command containing {needle}"
                )));
            }
        }
        if let Some(output) = response {
            receiver.add_output(output.as_bytes());
        }
        receiver.flush();
        Ok(())
    }

    fn pull_file(&self, remote_path: &str, local_path: &str) -> Result<(), TransportError> {
        self.state
            .lock()
            .expect("fake state")
            .calls
            .push(format!("pull:{remote_path}->{local_path}"));
        if self.fail_pull {
            return Err(TransportError::io("device disappeared during pull"));
        }
        std::fs::write(local_path, b"\xC0\xC0coverage").map_err(|err| {
            TransportError::io(format!("failed to write local file: {err}"))
        })
    }

    fn push_file(&self, local_path: &str, remote_path: &str) -> Result<(), TransportError> {
        self.state
            .lock()
            .expect("fake state")
            .calls
            .push(format!("push:{local_path}->{remote_path}"));
        Ok(())
    }

    fn install_package(
        &self,
        path: &str,
        _reinstall: bool,
        _extra_arg: Option<&str>,
    ) -> Result<(), TransportError> {
        self.state
            .lock()
            .expect("fake state")
            .calls
            .push(format!("install:{path}"));
        Ok(())
    }

    fn get_system_property(&self, name: &str) -> Result<Option<String>, TransportError> {
        self.state
            .lock()
            .expect("fake state")
            .calls
            .push(format!("getprop:{name}"));
        Ok(Some("fake-value".to_string()))
    }

    fn serial_number(&self) -> Option<String> {
        self.serial.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn density(&self) -> i32 {
        self.density
    }

    fn is_emulator(&self) -> bool {
        false
    }

    fn is_online(&self) -> bool {
        true
    }
}

fn channel(transport: FakeTransport) -> DeviceChannel {
    DeviceChannel::new(Box::new(transport), Vec::new())
}

#[test]
fn concurrent_shell_commands_never_overlap() {
    let mut transport = FakeTransport::new(Some("serial-1"), "Pixel");
    transport.work_delay = Duration::from_millis(20);
    let max_active = Arc::clone(&transport.max_active);
    let state = Arc::clone(&transport.state);
    let channel = Arc::new(channel(transport));

    let mut handles = Vec::new();
    for index in 0..6 {
        let channel = Arc::clone(&channel);
        handles.push(thread::spawn(move || {
            channel
                .execute_shell_command(&format!("echo {index}"))
                .expect("shell command");
        }));
    }
    for handle in handles {
        handle.join().expect("join");
    }

    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert_eq!(FakeTransport::recorded_calls(&state).len(), 6);
}

#[test]
fn secure_word_scan_does_not_alter_command_text() {
    let transport = FakeTransport::new(Some("serial-1"), "Pixel");
    let state = Arc::clone(&transport.state);
    let channel = DeviceChannel::new(
        Box::new(transport),
        vec!["password".to_string(), "token".to_string()],
    );

    channel
        .execute_shell_command("am instrument -e PassWord hunter2 runner")
        .expect("shell command");

    let calls = FakeTransport::recorded_calls(&state);
    assert_eq!(
        calls,
        vec!["shell:am instrument -e PassWord hunter2 runner".to_string()]
    );
}

#[test]
fn screen_metrics_computed_once_and_converted_to_dp() {
    let transport = FakeTransport::new(Some("serial-1"), "Pixel")
        .respond_to("dumpsys window", "    init=1080x1920 420dpi\n");
    let state = Arc::clone(&transport.state);
    let channel = channel(transport);

    assert_eq!(channel.width(), 1080);
    assert_eq!(channel.height(), 1920);
    assert_eq!(channel.width_in_dp(), 411);
    assert_eq!(channel.height_in_dp(), 731);

    let dump_calls = FakeTransport::recorded_calls(&state)
        .iter()
        .filter(|call| call.starts_with("shell:dumpsys window"))
        .count();
    assert_eq!(dump_calls, 1);
}

#[test]
fn unparsable_window_dump_degrades_to_unknown_metrics() {
    let transport = FakeTransport::new(Some("serial-1"), "Pixel")
        .respond_to("dumpsys window", "nothing useful here\n");
    let state = Arc::clone(&transport.state);
    let channel = channel(transport);

    assert_eq!(channel.width(), 0);
    assert_eq!(channel.height(), 0);

    // Unknown still counts as computed; no re-query on later access.
    assert_eq!(channel.width(), 0);
    let dump_calls = FakeTransport::recorded_calls(&state)
        .iter()
        .filter(|call| call.starts_with("shell:dumpsys window"))
        .count();
    assert_eq!(dump_calls, 1);
}

#[test]
fn returns_collected_shell_output() {
    let transport =
        FakeTransport::new(Some("serial-1"), "Pixel").respond_to("getprop", "[ro.x]: [1]\n");
    let channel = channel(transport);

    let output = channel
        .execute_shell_command_and_return_output("getprop")
        .expect("shell command");
    assert_eq!(output, "[ro.x]: [1]\n");
}

#[test]
fn coverage_pull_runs_three_steps_in_order() {
    let out_dir = tempfile::tempdir().expect("temp dir");
    let transport = FakeTransport::new(Some("serial-1"), "Pixel");
    let state = Arc::clone(&transport.state);
    let channel = channel(transport);

    let request = CoverageRequest {
        application_id: "com.example.app".to_string(),
        coverage_file_prefix: "Pixel".to_string(),
        remote_coverage_file: "/data/data/com.example.app/coverage.ec".to_string(),
        output_dir: out_dir.path().to_path_buf(),
    };
    let local_path = channel.pull_coverage_file(&request).expect("coverage");

    assert_eq!(
        local_path,
        out_dir.path().join("Pixel-coverage.ec"),
    );
    assert!(local_path.exists());

    let calls = FakeTransport::recorded_calls(&state);
    assert_eq!(calls.len(), 3);
    assert_eq!(
        calls[0],
        "shell:run-as com.example.app cat /data/data/com.example.app/coverage.ec \
         | cat > /data/local/tmp/com.example.app.coverage.ec"
    );
    assert!(calls[1].starts_with("pull:/data/local/tmp/com.example.app.coverage.ec->"));
    assert_eq!(calls[2], "shell:rm /data/local/tmp/com.example.app.coverage.ec");
}

#[test]
fn coverage_pull_failure_skips_cleanup_and_preserves_cause() {
    let out_dir = tempfile::tempdir().expect("temp dir");
    let mut transport = FakeTransport::new(Some("serial-1"), "Pixel");
    transport.fail_pull = true;
    let state = Arc::clone(&transport.state);
    let channel = channel(transport);

    let request = CoverageRequest {
        application_id: "com.example.app".to_string(),
        coverage_file_prefix: "Pixel".to_string(),
        remote_coverage_file: "/data/data/com.example.app/coverage.ec".to_string(),
        output_dir: out_dir.path().to_path_buf(),
    };
    let err = channel
        .pull_coverage_file(&request)
        .expect_err("expected pull failure");

    assert!(err.source().is_some());

    let calls = FakeTransport::recorded_calls(&state);
    assert_eq!(calls.len(), 2, "cleanup must not run after a failed pull");
    assert!(calls[0].starts_with("shell:run-as"));
    assert!(calls[1].starts_with("pull:"));
}

#[test]
fn coverage_copy_failure_skips_pull_and_cleanup() {
    let out_dir = tempfile::tempdir().expect("temp dir");
    let mut transport = FakeTransport::new(Some("serial-1"), "Pixel");
    transport.fail_shell_containing = Some("run-as".to_string());
    let state = Arc::clone(&transport.state);
    let channel = channel(transport);

    let request = CoverageRequest {
        application_id: "com.example.app".to_string(),
        coverage_file_prefix: "Pixel".to_string(),
        remote_coverage_file: "/data/data/com.example.app/coverage.ec".to_string(),
        output_dir: out_dir.path().to_path_buf(),
    };
    channel
        .pull_coverage_file(&request)
        .expect_err("expected copy failure");

    assert_eq!(FakeTransport::recorded_calls(&state).len(), 1);
}

#[test]
fn channels_with_equal_serials_are_equal() {
    let a = channel(FakeTransport::new(Some("serial-1"), "Pixel"));
    let b = channel(FakeTransport::new(Some("serial-1"), "Nexus"));
    assert_eq!(a, b);
}

#[test]
fn channels_with_differing_serials_are_unequal() {
    let a = channel(FakeTransport::new(Some("serial-1"), "Pixel"));
    let b = channel(FakeTransport::new(Some("serial-2"), "Pixel"));
    assert_ne!(a, b);
}

#[test]
fn serialless_channels_compare_by_name() {
    let a = channel(FakeTransport::new(None, "Pixel"));
    let b = channel(FakeTransport::new(None, "Pixel"));
    let c = channel(FakeTransport::new(None, "Nexus"));
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn serial_and_serialless_channels_are_unequal() {
    let a = channel(FakeTransport::new(Some("serial-1"), "Pixel"));
    let b = channel(FakeTransport::new(None, "Pixel"));
    assert_ne!(a, b);
}

#[test]
fn sanitized_variant_sends_raw_command() {
    let transport = FakeTransport::new(Some("serial-1"), "Pixel");
    let state = Arc::clone(&transport.state);
    let channel = channel(transport);

    let command = ShellCommand::new("am instrument -e token s3cret runner")
        .logged_as("am instrument -e token **** runner")
        .max_timeout(Duration::from_secs(60));
    let mut receiver = CollectingReceiver::new();
    channel.execute(&command, &mut receiver).expect("execute");

    assert_eq!(
        FakeTransport::recorded_calls(&state),
        vec!["shell:am instrument -e token s3cret runner".to_string()]
    );
}
