use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use tracing::{error, info};

use crate::app::config::{Environment, InstrumentationConfig};
use crate::app::device::{CoverageRequest, DeviceChannel};
use crate::app::error::{CommandExecutionError, ExecuteCommandError};
use crate::app::models::{DeviceCommandResult, TestRunResult};
use crate::app::planner::{DiscoveredTest, TestPlan, TestPlanElement};

/// A unit of per-device work.
pub trait DeviceRunnerCommand: Send + Sync {
    fn execute(&self, device: &DeviceChannel) -> Result<DeviceCommandResult, ExecuteCommandError>;
}

/// Reporting collaborator fed by the test runner while a dispatch sequence
/// executes. The report format itself is out of scope here.
pub trait RunListener: Send {
    fn test_started(&mut self, test: &TestPlanElement);
    fn test_failed(&mut self, test: &TestPlanElement, message: &str);
    fn test_finished(&mut self, test: &TestPlanElement);
    fn run_result(&self) -> TestRunResult;
}

/// External test-runner collaborator: drives a dispatch sequence against a
/// device channel, reporting through the listener.
pub trait TestRunner: Send {
    fn run(
        &self,
        device: &DeviceChannel,
        dispatch: &[TestPlanElement],
        listener: &mut dyn RunListener,
    ) -> Result<(), CommandExecutionError>;
}

/// Builds the runner and listener pair for one device. Construction failures
/// abort the device's run.
pub trait TestRunnerBuilder: Send + Sync {
    #[allow(clippy::type_complexity)]
    fn build(
        &self,
        device: &DeviceChannel,
        args: &HashMap<String, String>,
    ) -> Result<(Box<dyn TestRunner>, Box<dyn RunListener>), ExecuteCommandError>;
}

/// Runs the instrumentation test plan on one device and, when enabled, pulls
/// the coverage artifact afterwards.
pub struct InstrumentalTestCommand {
    config: InstrumentationConfig,
    instrumentation_args: HashMap<String, String>,
    environment: Environment,
    tests: Vec<DiscoveredTest>,
    builder: Arc<dyn TestRunnerBuilder>,
}

impl InstrumentalTestCommand {
    pub fn new(
        config: InstrumentationConfig,
        instrumentation_args: HashMap<String, String>,
        environment: Environment,
        tests: Vec<DiscoveredTest>,
        builder: Arc<dyn TestRunnerBuilder>,
    ) -> Self {
        Self {
            config,
            instrumentation_args,
            environment,
            tests,
            builder,
        }
    }

    fn pull_coverage(&self, device: &DeviceChannel, result: &mut DeviceCommandResult) {
        let request = CoverageRequest {
            application_id: self.config.application_id.clone(),
            coverage_file_prefix: device.name(),
            remote_coverage_file: self.config.resolved_remote_coverage_file(),
            output_dir: self.environment.coverage_dir.clone(),
        };
        match device.pull_coverage_file(&request) {
            Ok(path) => {
                info!(serial = ?device.serial_number(), path = %path.display(), "coverage artifact pulled");
                result.coverage_artifact = Some(path);
            }
            Err(err) => {
                // Reported separately; the pass/fail outcome is already set.
                error!(serial = ?device.serial_number(), error = %err, "coverage retrieval failed");
                result.coverage_error = Some(err);
            }
        }
    }
}

impl DeviceRunnerCommand for InstrumentalTestCommand {
    fn execute(&self, device: &DeviceChannel) -> Result<DeviceCommandResult, ExecuteCommandError> {
        let plan = TestPlan::build(&self.tests);
        info!(
            serial = ?device.serial_number(),
            tests = plan.flattened().len(),
            compound_units = plan.compound().len(),
            "starting instrumentation run"
        );

        let (runner, mut listener) = self.builder.build(device, &self.instrumentation_args)?;

        runner
            .run(device, plan.flattened(), listener.as_mut())
            .map_err(|err| ExecuteCommandError::with_cause("test runner failed", err))?;

        let run_result = listener.run_result();
        let mut result = DeviceCommandResult {
            failed: run_result.failed,
            ..Default::default()
        };

        // Coverage runs after the tests regardless of their outcome.
        if self.config.coverage_enabled {
            self.pull_coverage(device, &mut result);
        }
        Ok(result)
    }
}

/// Executes `command` once per device, one worker thread per device. Workers
/// for distinct devices run concurrently with no cross-device coordination;
/// same-device traffic is serialized by the channel itself.
pub fn run_on_devices(
    command: Arc<dyn DeviceRunnerCommand>,
    devices: &[Arc<DeviceChannel>],
) -> Vec<(String, Result<DeviceCommandResult, ExecuteCommandError>)> {
    let mut handles = Vec::new();
    for device in devices {
        let command = Arc::clone(&command);
        let device = Arc::clone(device);
        handles.push(thread::spawn(move || {
            let name = device.name();
            (name, command.execute(&device))
        }));
    }
    handles
        .into_iter()
        .map(|handle| handle.join().expect("device worker panicked"))
        .collect()
}
