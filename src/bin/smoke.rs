use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use instrumental_runner::app::device::adb::AdbTransport;
use instrumental_runner::app::device::DeviceChannel;
use instrumental_runner::app::logging::init_logging;

#[derive(Serialize)]
struct SmokeSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    serial: String,
    name: String,
    is_emulator: bool,
    width: u32,
    height: u32,
    width_dp: i64,
    height_dp: i64,
    checks: HashMap<String, String>,
}

fn main() {
    init_logging();
    let trace_id = Uuid::new_v4().to_string();

    let mut args = std::env::args().skip(1);
    let serial = match args.next() {
        Some(serial) => serial,
        None => {
            eprintln!("usage: smoke <serial> [adb-path]");
            std::process::exit(2);
        }
    };
    let program = args.next().unwrap_or_else(|| "adb".to_string());

    let channel = DeviceChannel::new(
        Box::new(AdbTransport::new(program, serial.clone())),
        vec!["password".to_string(), "token".to_string()],
    );

    let mut checks = HashMap::new();
    match channel.execute_shell_command_and_return_output("echo smoke-ok") {
        Ok(output) if output.trim() == "smoke-ok" => {
            checks.insert("shell_echo".to_string(), "ok".to_string());
        }
        Ok(output) => {
            checks.insert("shell_echo".to_string(), format!("unexpected: {output}"));
        }
        Err(err) => {
            checks.insert("shell_echo".to_string(), format!("failed: {err}"));
        }
    }
    match channel.get_system_property("ro.build.version.sdk") {
        Ok(Some(sdk)) => {
            checks.insert("sdk_level".to_string(), sdk);
        }
        Ok(None) => {
            checks.insert("sdk_level".to_string(), "missing".to_string());
        }
        Err(err) => {
            checks.insert("sdk_level".to_string(), format!("failed: {err}"));
        }
    }

    let status = if checks.values().all(|value| !value.starts_with("failed")) {
        "ok"
    } else {
        "failed"
    };
    let summary = SmokeSummary {
        tool: "instrumental-runner-smoke",
        status,
        trace_id,
        serial,
        name: channel.name(),
        is_emulator: channel.is_emulator(),
        width: channel.width(),
        height: channel.height(),
        width_dp: channel.width_in_dp(),
        height_dp: channel.height_in_dp(),
        checks,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).expect("serialize summary")
    );
    if status != "ok" {
        std::process::exit(1);
    }
}
