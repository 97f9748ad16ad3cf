// nasvm/src/commands/output.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Text rendering of command results.

use serde_json::Value;

use crate::rpc::Outcome;
use crate::vm::{ActionKind, BatchEntry, VmRecord, VmStatus, VncInfo};

/// Shown in the PID column for VMs that are not running.
pub const NOT_RUNNING: &str = "-";

/// Renders `vm.query` results as an aligned table with a header row.
pub fn format_vm_table(vms: &[VmRecord]) -> String {
    let name_width = vms
        .iter()
        .map(|vm| vm.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut table = format!(
        "{:>4}  {:<name_width$}  {:>8}  {}\n",
        "ID", "NAME", "PID", "DESCRIPTION"
    );
    for vm in vms {
        let pid = vm
            .status
            .running_pid()
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| NOT_RUNNING.to_string());
        let line = format!(
            "{:>4}  {:<name_width$}  {:>8}  {}",
            vm.id,
            vm.name,
            pid,
            vm.description.as_deref().unwrap_or("")
        );
        table.push_str(line.trim_end());
        table.push('\n');
    }
    table
}

/// Renders one batch entry.
///
/// `Ok` lines belong on stdout, `Err` lines on stderr.
pub fn format_entry(action: ActionKind, entry: &BatchEntry) -> Result<String, String> {
    let prefix = format!("{} {}", action, entry.id);
    match &entry.outcome {
        Outcome::Failure(reason) => Err(format!("{}: {} failed: {}", prefix, entry.method, reason)),
        Outcome::Success(value) => Ok(match action {
            ActionKind::Status => format_status(&prefix, value),
            ActionKind::Shutdown => {
                let pid = value.get("pid").map(Value::to_string).unwrap_or_default();
                format!("{}: sent SIGTERM to local process {}", prefix, pid)
            }
            ActionKind::Vnc => format_vnc(&prefix, value),
            _ => format!("{}: ok", prefix),
        }),
    }
}

fn format_status(prefix: &str, value: &Value) -> String {
    match serde_json::from_value::<VmStatus>(value.clone()) {
        Ok(status) => {
            let pid = status
                .running_pid()
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| NOT_RUNNING.to_string());
            format!("{}: {} (pid {})", prefix, status.state.as_deref().unwrap_or("UNKNOWN"), pid)
        }
        Err(_) => format!("{}: {}", prefix, value),
    }
}

fn format_vnc(prefix: &str, value: &Value) -> String {
    let Ok(info) = serde_json::from_value::<VncInfo>(value.clone()) else {
        return format!("{}: {}", prefix, value);
    };
    if info.devices.is_empty() && info.urls.is_empty() {
        return format!("{}: no VNC devices", prefix);
    }

    let mut lines = Vec::new();
    for device in &info.devices {
        let port = device.port.map(|p| p.to_string()).unwrap_or_else(|| "?".into());
        let resolution = device.resolution.as_deref().unwrap_or("?");
        lines.push(format!("{}: port {}, resolution {}", prefix, port, resolution));
    }
    for url in &info.urls {
        lines.push(format!("{}: {}", prefix, url));
    }
    lines.join("\n")
}
