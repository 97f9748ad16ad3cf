// nasvm/src/vm/mod.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Virtual machine operations on top of an authenticated [`Session`].
//!
//! Every per-VM action is a thin mapping to one or two `vm.*` methods.
//! [`run_batch`] applies an action to a list of ids strictly one after the
//! other: a failure on one id is recorded and the next id still runs, while
//! a transport failure ends the batch.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::error::{NasvmError, Result as NasvmResult};
use crate::rpc::protocol::MALFORMED_RESPONSE;
use crate::rpc::{Outcome, Session, Transport};

mod guard;
pub mod signal;

pub use guard::GuardPolicy;
pub use signal::{LocalSignaller, ProcessSignaller};

pub type VmId = u64;

/// A VM as reported by `vm.query`. Unknown fields are ignored.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct VmRecord {
    pub id: VmId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: VmStatus,
}

/// Runtime state of a VM; `pid` is absent or null when it is not running.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct VmStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub pid: Option<i64>,
}

impl VmStatus {
    /// The pid, if it designates a real process.
    pub fn running_pid(&self) -> Option<i32> {
        self.pid
            .filter(|pid| *pid > 0)
            .and_then(|pid| i32::try_from(pid).ok())
    }
}

/// One VNC display device from `vm.get_vnc`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct VncDevice {
    #[serde(default, alias = "vnc_port")]
    pub port: Option<u16>,
    #[serde(default, alias = "vnc_resolution")]
    pub resolution: Option<String>,
}

/// Combined answer of `vm.get_vnc` and `vm.get_vnc_web`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct VncInfo {
    pub devices: Vec<VncDevice>,
    pub urls: Vec<String>,
}

/// Action names, as used on the command line and in `[guard] require_force`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Start,
    Stop,
    Halt,
    Restart,
    Shutdown,
    Status,
    Vnc,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::Halt => "halt",
            ActionKind::Restart => "restart",
            ActionKind::Shutdown => "shutdown",
            ActionKind::Status => "status",
            ActionKind::Vnc => "vnc",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-VM action with its options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmAction {
    Start { overcommit: bool },
    /// Graceful power-off request to the guest.
    Stop,
    /// Immediate power-off (`vm.stop` with `force`).
    Halt,
    Restart,
    /// `vm.status`, then SIGTERM to the reported pid on *this* machine.
    Shutdown,
    Status,
    Vnc,
}

impl VmAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            VmAction::Start { .. } => ActionKind::Start,
            VmAction::Stop => ActionKind::Stop,
            VmAction::Halt => ActionKind::Halt,
            VmAction::Restart => ActionKind::Restart,
            VmAction::Shutdown => ActionKind::Shutdown,
            VmAction::Status => ActionKind::Status,
            VmAction::Vnc => ActionKind::Vnc,
        }
    }

    /// The step a failure of this action is reported against when no
    /// more specific one is known.
    pub fn step(&self) -> &'static str {
        match self {
            VmAction::Start { .. } => "vm.start",
            VmAction::Stop | VmAction::Halt => "vm.stop",
            VmAction::Restart => "vm.restart",
            VmAction::Status => "vm.status",
            VmAction::Shutdown => LOCAL_SIGNAL,
            VmAction::Vnc => "vm.get_vnc",
        }
    }

    /// Method and parameters for actions that are a single remote call.
    pub fn request(&self, id: VmId) -> Option<(&'static str, Vec<Value>)> {
        match self {
            VmAction::Start { overcommit } => {
                Some(("vm.start", vec![json!(id), json!({ "overcommit": overcommit })]))
            }
            VmAction::Stop => Some(("vm.stop", vec![json!(id)])),
            VmAction::Halt => Some(("vm.stop", vec![json!(id), json!({ "force": true })])),
            VmAction::Restart => Some(("vm.restart", vec![json!(id)])),
            VmAction::Status => Some(("vm.status", vec![json!(id)])),
            VmAction::Shutdown | VmAction::Vnc => None,
        }
    }
}

/// Step label of the local signal in `shutdown` entries.
pub const LOCAL_SIGNAL: &str = "local SIGTERM";

/// Result for a single id of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub id: VmId,
    /// The step that produced `outcome`: the last method called, or
    /// [`LOCAL_SIGNAL`].
    pub method: &'static str,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub action: ActionKind,
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn successes(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.entries.len() - self.successes()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures() == 0
    }
}

/// Lists all VMs (`vm.query`).
pub async fn list_vms<T: Transport>(session: &mut Session<T>) -> NasvmResult<Vec<VmRecord>> {
    const METHOD: &str = "vm.query";

    match session.call(METHOD, Vec::new()).await? {
        Outcome::Success(value) => serde_json::from_value(value).map_err(|e| {
            tracing::debug!("Unexpected {} payload: {}", METHOD, e);
            NasvmError::Rpc { method: METHOD.into(), reason: MALFORMED_RESPONSE.into() }
        }),
        Outcome::Failure(reason) => Err(NasvmError::Rpc { method: METHOD.into(), reason }),
    }
}

/// Applies `action` to each id in order.
///
/// The guard is checked first; a refused action sends nothing. Per-id
/// failures, including non-fatal errors (see [`NasvmError::is_fatal`]),
/// are recorded in the report. Fatal errors end the batch and are returned.
pub async fn run_batch<T: Transport>(
    session: &mut Session<T>,
    action: VmAction,
    ids: &[VmId],
    force: bool,
    policy: &GuardPolicy,
    signaller: &dyn ProcessSignaller,
) -> NasvmResult<BatchReport> {
    policy.check(action.kind(), force)?;

    let mut entries = Vec::with_capacity(ids.len());
    for &id in ids {
        let entry = match run_one(session, action, id, signaller).await {
            Ok(entry) => entry,
            Err(e) if !e.is_fatal() => BatchEntry {
                id,
                method: action.step(),
                outcome: Outcome::Failure(failure_reason(e)),
            },
            Err(e) => return Err(e),
        };
        match &entry.outcome {
            Outcome::Success(_) => tracing::info!(%id, action = %action.kind(), "Done"),
            Outcome::Failure(reason) => {
                tracing::warn!(
                    %id,
                    action = %action.kind(),
                    method = entry.method,
                    %reason,
                    "Failed"
                )
            }
        }
        entries.push(entry);
    }

    Ok(BatchReport { action: action.kind(), entries })
}

fn failure_reason(error: NasvmError) -> String {
    match error {
        NasvmError::Rpc { reason, .. } | NasvmError::Signal { reason, .. } => reason,
        other => other.to_string(),
    }
}

async fn run_one<T: Transport>(
    session: &mut Session<T>,
    action: VmAction,
    id: VmId,
    signaller: &dyn ProcessSignaller,
) -> NasvmResult<BatchEntry> {
    if let Some((method, params)) = action.request(id) {
        let outcome = session.call(method, params).await?;
        return Ok(BatchEntry { id, method, outcome });
    }
    match action {
        VmAction::Shutdown => shutdown_local(session, id, signaller).await,
        VmAction::Vnc => vnc_info(session, id).await,
        _ => Err(NasvmError::Internal(format!("no handler for {}", action.kind()))),
    }
}

/// Looks up the VM's pid remotely and terminates that pid locally.
///
/// Succeeds with `{"pid": <pid>, "state": <state>}`. Remote failures are
/// recorded in the entry; a failed local signal is returned as
/// [`NasvmError::Signal`].
pub async fn shutdown_local<T: Transport>(
    session: &mut Session<T>,
    id: VmId,
    signaller: &dyn ProcessSignaller,
) -> NasvmResult<BatchEntry> {
    const METHOD: &str = "vm.status";
    let failed = |reason: String| BatchEntry {
        id,
        method: METHOD,
        outcome: Outcome::Failure(reason),
    };

    let value = match session.call(METHOD, vec![json!(id)]).await? {
        Outcome::Success(value) => value,
        Outcome::Failure(reason) => return Ok(failed(reason)),
    };
    let Ok(status) = serde_json::from_value::<VmStatus>(value) else {
        return Ok(failed(MALFORMED_RESPONSE.into()));
    };
    let Some(pid) = status.running_pid() else {
        return Ok(failed(format!("VM {} is not running", id)));
    };

    signaller.terminate(pid)?;
    Ok(BatchEntry {
        id,
        method: LOCAL_SIGNAL,
        outcome: Outcome::Success(json!({ "pid": pid, "state": status.state })),
    })
}

/// Collects VNC devices and web URLs for one VM.
///
/// Succeeds with a serialized [`VncInfo`].
pub async fn vnc_info<T: Transport>(session: &mut Session<T>, id: VmId) -> NasvmResult<BatchEntry> {
    const DEVICES: &str = "vm.get_vnc";
    const WEB: &str = "vm.get_vnc_web";
    let failed = |method: &'static str, reason: String| BatchEntry {
        id,
        method,
        outcome: Outcome::Failure(reason),
    };

    let devices = match session.call(DEVICES, vec![json!(id)]).await? {
        Outcome::Success(value) => value,
        Outcome::Failure(reason) => return Ok(failed(DEVICES, reason)),
    };
    let Ok(devices) = serde_json::from_value::<Vec<VncDevice>>(devices) else {
        return Ok(failed(DEVICES, MALFORMED_RESPONSE.into()));
    };

    let urls = match session.call(WEB, vec![json!(id)]).await? {
        Outcome::Success(Value::Array(items)) => items.iter().filter_map(url_of).collect(),
        Outcome::Success(Value::String(url)) => vec![url],
        Outcome::Success(_) => return Ok(failed(WEB, MALFORMED_RESPONSE.into())),
        Outcome::Failure(reason) => return Ok(failed(WEB, reason)),
    };

    let info = serde_json::to_value(VncInfo { devices, urls })?;
    Ok(BatchEntry { id, method: WEB, outcome: Outcome::Success(info) })
}

fn url_of(item: &Value) -> Option<String> {
    match item {
        Value::String(url) => Some(url.clone()),
        Value::Object(map) => map.get("url").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}
