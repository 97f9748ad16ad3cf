// nasvm/src/vm/signal.rs
//
// Copyright (c) 2025 Arcella Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Local process signalling used by `shutdown`.
//!
//! The pid comes from the NAS (`vm.status`) but the signal is delivered on
//! the machine running this client. That only reaches the hypervisor process
//! when both share a host and pid namespace; anywhere else it hits an
//! unrelated process or nothing at all.

use crate::error::{NasvmError, Result as NasvmResult};

/// Delivers a termination request to a process on this machine.
pub trait ProcessSignaller {
    fn terminate(&self, pid: i32) -> NasvmResult<()>;
}

/// Sends `SIGTERM` through `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSignaller;

impl ProcessSignaller for LocalSignaller {
    #[cfg(unix)]
    fn terminate(&self, pid: i32) -> NasvmResult<()> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        // 0 and negative values address process groups.
        if pid <= 0 {
            return Err(NasvmError::Signal { pid, reason: "not a process id".into() });
        }

        tracing::info!(pid, "Sending SIGTERM to local process");
        signal::kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|errno| NasvmError::Signal {
            pid,
            reason: errno.desc().to_string(),
        })
    }

    #[cfg(not(unix))]
    fn terminate(&self, pid: i32) -> NasvmResult<()> {
        Err(NasvmError::Signal {
            pid,
            reason: "local signalling is only supported on Unix".into(),
        })
    }
}
