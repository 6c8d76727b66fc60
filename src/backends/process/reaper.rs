// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Last-resort termination of service processes that ignored `Shutdown`.

use crate::observability::messages::proxy::{ForcedTermination, ForcedTerminationFailed};

/// Forcibly terminates an OS process.
///
/// Implementations never fail the caller: any problem is logged and swallowed
/// so pipeline shutdown always completes.
pub trait ProcessReaper: Send + Sync {
    fn kill(&self, pid: u32);
}

/// Sends `SIGKILL` on POSIX targets. Does nothing elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalReaper;

impl ProcessReaper for SignalReaper {
    fn kill(&self, pid: u32) {
        // 0 and values above i32::MAX would address process groups.
        if pid == 0 || pid > i32::MAX as u32 {
            tracing::warn!(
                "{}",
                ForcedTerminationFailed {
                    pid,
                    reason: "refusing to signal a process group",
                }
            );
            return;
        }
        kill_process(pid);
    }
}

#[cfg(unix)]
fn kill_process(pid: u32) {
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    if rc == 0 {
        tracing::info!("{}", ForcedTermination { pid });
    } else {
        let err = std::io::Error::last_os_error();
        tracing::warn!(
            "{}",
            ForcedTerminationFailed {
                pid,
                reason: &err.to_string(),
            }
        );
    }
}

#[cfg(not(unix))]
fn kill_process(pid: u32) {
    tracing::debug!(
        "{}",
        ForcedTerminationFailed {
            pid,
            reason: "forced termination is not supported on this platform",
        }
    );
}
