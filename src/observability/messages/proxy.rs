// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for remote service connections.
//!
//! This module contains message types for logging events related to:
//! * Connect attempts and directory resolution
//! * Failed calls and swallowed notifications
//! * Shutdown and forced termination of service processes

use std::fmt::{Display, Formatter};

/// Connected to a service and passed its health check.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use docpipe::observability::messages::proxy::Connected;
///
/// let msg = Connected {
///     host: "localhost",
///     port: 9500,
///     attempt: 1,
///     pid: Some(4242),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct Connected<'a> {
    pub host: &'a str,
    pub port: u16,
    pub attempt: u32,
    pub pid: Option<u32>,
}

impl Display for Connected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Connected to service at {}:{} on attempt {}",
            self.host, self.port, self.attempt
        )?;
        if let Some(pid) = self.pid {
            write!(f, " (pid {})", pid)?;
        }
        Ok(())
    }
}

/// One connect attempt failed. The proxy retries until its budget is spent.
///
/// # Log Level
/// `warn!` - Transient, may recover on the next attempt
pub struct ConnectAttemptFailed<'a> {
    pub target: &'a str,
    pub attempt: u32,
    pub budget: u32,
    pub error: &'a dyn std::error::Error,
}

impl Display for ConnectAttemptFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Connect attempt {}/{} to '{}' failed: {}",
            self.attempt, self.budget, self.target, self.error
        )
    }
}

/// The directory resolved a service name.
///
/// # Log Level
/// `debug!`
pub struct ServiceResolved<'a> {
    pub service: &'a str,
    pub host: &'a str,
    pub port: u16,
}

impl Display for ServiceResolved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Directory resolved service '{}' to {}:{}",
            self.service, self.host, self.port
        )
    }
}

/// A call failed at the transport level and the channel was closed.
///
/// # Log Level
/// `warn!` - The caller decides whether to redeploy
///
/// # Example
/// ```
/// use docpipe::observability::messages::proxy::CallFailed;
///
/// let error = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
/// let msg = CallFailed {
///     command: "Annotate",
///     error: &error,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct CallFailed<'a> {
    pub command: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for CallFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Call '{}' failed, channel closed: {}", self.command, self.error)
    }
}

/// A lifecycle notification could not be delivered. Never propagated.
///
/// # Log Level
/// `warn!`
pub struct NotificationFailed<'a> {
    pub command: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for NotificationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Notification '{}' failed: {}", self.command, self.error)
    }
}

/// Shutdown of a service connection finished.
///
/// # Log Level
/// `info!`
pub struct ShutdownCompleted<'a> {
    pub endpoint: &'a str,
    pub service_exited: bool,
}

impl Display for ShutdownCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.service_exited {
            write!(f, "Service at '{}' shut down", self.endpoint)
        } else {
            write!(
                f,
                "Service at '{}' did not close its connection after shutdown",
                self.endpoint
            )
        }
    }
}

/// A service process was sent SIGKILL.
///
/// # Log Level
/// `info!`
pub struct ForcedTermination {
    pub pid: u32,
}

impl Display for ForcedTermination {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Forcibly terminated service process {}", self.pid)
    }
}

/// Forced termination did not happen. Shutdown continues regardless.
///
/// # Log Level
/// `warn!`
pub struct ForcedTerminationFailed<'a> {
    pub pid: u32,
    pub reason: &'a str,
}

impl Display for ForcedTerminationFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Could not terminate service process {}: {}",
            self.pid, self.reason
        )
    }
}
