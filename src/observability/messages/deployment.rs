// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for stage deployment and stage pools.
//!
//! This module contains message types for logging events related to:
//! * Strategy selection and protocol fallback
//! * Instance production, redeployment and restart limits
//! * Draining pools at the end of a run

use std::fmt::{Display, Formatter};

/// A stage pool received its instances.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use docpipe::observability::messages::deployment::StageDeployed;
///
/// let msg = StageDeployed {
///     stage: "tokenizer",
///     mode: "co-located",
///     instances: 4,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct StageDeployed<'a> {
    pub stage: &'a str,
    pub mode: &'a str,
    pub instances: usize,
}

impl Display for StageDeployed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Deployed stage '{}' as {}: {} instance(s)",
            self.stage, self.mode, self.instances
        )
    }
}

/// A remote stage declared a protocol other than the RPC one.
///
/// The RPC strategy is used anyway.
///
/// # Log Level
/// `warn!` - Descriptor is probably wrong
pub struct ProtocolFallback<'a> {
    pub stage: &'a str,
    pub protocol: &'a str,
}

impl Display for ProtocolFallback<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' declares unrecognized protocol '{}', using rpc",
            self.stage, self.protocol
        )
    }
}

/// One remote stage instance is connected.
///
/// # Log Level
/// `info!`
pub struct InstanceConnected<'a> {
    pub stage: &'a str,
    pub endpoint: &'a str,
    pub pid: Option<u32>,
}

impl Display for InstanceConnected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.pid {
            Some(pid) => write!(
                f,
                "Stage '{}' instance connected to {} (pid {})",
                self.stage, self.endpoint, pid
            ),
            None => write!(f, "Stage '{}' instance connected to {}", self.stage, self.endpoint),
        }
    }
}

/// A service process was started for a child-process stage.
///
/// # Log Level
/// `info!`
pub struct ChildProcessLaunched<'a> {
    pub stage: &'a str,
    pub pid: Option<u32>,
    pub port: u16,
}

impl Display for ChildProcessLaunched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.pid {
            Some(pid) => write!(
                f,
                "Launched service for stage '{}': pid {} on port {}",
                self.stage, pid, self.port
            ),
            None => write!(
                f,
                "Launched service for stage '{}' on port {}",
                self.stage, self.port
            ),
        }
    }
}

/// A launched service could not be reached and is being started again.
///
/// # Log Level
/// `warn!`
pub struct ServiceRelaunched<'a> {
    pub stage: &'a str,
    pub attempt: u32,
    pub limit: u32,
    pub error: &'a dyn std::error::Error,
}

impl Display for ServiceRelaunched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Relaunching service for stage '{}' ({}/{}): {}",
            self.stage, self.attempt, self.limit, self.error
        )
    }
}

/// A stage instance failed.
///
/// # Log Level
/// `warn!` - Recovered by redeploy or retry, unless the strategy aborts
///
/// # Example
/// ```
/// use docpipe::observability::messages::deployment::StageInstanceFailed;
///
/// let error = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
/// let msg = StageInstanceFailed {
///     stage: "tagger",
///     strategy: "redeploy",
///     error: &error,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct StageInstanceFailed<'a> {
    pub stage: &'a str,
    pub strategy: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for StageInstanceFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' instance failed ({}): {}",
            self.stage, self.strategy, self.error
        )
    }
}

/// A failed instance was replaced with a fresh one.
///
/// # Log Level
/// `info!`
pub struct StageRedeployed<'a> {
    pub stage: &'a str,
    pub restarts: u32,
    pub limit: u32,
}

impl Display for StageRedeployed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Redeployed stage '{}' (restart {}/{})",
            self.stage, self.restarts, self.limit
        )
    }
}

/// A stage pool refused another redeploy.
///
/// # Log Level
/// `error!` - The pipeline aborts
pub struct RestartLimitReached<'a> {
    pub stage: &'a str,
    pub limit: u32,
}

impl Display for RestartLimitReached<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' reached its restart limit of {}",
            self.stage, self.limit
        )
    }
}

/// A stage pool was drained and its instances shut down.
///
/// # Log Level
/// `info!`
pub struct StagePoolDrained<'a> {
    pub stage: &'a str,
    pub instances: usize,
}

impl Display for StagePoolDrained<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Drained stage pool '{}': {} instance(s) shut down",
            self.stage, self.instances
        )
    }
}
