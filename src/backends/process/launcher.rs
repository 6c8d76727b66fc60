// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Building and spawning the command line of a child-process service.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::process::{Child, Command};

use crate::config::consts::{DESCRIPTOR_PLACEHOLDER, MERGED_ENV_VARS, PORT_PLACEHOLDER};
use crate::config::StageDescriptor;
use crate::errors::{ConfigError, DeploymentError};

#[cfg(windows)]
const PATH_LIST_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: &str = ":";

/// Fully resolved command line for one service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub log_file: Option<PathBuf>,
}

impl LaunchSpec {
    /// Resolve a descriptor's launch fields for a service listening on `port`.
    pub fn from_descriptor(
        descriptor: &StageDescriptor,
        resolved: Option<&Path>,
        port: u16,
    ) -> Result<Self, ConfigError> {
        let program = descriptor
            .executable
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConfigError::missing_attribute(&descriptor.name, "executable"))?;

        Ok(Self {
            program,
            args: substitute_args(&descriptor.args, resolved, port),
            env: merge_env(&descriptor.env, |name| std::env::var(name).ok()),
            log_file: descriptor
                .log_dir
                .as_ref()
                .map(|dir| log_file_path(dir, &descriptor.name)),
        })
    }

    /// Spawn the service. The child is killed if its handle is dropped.
    pub fn spawn(&self, stage: &str) -> Result<Child, DeploymentError> {
        let spawn_error = |source| DeploymentError::Spawn {
            stage: stage.to_string(),
            source,
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        match &self.log_file {
            Some(path) => {
                let log = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(spawn_error)?;
                let err_log = log.try_clone().map_err(spawn_error)?;
                cmd.stdout(Stdio::from(log)).stderr(Stdio::from(err_log));
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        cmd.spawn().map_err(|e| {
            tracing::error!("Failed to spawn service '{}' for stage '{}': {}", self.program, stage, e);
            spawn_error(e)
        })
    }
}

/// Replace `${descriptor}` and `${port}` in every argument.
///
/// Without a resolved descriptor the placeholder becomes an empty string.
pub fn substitute_args(args: &[String], descriptor: Option<&Path>, port: u16) -> Vec<String> {
    let descriptor = descriptor
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let port = port.to_string();
    args.iter()
        .map(|arg| {
            arg.replace(DESCRIPTOR_PLACEHOLDER, &descriptor)
                .replace(PORT_PLACEHOLDER, &port)
        })
        .collect()
}

/// Environment overrides for the child.
///
/// Path-list variables are prepended to the inherited value; every other
/// variable replaces it.
pub fn merge_env<F>(overrides: &BTreeMap<String, String>, inherited: F) -> Vec<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    overrides
        .iter()
        .map(|(name, value)| {
            let merged = if MERGED_ENV_VARS.contains(&name.as_str()) {
                match inherited(name).filter(|v| !v.is_empty()) {
                    Some(existing) => format!("{}{}{}", value, PATH_LIST_SEPARATOR, existing),
                    None => value.clone(),
                }
            } else {
                value.clone()
            };
            (name.clone(), merged)
        })
        .collect()
}

fn log_file_path(dir: &Path, stage: &str) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    dir.join(format!("{}{}.log", stage, millis))
}
