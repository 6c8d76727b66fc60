// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Static checks run over a loaded pipeline configuration.
//!
//! Every stage must carry a unique, non-empty name and a recognized deployment
//! mode, and each mode must have the fields it cannot run without:
//!
//! * co-located: `implementation`
//! * child-process: `executable`
//! * remote-service: `host` + `port`, or `service_name`
//!
//! Protocol handling is left to the deployment selector so that its fallback
//! rules apply in one place.

use std::collections::HashSet;

use crate::config::{DeploymentMode, PipelineConfig, StageDescriptor};
use crate::errors::ConfigError;

/// Validate all stage descriptors, returning the first problem found.
pub fn validate_config(cfg: &PipelineConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for stage in &cfg.stages {
        validate_stage(stage)?;
        if !seen.insert(stage.name.as_str()) {
            return Err(ConfigError::DuplicateStageName {
                name: stage.name.clone(),
            });
        }
    }
    Ok(())
}

/// Validate a single descriptor.
pub fn validate_stage(stage: &StageDescriptor) -> Result<(), ConfigError> {
    if stage.name.trim().is_empty() {
        return Err(ConfigError::MissingStageName);
    }

    match stage.deployment_mode()? {
        DeploymentMode::CoLocated => {
            if stage.implementation.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::missing_attribute(&stage.name, "implementation"));
            }
        }
        DeploymentMode::ChildProcess => {
            if stage.executable.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::missing_attribute(&stage.name, "executable"));
            }
        }
        DeploymentMode::RemoteService => {
            let literal = stage.host.is_some() && stage.port.is_some();
            if !literal && stage.service_name.is_none() {
                return Err(ConfigError::invalid_descriptor(
                    &stage.name,
                    "remote-service needs host and port, or service_name",
                ));
            }
        }
    }
    Ok(())
}
