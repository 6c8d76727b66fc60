// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Configuration errors. All of them are fatal and surface before any stage
//! instance is produced.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A stage descriptor has an empty or absent name.
    #[error("stage descriptor is missing its required name")]
    MissingStageName,

    #[error("duplicate stage name: '{name}'")]
    DuplicateStageName { name: String },

    /// A required descriptor attribute is absent or holds an unsupported value.
    #[error("stage '{stage}' is missing required attribute '{attribute}'{}", detail_suffix(.detail))]
    MissingRequiredAttribute {
        stage: String,
        attribute: &'static str,
        detail: Option<String>,
    },

    #[error("invalid descriptor for stage '{stage}': {reason}")]
    InvalidDescriptor { stage: String, reason: String },

    /// A collaborator the chosen deployment mode needs was not supplied.
    #[error("stage '{stage}' requires {dependency} but none was supplied")]
    MissingDependency {
        stage: String,
        dependency: &'static str,
    },

    #[error("directory service host/port not configured; cannot resolve service '{service}'")]
    DirectoryNotConfigured { service: String },

    #[error("invalid connect retry count '{value}' for service at {host}:{port}")]
    InvalidRetryCount {
        value: String,
        host: String,
        port: u16,
    },

    #[error("stage '{stage}' names unknown co-located implementation '{implementation}'")]
    UnknownImplementation {
        stage: String,
        implementation: String,
    },

    #[error("descriptor '{location}' for stage '{stage}' could not be resolved")]
    DescriptorNotFound { stage: String, location: String },

    #[error("failed to read configuration '{path}': {source}")]
    Load {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(" ({})", d))
        .unwrap_or_default()
}

impl ConfigError {
    pub fn missing_attribute(stage: &str, attribute: &'static str) -> Self {
        ConfigError::MissingRequiredAttribute {
            stage: stage.to_string(),
            attribute,
            detail: None,
        }
    }

    pub fn invalid_descriptor(stage: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidDescriptor {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }
}
