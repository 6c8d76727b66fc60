// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Deserialize;
use thiserror::Error;

use super::{ConfigError, PoolError, ServiceError};

/// What the pipeline does with a stage instance whose `process` call failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    /// Discard the instance and produce a fresh one from the same descriptor.
    #[default]
    Redeploy,
    /// Keep the instance and retry the same work object once.
    RetryInPlace,
    /// Stop the pipeline.
    Abort,
}

impl FailureStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redeploy => "redeploy",
            Self::RetryInPlace => "retry_in_place",
            Self::Abort => "abort",
        }
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("stage '{stage}' failed: {reason}")]
    Processing { stage: String, reason: String },
}

impl StageError {
    pub fn processing(stage: &str, reason: impl Into<String>) -> Self {
        StageError::Processing {
            stage: stage.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures producing stage instances.
#[derive(Error, Debug)]
pub enum DeploymentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect stage instance: {0}")]
    Service(#[from] ServiceError),

    #[error("failed to launch process for stage '{stage}': {source}")]
    Spawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no free port in range {start}..{end}")]
    NoFreePort { start: u16, end: u32 },

    #[error("stage '{stage}' exceeded its restart limit of {limit}")]
    RestartLimit { stage: String, limit: u32 },

    #[error("stage pool '{stage}' has been drained")]
    PoolDrained { stage: String },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Deployment(#[from] DeploymentError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("worker task failed: {0}")]
    Worker(String),
}
