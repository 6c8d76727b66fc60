// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod execution;
mod pool;
mod service;

pub use config::ConfigError;
pub use execution::{DeploymentError, FailureStrategy, PipelineError, StageError};
pub use pool::PoolError;
pub use service::ServiceError;
