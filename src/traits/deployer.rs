// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::Path;

use async_trait::async_trait;

use crate::config::{DeploymentMode, StageDescriptor};
use crate::errors::DeploymentError;
use crate::traits::Stage;

/// Produces stage instances for one deployment mode.
#[async_trait]
pub trait StageDeployer: Send + Sync {
    fn mode(&self) -> DeploymentMode;

    /// Produce `count` ready instances from `descriptor`.
    ///
    /// `resolved` is the descriptor file location, freshly resolved for this call.
    async fn produce(
        &self,
        descriptor: &StageDescriptor,
        resolved: Option<&Path>,
        count: usize,
    ) -> Result<Vec<Box<dyn Stage>>, DeploymentError>;
}
