// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{DeploymentMode, StageDescriptor};
use crate::errors::DeploymentError;
use crate::traits::{Stage, StageDeployer};

use super::registry::StageRegistry;

/// Produces stages that run inside the pipeline process.
pub struct CoLocatedDeployer {
    registry: Arc<StageRegistry>,
}

impl CoLocatedDeployer {
    pub fn new(registry: Arc<StageRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl StageDeployer for CoLocatedDeployer {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::CoLocated
    }

    async fn produce(
        &self,
        descriptor: &StageDescriptor,
        _resolved: Option<&Path>,
        count: usize,
    ) -> Result<Vec<Box<dyn Stage>>, DeploymentError> {
        (0..count)
            .map(|_| self.registry.create(descriptor).map_err(DeploymentError::from))
            .collect()
    }
}
