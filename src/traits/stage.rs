// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::StageError;
use crate::proto::commands::METADATA_KEY;
use crate::proto::Frame;
use crate::work::WorkObject;

/// Capability metadata a stage exposes once deployed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageMetadata {
    pub name: String,
    pub version: Option<String>,
    pub input_types: Vec<String>,
    pub output_types: Vec<String>,
    /// Whether more than one instance of the stage may be deployed.
    pub multiple_deployment_allowed: bool,
}

impl StageMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            multiple_deployment_allowed: true,
            ..Default::default()
        }
    }

    /// Read metadata from a `GetMeta` reply. Missing fields keep their defaults.
    pub fn from_frame(fallback_name: &str, reply: &Frame) -> Self {
        let Some(meta) = reply.get_frame(METADATA_KEY) else {
            return Self::named(fallback_name);
        };
        let strings = |key: &str| -> Vec<String> {
            meta.iter()
                .filter(|(k, _)| *k == key)
                .filter_map(|(_, v)| v.as_leaf().map(str::to_string))
                .collect()
        };
        Self {
            name: meta
                .get_str("Name")
                .map(str::to_string)
                .unwrap_or_else(|| fallback_name.to_string()),
            version: meta.get_str("Version").map(str::to_string),
            input_types: strings("Input"),
            output_types: strings("Output"),
            multiple_deployment_allowed: meta
                .get_str("MultipleDeploymentAllowed")
                .map(|v| !v.trim().eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        }
    }
}

/// One deployed instance of a processing stage.
///
/// Instances are lent out exclusively by their stage pool, so every call gets
/// `&mut self`. Lifecycle notifications have no-op defaults for stages that
/// keep no per-batch or per-collection state.
#[async_trait]
pub trait Stage: Send {
    /// Stage name from its descriptor.
    fn name(&self) -> &str;

    fn metadata(&self) -> StageMetadata;

    /// Analyze one work object in place.
    async fn process(&mut self, work: &mut WorkObject) -> Result<(), StageError>;

    /// End of a batch. Failures are the stage's own to log.
    async fn batch_complete(&mut self) {}

    /// End of the whole collection. Returns once stage-side finalization has run.
    async fn collection_complete(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    /// Restore whatever a failed `process` call tore down, before the same
    /// instance is tried again.
    async fn reconnect(&mut self) -> Result<(), StageError> {
        Ok(())
    }

    /// Release external resources. Must always complete.
    async fn shutdown(&mut self) {}
}
