// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod pipeline;
pub mod selector;
pub mod stage_pool;
#[cfg(test)]
pub mod integration_tests;

pub use pipeline::{DocumentResult, Pipeline};
pub use selector::DeploymentSelector;
pub use stage_pool::{PoolSnapshot, PooledStage, StagePool, StagePoolRegistry};
