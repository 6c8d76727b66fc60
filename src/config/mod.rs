// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod resolver;
mod validation;

pub mod consts;

pub use loader::{
    load_and_validate_config, load_config, DeploymentMode, DirectoryConfig, PipelineConfig,
    ProxyOptions, StageDescriptor, WorkObjectConfig,
};
pub use resolver::{DescriptorResolver, FsDescriptorResolver};
pub use validation::{validate_config, validate_stage};
