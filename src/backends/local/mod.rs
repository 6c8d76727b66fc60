// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod deployer;
pub mod processors;
pub mod registry;

pub use deployer::CoLocatedDeployer;
pub use processors::*;
pub use registry::{StageFactory, StageRegistry};
