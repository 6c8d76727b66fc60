// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod deployer;
pub mod stage;

pub use deployer::StageDeployer;
pub use stage::{Stage, StageMetadata};
