// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;   // co-located, child-process and remote-service stages
pub mod config;     // pipeline config + stage descriptors
pub mod engine;     // stage pools and the pipeline driver
pub mod errors;     // error handling
pub mod observability;
pub mod proto;      // XTalk frames and wire commands
pub mod traits;     // stage and deployer seams
pub mod work;       // work objects and their pool
