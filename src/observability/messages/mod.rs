// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for structured logging.
//!
//! # Usage Pattern
//!
//! ```rust
//! use docpipe::observability::messages::deployment::StageDeployed;
//!
//! let msg = StageDeployed {
//!     stage: "tagger",
//!     mode: "remote-service",
//!     instances: 2,
//! };
//!
//! tracing::info!("{}", msg);
//! ```

pub mod deployment;
pub mod pipeline;
pub mod pool;
pub mod proxy;
