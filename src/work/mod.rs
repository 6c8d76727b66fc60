// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Work objects and the pool that lends them to pipeline workers.

mod object;
mod pool;

pub use object::{FeatureRecord, View, WorkObject, DEFAULT_VIEW};
pub use pool::{PoolContext, PoolStats, PoolTuning, WorkObjectManager};
