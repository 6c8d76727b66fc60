// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the shared work object pool.

use std::fmt::{Display, Formatter};

use uuid::Uuid;

/// The shared backing pool was built on first acquisition.
///
/// # Log Level
/// `info!` - Happens once per pipeline run
///
/// # Example
/// ```
/// use docpipe::observability::messages::pool::BackingPoolBuilt;
///
/// let msg = BackingPoolBuilt {
///     size: 4,
///     initial_payload_capacity: 8192,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct BackingPoolBuilt {
    pub size: usize,
    pub initial_payload_capacity: usize,
}

impl Display for BackingPoolBuilt {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Built work object pool: size={}, initial_payload_capacity={}",
            self.size, self.initial_payload_capacity
        )
    }
}

/// A work object was returned to a context that did not lend it.
///
/// # Log Level
/// `warn!` - Caller bug, the object is dropped
pub struct WorkObjectRejected<'a> {
    pub context: &'a str,
    pub id: Uuid,
}

impl Display for WorkObjectRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Context '{}' rejected work object {}: not outstanding here",
            self.context, self.id
        )
    }
}
