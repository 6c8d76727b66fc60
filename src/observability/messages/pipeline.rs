// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the pipeline driver.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// A run over a document collection started.
///
/// # Log Level
/// `info!`
///
/// # Example
/// ```
/// use docpipe::observability::messages::pipeline::RunStarted;
///
/// let msg = RunStarted {
///     documents: 100,
///     stages: 3,
///     workers: 4,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct RunStarted {
    pub documents: usize,
    pub stages: usize,
    pub workers: usize,
}

impl Display for RunStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Processing {} document(s) through {} stage(s) with {} worker(s)",
            self.documents, self.stages, self.workers
        )
    }
}

/// A run finished.
///
/// # Log Level
/// `info!`
pub struct RunCompleted {
    pub documents: usize,
    pub duration: Duration,
}

impl Display for RunCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Processed {} document(s) in {:?}",
            self.documents, self.duration
        )
    }
}

/// A stage failed its collection-complete notification during finish.
///
/// # Log Level
/// `warn!` - Shutdown continues
pub struct CollectionCompleteFailed<'a> {
    pub stage: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for CollectionCompleteFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' failed collection complete: {}",
            self.stage, self.error
        )
    }
}
