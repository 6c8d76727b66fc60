// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Work object pool usage errors.
///
/// These indicate a programming error in the caller and are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The context already holds as many work objects as it declared.
    #[error("context '{context}' requested {requested} work objects but declared a limit of {limit}")]
    TooManyOutstanding {
        context: String,
        limit: usize,
        requested: usize,
    },

    /// The object was not issued by this manager.
    #[error("work object {id} was released to a pool that did not issue it")]
    WrongPool { id: String },

    #[error("work object {id} is not outstanding in context '{context}'")]
    NotOutstanding { context: String, id: String },

    /// Contexts contribute to the backing pool size and must be declared before first use.
    #[error("context '{context}' was declared after the backing pool was built")]
    DeclaredAfterInit { context: String },

    #[error("work object pool is closed")]
    Closed,
}
