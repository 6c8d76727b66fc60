// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging.
//!
//! Operational events are message structs implementing `Display`, logged
//! through the `tracing` macros. Keeping the wording in one place keeps log
//! output consistent across the pool, the deployers and the proxy.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::pool` - work object pool construction and misuse
//! * `messages::deployment` - stage deployment, redeployment and draining
//! * `messages::proxy` - remote service connections, calls and forced termination
//! * `messages::pipeline` - pipeline driver lifecycle
//!
//! # Usage
//!
//! ```rust
//! use docpipe::observability::messages::proxy::CallFailed;
//!
//! let error = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
//! let msg = CallFailed {
//!     command: "Annotate",
//!     error: &error,
//! };
//!
//! tracing::warn!("{}", msg);
//! ```

pub mod messages;
