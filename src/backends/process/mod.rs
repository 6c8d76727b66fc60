// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Child-process deployment: services launched and owned by the pipeline.

pub mod deployer;
pub mod launcher;
pub mod reaper;
pub mod transport;

pub use deployer::{ChildProcessDeployer, ManagedStage};
pub use launcher::{merge_env, substitute_args, LaunchSpec};
pub use reaper::{ProcessReaper, SignalReaper};
pub use transport::{PortRangeTransport, TransportAdapter};
