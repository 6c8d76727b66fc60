// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Remote-service deployment: the frame RPC proxy and the stages built on it.

pub mod deployer;
pub mod proxy;
pub mod stage;
pub mod transport;

pub use deployer::{proxy_settings, RemoteServiceDeployer};
pub use proxy::{Endpoint, ProxySettings, ProxyState, ProxyStats, RemoteServiceProxy};
pub use stage::RemoteStage;
pub use transport::{Connector, FrameChannel, TcpConnector};
