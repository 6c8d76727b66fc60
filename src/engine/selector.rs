// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;

use crate::backends::local::{CoLocatedDeployer, StageRegistry};
use crate::backends::process::{
    ChildProcessDeployer, PortRangeTransport, ProcessReaper, SignalReaper, TransportAdapter,
};
use crate::backends::remote::{Connector, RemoteServiceDeployer, TcpConnector};
use crate::config::consts::{RPC_PROTOCOL, RPC_PROTOCOL_ALIAS};
use crate::config::{DeploymentMode, PipelineConfig, StageDescriptor};
use crate::errors::ConfigError;
use crate::observability::messages::deployment::ProtocolFallback;
use crate::traits::StageDeployer;

/// Picks the deployment strategy for a stage descriptor.
///
/// Strategies are registered once at startup, keyed by the mode they serve.
/// Child-process deployment is only available when a transport adapter was
/// supplied.
#[derive(Default, Clone)]
pub struct DeploymentSelector {
    deployers: HashMap<DeploymentMode, Arc<dyn StageDeployer>>,
}

impl DeploymentSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `deployer` for the mode it reports, replacing any earlier one.
    pub fn with_deployer(mut self, deployer: Arc<dyn StageDeployer>) -> Self {
        self.deployers.insert(deployer.mode(), deployer);
        self
    }

    /// All three strategies over TCP, wired from the pipeline configuration.
    ///
    /// Child processes are reached on loopback ports from the default range.
    pub fn standard(registry: Arc<StageRegistry>, config: &PipelineConfig) -> Self {
        let connect_timeout = StageDescriptor::default().timeout(&config.proxy);
        let connector: Arc<dyn Connector> = Arc::new(TcpConnector::new(connect_timeout));
        let reaper: Arc<dyn ProcessReaper> = Arc::new(SignalReaper);
        let transport: Arc<dyn TransportAdapter> =
            Arc::new(PortRangeTransport::new(connector.clone()));

        Self::new()
            .with_deployer(Arc::new(CoLocatedDeployer::new(registry)))
            .with_deployer(Arc::new(RemoteServiceDeployer::new(
                connector,
                reaper.clone(),
                config.proxy.clone(),
                config.directory(),
            )))
            .with_deployer(Arc::new(ChildProcessDeployer::new(
                transport,
                reaper,
                config.proxy.clone(),
            )))
    }

    /// The strategy for `descriptor`.
    ///
    /// A remote service must declare a protocol. Any protocol other than the
    /// RPC one falls back to the RPC strategy with a warning.
    pub fn select(&self, descriptor: &StageDescriptor) -> Result<Arc<dyn StageDeployer>, ConfigError> {
        let mode = descriptor.deployment_mode()?;
        match mode {
            DeploymentMode::CoLocated => self.lookup(descriptor, mode, "co-located stage registry"),
            DeploymentMode::ChildProcess => self.lookup(descriptor, mode, "transport adapter"),
            DeploymentMode::RemoteService => {
                let protocol = descriptor
                    .protocol
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        ConfigError::invalid_descriptor(&descriptor.name, "remote-service stage declares no protocol")
                    })?;
                if !protocol.eq_ignore_ascii_case(RPC_PROTOCOL)
                    && !protocol.eq_ignore_ascii_case(RPC_PROTOCOL_ALIAS)
                {
                    tracing::warn!(
                        "{}",
                        ProtocolFallback {
                            stage: &descriptor.name,
                            protocol,
                        }
                    );
                }
                self.lookup(descriptor, mode, "remote service connector")
            }
        }
    }

    fn lookup(
        &self,
        descriptor: &StageDescriptor,
        mode: DeploymentMode,
        dependency: &'static str,
    ) -> Result<Arc<dyn StageDeployer>, ConfigError> {
        self.deployers
            .get(&mode)
            .cloned()
            .ok_or_else(|| ConfigError::MissingDependency {
                stage: descriptor.name.clone(),
                dependency,
            })
    }
}
