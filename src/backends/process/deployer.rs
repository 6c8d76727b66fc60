// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Child;

use crate::backends::remote::{proxy_settings, RemoteServiceProxy, RemoteStage};
use crate::config::{DeploymentMode, ProxyOptions, StageDescriptor};
use crate::errors::{DeploymentError, StageError};
use crate::observability::messages::deployment::{ChildProcessLaunched, ServiceRelaunched};
use crate::proto::Frame;
use crate::traits::{Stage, StageDeployer, StageMetadata};
use crate::work::WorkObject;

use super::launcher::LaunchSpec;
use super::reaper::ProcessReaper;
use super::transport::TransportAdapter;

/// Launches one service process per instance and talks to it over the wire.
pub struct ChildProcessDeployer {
    transport: Arc<dyn TransportAdapter>,
    reaper: Arc<dyn ProcessReaper>,
    options: ProxyOptions,
}

impl ChildProcessDeployer {
    pub fn new(
        transport: Arc<dyn TransportAdapter>,
        reaper: Arc<dyn ProcessReaper>,
        options: ProxyOptions,
    ) -> Self {
        Self {
            transport,
            reaper,
            options,
        }
    }

    /// Launch and connect, relaunching up to `max_restarts` times.
    async fn launch(
        &self,
        descriptor: &StageDescriptor,
        resolved: Option<&Path>,
    ) -> Result<ManagedStage, DeploymentError> {
        let limit = descriptor.max_restarts();
        let mut attempt = 0;
        loop {
            match self.launch_once(descriptor, resolved).await {
                Ok(stage) => return Ok(stage),
                Err(e) if attempt < limit => {
                    attempt += 1;
                    tracing::warn!(
                        "{}",
                        ServiceRelaunched {
                            stage: &descriptor.name,
                            attempt,
                            limit,
                            error: &e,
                        }
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn launch_once(
        &self,
        descriptor: &StageDescriptor,
        resolved: Option<&Path>,
    ) -> Result<ManagedStage, DeploymentError> {
        let port = self.transport.allocate_port()?;
        let spawned = LaunchSpec::from_descriptor(descriptor, resolved, port)
            .map_err(DeploymentError::from)
            .and_then(|spec| spec.spawn(&descriptor.name));
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                self.transport.release_port(port);
                return Err(e);
            }
        };

        let mut proxy = RemoteServiceProxy::new(
            self.transport.connector(),
            self.reaper.clone(),
            proxy_settings(descriptor, &self.options, None),
        );
        if let Err(e) = proxy.connect(self.transport.host(), port).await {
            reap(&mut child).await;
            self.transport.release_port(port);
            return Err(e.into());
        }
        if proxy.pid().is_none() {
            if let Some(pid) = child.id() {
                proxy.set_pid(pid);
            }
        }

        tracing::info!(
            "{}",
            ChildProcessLaunched {
                stage: &descriptor.name,
                pid: proxy.pid(),
                port,
            }
        );

        let metadata = StageMetadata::from_frame(
            &descriptor.name,
            proxy.metadata().unwrap_or(&Frame::new()),
        );
        Ok(ManagedStage {
            inner: RemoteStage::new(
                descriptor.name.clone(),
                proxy,
                metadata,
                descriptor.filter_types.clone(),
                self.options.filter_batch(),
                true,
            ),
            child: Some(child),
            port,
            transport: self.transport.clone(),
        })
    }
}

#[async_trait]
impl StageDeployer for ChildProcessDeployer {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::ChildProcess
    }

    async fn produce(
        &self,
        descriptor: &StageDescriptor,
        resolved: Option<&Path>,
        count: usize,
    ) -> Result<Vec<Box<dyn Stage>>, DeploymentError> {
        let mut stages: Vec<Box<dyn Stage>> = Vec::with_capacity(count);
        for _ in 0..count {
            match self.launch(descriptor, resolved).await {
                Ok(stage) => stages.push(Box::new(stage)),
                Err(e) => {
                    for mut stage in stages {
                        stage.shutdown().await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(stages)
    }
}

async fn reap(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::debug!("Child process already gone: {}", e);
    }
}

/// Remote stage that owns the service process it talks to.
pub struct ManagedStage {
    inner: RemoteStage,
    child: Option<Child>,
    port: u16,
    transport: Arc<dyn TransportAdapter>,
}

impl ManagedStage {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn remote(&self) -> &RemoteStage {
        &self.inner
    }
}

#[async_trait]
impl Stage for ManagedStage {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn metadata(&self) -> StageMetadata {
        self.inner.metadata()
    }

    async fn process(&mut self, work: &mut WorkObject) -> Result<(), StageError> {
        self.inner.process(work).await
    }

    async fn batch_complete(&mut self) {
        self.inner.batch_complete().await;
    }

    async fn collection_complete(&mut self) -> Result<(), StageError> {
        self.inner.collection_complete().await
    }

    async fn reconnect(&mut self) -> Result<(), StageError> {
        self.inner.reconnect().await
    }

    async fn shutdown(&mut self) {
        self.inner.shutdown().await;
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => reap(&mut child).await,
            }
            self.transport.release_port(self.port);
        }
    }
}
