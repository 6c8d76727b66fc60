// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::backends::process::ProcessReaper;
use crate::config::{DeploymentMode, DirectoryConfig, ProxyOptions, StageDescriptor};
use crate::errors::{ConfigError, DeploymentError};
use crate::observability::messages::deployment::InstanceConnected;
use crate::proto::Frame;
use crate::traits::{Stage, StageDeployer, StageMetadata};

use super::proxy::{ProxySettings, RemoteServiceProxy};
use super::stage::RemoteStage;
use super::transport::Connector;

/// Proxy settings for one stage: descriptor overrides, then pipeline options.
pub fn proxy_settings(
    descriptor: &StageDescriptor,
    options: &ProxyOptions,
    directory: Option<DirectoryConfig>,
) -> ProxySettings {
    ProxySettings {
        timeout: descriptor.timeout(options),
        connect_retries: descriptor.connect_retries.or(options.connect_retries),
        retry_delay: options.retry_delay(),
        test_before_send: options.test_before_send(),
        directory,
        ..ProxySettings::default()
    }
}

/// Connects to services that run independently of the pipeline.
///
/// The services are shared, so shutdown never stops them.
pub struct RemoteServiceDeployer {
    connector: Arc<dyn Connector>,
    reaper: Arc<dyn ProcessReaper>,
    options: ProxyOptions,
    directory: Option<DirectoryConfig>,
}

impl RemoteServiceDeployer {
    pub fn new(
        connector: Arc<dyn Connector>,
        reaper: Arc<dyn ProcessReaper>,
        options: ProxyOptions,
        directory: Option<DirectoryConfig>,
    ) -> Self {
        Self {
            connector,
            reaper,
            options,
            directory,
        }
    }

    async fn connect_one(&self, descriptor: &StageDescriptor) -> Result<RemoteServiceProxy, DeploymentError> {
        let mut proxy = RemoteServiceProxy::new(
            self.connector.clone(),
            self.reaper.clone(),
            proxy_settings(descriptor, &self.options, self.directory.clone()),
        );
        match (&descriptor.service_name, &descriptor.host, descriptor.port) {
            (Some(service), _, _) => proxy.connect_named(service).await?,
            (None, Some(host), Some(port)) => proxy.connect(host, port).await?,
            _ => {
                return Err(ConfigError::invalid_descriptor(
                    &descriptor.name,
                    "remote-service needs host and port, or service_name",
                )
                .into())
            }
        }
        Ok(proxy)
    }
}

#[async_trait]
impl StageDeployer for RemoteServiceDeployer {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::RemoteService
    }

    async fn produce(
        &self,
        descriptor: &StageDescriptor,
        _resolved: Option<&Path>,
        count: usize,
    ) -> Result<Vec<Box<dyn Stage>>, DeploymentError> {
        let mut stages: Vec<Box<dyn Stage>> = Vec::with_capacity(count);
        for _ in 0..count {
            let proxy = match self.connect_one(descriptor).await {
                Ok(proxy) => proxy,
                Err(e) => {
                    // Instances already connected are not handed out; close them.
                    for mut stage in stages {
                        stage.shutdown().await;
                    }
                    return Err(e);
                }
            };
            let metadata = StageMetadata::from_frame(
                &descriptor.name,
                proxy.metadata().unwrap_or(&Frame::new()),
            );
            if let Some(endpoint) = proxy.endpoint() {
                tracing::info!(
                    "{}",
                    InstanceConnected {
                        stage: &descriptor.name,
                        endpoint: &endpoint.to_string(),
                        pid: proxy.pid(),
                    }
                );
            }
            stages.push(Box::new(RemoteStage::new(
                descriptor.name.clone(),
                proxy,
                metadata,
                descriptor.filter_types.clone(),
                self.options.filter_batch(),
                false,
            )));
        }
        Ok(stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{RecordingReaper, ScriptedConnector};
    use crate::errors::ServiceError;

    fn remote_descriptor() -> StageDescriptor {
        let mut d = StageDescriptor::new("tagger", DeploymentMode::RemoteService);
        d.protocol = Some("rpc".into());
        d.host = Some("localhost".into());
        d.port = Some(9500);
        d.timeout_ms = Some(50);
        d.connect_retries = Some(2);
        d
    }

    fn options() -> ProxyOptions {
        ProxyOptions {
            retry_delay_ms: Some(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn produces_one_connection_per_instance() {
        let connector = Arc::new(ScriptedConnector::new());
        let deployer = RemoteServiceDeployer::new(
            connector.clone(),
            Arc::new(RecordingReaper::default()),
            options(),
            None,
        );

        let stages = deployer.produce(&remote_descriptor(), None, 2).await.unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(connector.opens(), 2);
        assert_eq!(stages[0].name(), "tagger");
        assert_eq!(stages[0].metadata().name, "ScriptedService");
    }

    #[tokio::test]
    async fn unreachable_service_reports_connection_failure() {
        let connector = Arc::new(ScriptedConnector::refusing(u32::MAX));
        let deployer = RemoteServiceDeployer::new(
            connector.clone(),
            Arc::new(RecordingReaper::default()),
            options(),
            None,
        );

        let err = deployer.produce(&remote_descriptor(), None, 1).await.err().unwrap();
        assert!(matches!(
            err,
            DeploymentError::Service(ServiceError::ConnectionFailed { attempts: 2, port: 9500, .. })
        ));
    }

    #[test]
    fn descriptor_overrides_pipeline_options() {
        let settings = proxy_settings(
            &remote_descriptor(),
            &ProxyOptions {
                timeout_ms: Some(9_000),
                connect_retries: Some(7),
                ..options()
            },
            None,
        );
        assert_eq!(settings.timeout, std::time::Duration::from_millis(50));
        assert_eq!(settings.connect_retries, Some(2));
    }
}
