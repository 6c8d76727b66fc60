// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::backends::local::StageRegistry;
use crate::backends::stub::FakeService;
use crate::config::{FsDescriptorResolver, PipelineConfig};
use crate::engine::{DeploymentSelector, Pipeline};
use crate::errors::{DeploymentError, PipelineError, ServiceError};
use crate::proto::commands::{
    ANNOTATE, BATCH_PROCESS_COMPLETE, COLLECTION_PROCESS_COMPLETE, GET_META, SHUTDOWN,
};

/// Full pipelines over real TCP against an in-process frame service
#[cfg(test)]
mod tests {
    use super::*;

    async fn build(yaml: &str) -> Result<Pipeline, PipelineError> {
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let selector =
            DeploymentSelector::standard(Arc::new(StageRegistry::with_builtins()), &config);
        Pipeline::build(&config, &selector, Arc::new(FsDescriptorResolver::default())).await
    }

    #[tokio::test]
    async fn co_located_and_remote_stages_share_the_work_object() {
        let service = FakeService::start().await.unwrap();
        let yaml = format!(
            r#"
processing_threads: 2
batch_size: 2
proxy:
  timeout_ms: 2000
  retry_delay_ms: 10
  test_before_send: false
  filter_batch: false
stages:
  - name: tokens
    deployment: co-located
    implementation: token_annotator
  - name: length
    deployment: remote-service
    protocol: rpc
    host: 127.0.0.1
    port: {}
    instances: 1
"#,
            service.port()
        );
        let pipeline = build(&yaml).await.unwrap();
        assert_eq!(pipeline.pools().get("length").unwrap().size().await, 1);
        assert_eq!(
            pipeline.pools().get("length").unwrap().metadata().await.unwrap().name,
            "FakeService"
        );

        let docs = vec![
            "the quick brown fox".to_string(),
            "jumps".to_string(),
            "over the lazy dog".to_string(),
            "twice".to_string(),
        ];
        let results = pipeline.run(docs).await.unwrap();
        assert_eq!(results.len(), 4);

        let first = &results[0];
        let tokens = first.annotations.iter().filter(|a| a.type_name == "Token").count();
        assert_eq!(tokens, 4);
        let length = first
            .annotations
            .iter()
            .find(|a| a.type_name == "Length")
            .unwrap();
        assert_eq!(length.features["chars"], "19");

        pipeline.finish().await;
        assert_eq!(service.count(GET_META), 1);
        assert_eq!(service.count(ANNOTATE), 4);
        assert_eq!(service.count(BATCH_PROCESS_COMPLETE), 2);
        assert_eq!(service.count(COLLECTION_PROCESS_COMPLETE), 1);
        // Shared services are left running.
        assert_eq!(service.count(SHUTDOWN), 0);
    }

    #[tokio::test]
    async fn filtered_types_survive_the_remote_round_trip() {
        let service = FakeService::start().await.unwrap();
        let yaml = format!(
            r#"
proxy:
  timeout_ms: 2000
  filter_batch: true
stages:
  - name: tokens
    deployment: co-located
    implementation: token_annotator
  - name: length
    deployment: remote-service
    protocol: vinci
    host: 127.0.0.1
    port: {}
    filter_types: [Token]
"#,
            service.port()
        );
        let pipeline = build(&yaml).await.unwrap();
        let results = pipeline.run(vec!["a b".into()]).await.unwrap();

        let types: Vec<_> = results[0]
            .annotations
            .iter()
            .map(|a| a.type_name.as_str())
            .collect();
        assert_eq!(types, vec!["Token", "Token", "Length"]);
        pipeline.finish().await;
        assert_eq!(service.count(BATCH_PROCESS_COMPLETE), 0);
    }

    #[tokio::test]
    async fn unreachable_remote_stage_fails_the_build() {
        // Bind and drop to find a port nothing listens on.
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let yaml = format!(
            r#"
proxy:
  timeout_ms: 500
  connect_retries: 2
  retry_delay_ms: 1
stages:
  - name: tagger
    deployment: remote
    protocol: rpc
    host: 127.0.0.1
    port: {}
"#,
            port
        );
        let err = build(&yaml).await.err().unwrap();
        assert!(matches!(
            err,
            PipelineError::Deployment(DeploymentError::Service(ServiceError::ConnectionFailed {
                attempts: 2,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn named_remote_stage_without_directory_is_a_config_failure() {
        let yaml = r#"
stages:
  - name: tagger
    deployment: remote-service
    protocol: rpc
    service_name: tagger-service
"#;
        let mut config = PipelineConfig::from_yaml(yaml).unwrap();
        config.directory = None;
        let selector = DeploymentSelector::new().with_deployer(Arc::new(
            crate::backends::remote::RemoteServiceDeployer::new(
                Arc::new(crate::backends::remote::TcpConnector::new(
                    std::time::Duration::from_millis(100),
                )),
                Arc::new(crate::backends::process::SignalReaper),
                config.proxy.clone(),
                None,
            ),
        ));
        let err = Pipeline::build(&config, &selector, Arc::new(FsDescriptorResolver::default()))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PipelineError::Deployment(DeploymentError::Service(ServiceError::Config(_)))
        ));
    }
}
