// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::StageError;
use crate::proto::commands::{
    ANNOTATE, ANNOTATION_TIME_KEY, BATCH_PROCESS_COMPLETE, COLLECTION_PROCESS_COMPLETE, DATA_KEY,
    DOCUMENT_TEXT_KEY, KEYS_KEY, UEID_KEY,
};
use crate::proto::{Frame, FrameValue};
use crate::traits::{Stage, StageMetadata};
use crate::work::{FeatureRecord, WorkObject};

use super::proxy::RemoteServiceProxy;

/// Stage instance backed by a remote or child-process service.
pub struct RemoteStage {
    name: String,
    proxy: RemoteServiceProxy,
    metadata: StageMetadata,
    filter_types: Vec<String>,
    filter_batch: bool,
    /// Managed services are told to exit on shutdown; shared ones are left running.
    stop_service_on_shutdown: bool,
}

impl RemoteStage {
    pub fn new(
        name: impl Into<String>,
        proxy: RemoteServiceProxy,
        metadata: StageMetadata,
        filter_types: Vec<String>,
        filter_batch: bool,
        stop_service_on_shutdown: bool,
    ) -> Self {
        Self {
            name: name.into(),
            proxy,
            metadata,
            filter_types,
            filter_batch,
            stop_service_on_shutdown,
        }
    }

    pub fn proxy(&self) -> &RemoteServiceProxy {
        &self.proxy
    }

    /// Total processing time reported by the service.
    pub fn service_time(&self) -> Duration {
        self.proxy.stats().service_time
    }
}

/// Build an `Annotate` request. Annotations of filtered types are withheld.
pub fn annotate_request(work: &WorkObject, filter_types: &[String]) -> Frame {
    let mut keys = Frame::new();
    keys.add_str(UEID_KEY, work.id().to_string());
    keys.add_str(DOCUMENT_TEXT_KEY, work.document());
    for record in work
        .annotations()
        .iter()
        .filter(|r| !filter_types.contains(&r.type_name))
    {
        let mut features = Frame::new();
        for (key, value) in &record.features {
            features.add_str(key.as_str(), value.as_str());
        }
        keys.add_frame(record.type_name.as_str(), features);
    }

    let mut data = Frame::new();
    data.add_frame(KEYS_KEY, keys);
    let mut request = Frame::command(ANNOTATE);
    request.add_frame(DATA_KEY, data);
    request
}

/// Annotations carried in an `Annotate` reply.
///
/// The reply's document text is ignored; the work object keeps its own.
pub fn annotations_from_reply(reply: &Frame) -> Option<Vec<FeatureRecord>> {
    let keys = reply.get_frame(DATA_KEY)?.get_frame(KEYS_KEY)?;
    let records = keys
        .iter()
        .filter(|(key, _)| *key != UEID_KEY && *key != DOCUMENT_TEXT_KEY)
        .map(|(key, value)| match value {
            FrameValue::Frame(features) => FeatureRecord {
                type_name: key.to_string(),
                features: features
                    .iter()
                    .filter_map(|(k, v)| v.as_leaf().map(|v| (k.to_string(), v.to_string())))
                    .collect(),
            },
            FrameValue::Leaf(text) => FeatureRecord::new(key).with("value", text),
        })
        .collect();
    Some(records)
}

#[async_trait]
impl Stage for RemoteStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> StageMetadata {
        self.metadata.clone()
    }

    async fn process(&mut self, work: &mut WorkObject) -> Result<(), StageError> {
        let request = annotate_request(work, &self.filter_types);
        let reply = self.proxy.call(request).await?;

        let returned = annotations_from_reply(&reply).ok_or_else(|| {
            StageError::processing(&self.name, "reply carries no DATA/KEYS section")
        })?;
        if let Some(millis) = reply
            .get_parsed::<u64>(ANNOTATION_TIME_KEY)
            .or_else(|| reply.get_frame(DATA_KEY).and_then(|d| d.get_parsed(ANNOTATION_TIME_KEY)))
        {
            self.proxy.record_service_time(Duration::from_millis(millis));
        }

        // Withheld annotations stay, everything that was sent is replaced by the reply.
        let mut merged: Vec<FeatureRecord> = work
            .annotations()
            .iter()
            .filter(|r| self.filter_types.contains(&r.type_name))
            .cloned()
            .collect();
        merged.extend(returned);
        work.replace_annotations(merged);
        Ok(())
    }

    async fn batch_complete(&mut self) {
        if !self.filter_batch {
            self.proxy.notify(BATCH_PROCESS_COMPLETE).await;
        }
    }

    async fn collection_complete(&mut self) -> Result<(), StageError> {
        self.proxy
            .notify_and_wait(COLLECTION_PROCESS_COMPLETE)
            .await
            .map_err(StageError::from)
    }

    /// Reopen a channel a failed call closed.
    async fn reconnect(&mut self) -> Result<(), StageError> {
        if !self.proxy.is_connected() {
            self.proxy.reconnect().await?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.proxy.shutdown(self.stop_service_on_shutdown, false).await;
    }
}
