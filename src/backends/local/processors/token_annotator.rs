// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::config::StageDescriptor;
use crate::errors::{ConfigError, StageError};
use crate::traits::{Stage, StageMetadata};
use crate::work::{FeatureRecord, WorkObject};

pub const TOKEN_TYPE: &str = "Token";

/// Annotates every whitespace-separated token with its character offsets.
pub struct TokenAnnotator {
    name: String,
    min_length: usize,
}

impl TokenAnnotator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_length: 1,
        }
    }

    /// Built from a descriptor. `min_length` in the options drops shorter tokens.
    pub fn from_descriptor(descriptor: &StageDescriptor) -> Result<Self, ConfigError> {
        let mut annotator = Self::new(&descriptor.name);
        if let Some(min_length) = usize_option(descriptor, "min_length")? {
            annotator.min_length = min_length;
        }
        Ok(annotator)
    }
}

/// Read a non-negative integer option, given either as a number or a string.
pub(crate) fn usize_option(
    descriptor: &StageDescriptor,
    key: &str,
) -> Result<Option<usize>, ConfigError> {
    let Some(value) = descriptor.options.get(key) else {
        return Ok(None);
    };
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .map(Some)
        .ok_or_else(|| {
            ConfigError::invalid_descriptor(
                &descriptor.name,
                format!("option '{}' must be a non-negative integer", key),
            )
        })
}

/// Character offsets `(begin, end)` of each whitespace-separated token.
pub fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    let mut count = 0;
    for (i, c) in text.chars().enumerate() {
        match (c.is_whitespace(), start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
        count = i + 1;
    }
    if let Some(s) = start {
        spans.push((s, count));
    }
    spans
}

#[async_trait]
impl Stage for TokenAnnotator {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            output_types: vec![TOKEN_TYPE.to_string()],
            ..StageMetadata::named(&self.name)
        }
    }

    async fn process(&mut self, work: &mut WorkObject) -> Result<(), StageError> {
        let records: Vec<FeatureRecord> = token_spans(work.document())
            .into_iter()
            .filter(|(begin, end)| end - begin >= self.min_length)
            .map(|(begin, end)| {
                FeatureRecord::new(TOKEN_TYPE)
                    .with("begin", begin)
                    .with("end", end)
            })
            .collect();
        for record in records {
            work.add_annotation(record);
        }
        Ok(())
    }
}
