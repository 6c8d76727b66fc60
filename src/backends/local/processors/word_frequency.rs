// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::StageDescriptor;
use crate::errors::{ConfigError, StageError};
use crate::traits::{Stage, StageMetadata};
use crate::work::{FeatureRecord, WorkObject};

use super::token_annotator::usize_option;

pub const WORD_FREQUENCY_TYPE: &str = "WordFrequency";

/// Word histogram of the document, most frequent first.
pub struct WordFrequencyAnnotator {
    name: String,
    top: Option<usize>,
}

impl WordFrequencyAnnotator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            top: None,
        }
    }

    /// `top` in the options keeps only the most frequent words.
    pub fn from_descriptor(descriptor: &StageDescriptor) -> Result<Self, ConfigError> {
        Ok(Self {
            name: descriptor.name.clone(),
            top: usize_option(descriptor, "top")?,
        })
    }
}

/// Lowercased alphanumeric words with their counts, sorted by count then word.
pub fn word_frequencies(text: &str) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in text.split_whitespace() {
        let normalized = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if !normalized.is_empty() {
            *counts.entry(normalized).or_insert(0) += 1;
        }
    }
    let mut sorted: Vec<_> = counts.into_iter().collect();
    sorted.sort_by(|(wa, ca), (wb, cb)| cb.cmp(ca).then_with(|| wa.cmp(wb)));
    sorted
}

#[async_trait]
impl Stage for WordFrequencyAnnotator {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            output_types: vec![WORD_FREQUENCY_TYPE.to_string()],
            ..StageMetadata::named(&self.name)
        }
    }

    async fn process(&mut self, work: &mut WorkObject) -> Result<(), StageError> {
        let frequencies = word_frequencies(work.document());
        let keep = self.top.unwrap_or(frequencies.len());
        for (word, count) in frequencies.into_iter().take(keep) {
            work.add_annotation(
                FeatureRecord::new(WORD_FREQUENCY_TYPE)
                    .with("word", word)
                    .with("count", count),
            );
        }
        Ok(())
    }
}
