// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Built-in co-located stages.

pub mod token_annotator;
pub mod word_frequency;

pub use token_annotator::TokenAnnotator;
pub use word_frequency::WordFrequencyAnnotator;
