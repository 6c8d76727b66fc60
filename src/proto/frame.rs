// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Ordered key/value document exchanged with remote stages.
//!
//! A [`Frame`] is an ordered multimap: keys may repeat and insertion order is
//! preserved on the wire. Each value is either a string leaf or a nested frame.
//! Leaves stored under [`PCDATA_KEY`] are written as bare text children.

use std::str::FromStr;

use super::commands::{COMMAND_KEY, ERROR_KEY, LEGACY_ERROR_KEY};

/// Key under which bare text children are stored.
pub const PCDATA_KEY: &str = "";

/// A single value held by a [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameValue {
    Leaf(String),
    Frame(Frame),
}

impl FrameValue {
    pub fn as_leaf(&self) -> Option<&str> {
        match self {
            FrameValue::Leaf(s) => Some(s),
            FrameValue::Frame(_) => None,
        }
    }

    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            FrameValue::Frame(f) => Some(f),
            FrameValue::Leaf(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    entries: Vec<(String, FrameValue)>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a request frame carrying a single `vinci:COMMAND` entry.
    pub fn command(command: &str) -> Self {
        let mut frame = Self::new();
        frame.add_str(COMMAND_KEY, command);
        frame
    }

    pub fn add_str(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.push((key.into(), FrameValue::Leaf(value.into())));
        self
    }

    pub fn add_frame(&mut self, key: impl Into<String>, value: Frame) -> &mut Self {
        self.entries.push((key.into(), FrameValue::Frame(value)));
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: FrameValue) -> &mut Self {
        self.entries.push((key.into(), value));
        self
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&FrameValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// First leaf stored under `key`; frames under the same key are skipped.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .find_map(|(_, v)| v.as_leaf())
    }

    pub fn get_frame(&self, key: &str) -> Option<&Frame> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .find_map(|(_, v)| v.as_frame())
    }

    /// Parse the first leaf under `key`. Missing or unparsable values yield `None`.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get_str(key).and_then(|s| s.trim().parse().ok())
    }

    /// Remove every entry stored under `key`, returning how many were dropped.
    pub fn remove(&mut self, key: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FrameValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedded error reported by the service, if any.
    ///
    /// The current key is checked first, then the legacy one.
    pub fn error(&self) -> Option<&str> {
        self.get_str(ERROR_KEY)
            .or_else(|| self.get_str(LEGACY_ERROR_KEY))
    }
}

impl FromIterator<(String, FrameValue)> for Frame {
    fn from_iter<I: IntoIterator<Item = (String, FrameValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
