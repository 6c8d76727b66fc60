// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

/// Turns a descriptor location into a concrete path.
///
/// Called on every deploy and again on redeploy, so a descriptor replaced on
/// disk between failures is picked up.
pub trait DescriptorResolver: Send + Sync {
    fn resolve(&self, stage: &str, location: &str) -> Result<PathBuf, ConfigError>;
}

/// Resolves locations against the filesystem, relative to an optional root.
#[derive(Debug, Clone, Default)]
pub struct FsDescriptorResolver {
    root: Option<PathBuf>,
}

impl FsDescriptorResolver {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

impl DescriptorResolver for FsDescriptorResolver {
    fn resolve(&self, stage: &str, location: &str) -> Result<PathBuf, ConfigError> {
        let candidate = Path::new(location);
        let path = match &self.root {
            Some(root) if candidate.is_relative() => root.join(candidate),
            _ => candidate.to_path_buf(),
        };
        if path.exists() {
            Ok(path)
        } else {
            Err(ConfigError::DescriptorNotFound {
                stage: stage.to_string(),
                location: location.to_string(),
            })
        }
    }
}
