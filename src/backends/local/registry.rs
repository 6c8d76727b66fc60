// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::StageDescriptor;
use crate::errors::ConfigError;
use crate::traits::Stage;

use super::processors::{TokenAnnotator, WordFrequencyAnnotator};

/// Builds one co-located stage instance from its descriptor.
pub type StageFactory =
    Arc<dyn Fn(&StageDescriptor) -> Result<Box<dyn Stage>, ConfigError> + Send + Sync>;

/// Table of co-located stage implementations, built once at startup.
///
/// Descriptors name an implementation key:
/// - "token_annotator" -> [`TokenAnnotator`]
/// - "word_frequency" -> [`WordFrequencyAnnotator`]
#[derive(Clone, Default)]
pub struct StageRegistry {
    factories: BTreeMap<String, StageFactory>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in stages.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("token_annotator", |d| {
            Ok(Box::new(TokenAnnotator::from_descriptor(d)?) as Box<dyn Stage>)
        });
        registry.register("word_frequency", |d| {
            Ok(Box::new(WordFrequencyAnnotator::from_descriptor(d)?) as Box<dyn Stage>)
        });
        registry
    }

    /// Add or replace an implementation.
    pub fn register<F>(&mut self, implementation: &str, factory: F)
    where
        F: Fn(&StageDescriptor) -> Result<Box<dyn Stage>, ConfigError> + Send + Sync + 'static,
    {
        self.factories
            .insert(implementation.to_string(), Arc::new(factory));
    }

    pub fn implementations(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, implementation: &str) -> bool {
        self.factories.contains_key(implementation)
    }

    /// Instantiate the implementation the descriptor names.
    pub fn create(&self, descriptor: &StageDescriptor) -> Result<Box<dyn Stage>, ConfigError> {
        let implementation = descriptor
            .implementation
            .as_deref()
            .filter(|i| !i.is_empty())
            .ok_or_else(|| ConfigError::missing_attribute(&descriptor.name, "implementation"))?;
        let factory = self.factories.get(implementation).ok_or_else(|| {
            ConfigError::UnknownImplementation {
                stage: descriptor.name.clone(),
                implementation: implementation.to_string(),
            }
        })?;
        factory(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::StubStage;
    use crate::config::DeploymentMode;

    fn descriptor(implementation: Option<&str>) -> StageDescriptor {
        let mut d = StageDescriptor::new("analysis", DeploymentMode::CoLocated);
        d.implementation = implementation.map(str::to_string);
        d
    }

    #[test]
    fn builtins_are_registered() {
        let registry = StageRegistry::with_builtins();
        assert_eq!(registry.implementations(), vec!["token_annotator", "word_frequency"]);
        let stage = registry.create(&descriptor(Some("word_frequency"))).unwrap();
        assert_eq!(stage.name(), "analysis");
    }

    #[test]
    fn unknown_and_missing_implementations_are_config_errors() {
        let registry = StageRegistry::with_builtins();
        assert!(matches!(
            registry.create(&descriptor(Some("sentiment"))),
            Err(ConfigError::UnknownImplementation { implementation, .. }) if implementation == "sentiment"
        ));
        assert!(matches!(
            registry.create(&descriptor(None)),
            Err(ConfigError::MissingRequiredAttribute { attribute: "implementation", .. })
        ));
    }

    #[test]
    fn custom_factories_can_be_added() {
        let mut registry = StageRegistry::new();
        registry.register("stub", |d| Ok(Box::new(StubStage::new(&d.name)) as Box<dyn Stage>));
        assert!(registry.contains("stub"));
        assert!(registry.create(&descriptor(Some("stub"))).is_ok());
    }
}
