// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    CONNECT_RETRY_DELAY, DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_RESTARTS, DEFAULT_PROCESSING_THREADS,
    DEFAULT_WORK_OBJECT_CAPACITY, FILTER_BATCH_ENV, TEST_BEFORE_SEND_ENV,
};
use crate::errors::{ConfigError, FailureStrategy};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level pipeline configuration.
///
/// Typically loaded from a YAML file with [`load_and_validate_config`].
///
/// # Fields
/// * `processing_threads` - Number of concurrent workers driving work objects (default 1)
/// * `batch_size` - Send `batch_complete` to an instance after this many work objects (optional)
/// * `work_objects` - Per-worker work object capacity and payload tuning
/// * `directory` - Name-resolution service used by `service_name` stages (optional)
/// * `proxy` - Remote proxy tunables shared by all remote stages
/// * `failure_strategy` - Default handling of a failed stage instance
/// * `descriptor_root` - Base directory for relative descriptor locations (optional)
/// * `stages` - Ordered list of stage descriptors
///
/// # Example
/// ```yaml
/// processing_threads: 2
/// batch_size: 100
/// work_objects:
///   capacity: 1
/// directory:
///   host: vns.internal
///   port: 9005
/// stages:
///   - name: tokens
///     deployment: co-located
///     implementation: token_annotator
///   - name: tagger
///     deployment: remote-service
///     protocol: rpc
///     host: localhost
///     port: 9500
///     timeout_ms: 500
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_processing_threads")]
    pub processing_threads: usize,
    #[serde(default)]
    pub batch_size: Option<u64>,
    #[serde(default)]
    pub work_objects: WorkObjectConfig,
    #[serde(default)]
    pub directory: Option<DirectoryConfig>,
    #[serde(default)]
    pub proxy: ProxyOptions,
    #[serde(default)]
    pub failure_strategy: FailureStrategy,
    #[serde(default)]
    pub descriptor_root: Option<PathBuf>,
    pub stages: Vec<StageDescriptor>,
}

fn default_processing_threads() -> usize {
    DEFAULT_PROCESSING_THREADS
}

impl PipelineConfig {
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Directory service address from the config, falling back to `VNS_HOST`/`VNS_PORT`.
    pub fn directory(&self) -> Option<DirectoryConfig> {
        self.directory.clone().or_else(DirectoryConfig::from_env)
    }
}

/// Work object pool sizing.
///
/// `capacity` is how many work objects one worker may hold at once.
/// `initial_payload_capacity` pre-sizes each object's document buffer.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkObjectConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub initial_payload_capacity: usize,
}

fn default_capacity() -> usize {
    DEFAULT_WORK_OBJECT_CAPACITY
}

impl Default for WorkObjectConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_WORK_OBJECT_CAPACITY,
            initial_payload_capacity: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectoryConfig {
    pub host: String,
    pub port: u16,
}

impl DirectoryConfig {
    /// Both variables must be set; a missing or unparsable port counts as unset.
    pub fn from_env() -> Option<Self> {
        use crate::config::consts::{DIRECTORY_HOST_ENV, DIRECTORY_PORT_ENV};

        let host = std::env::var(DIRECTORY_HOST_ENV).ok().filter(|h| !h.is_empty())?;
        let port = std::env::var(DIRECTORY_PORT_ENV).ok()?.trim().parse().ok()?;
        Some(Self { host, port })
    }
}

/// Tunables shared by every remote proxy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyOptions {
    pub timeout_ms: Option<u64>,
    pub connect_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub test_before_send: Option<bool>,
    pub filter_batch: Option<bool>,
}

impl ProxyOptions {
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(CONNECT_RETRY_DELAY)
    }

    /// Config value wins, otherwise any non-empty `TEST_BEFORE_SEND` enables it.
    pub fn test_before_send(&self) -> bool {
        self.test_before_send
            .unwrap_or_else(|| env_flag(TEST_BEFORE_SEND_ENV))
    }

    pub fn filter_batch(&self) -> bool {
        self.filter_batch.unwrap_or_else(|| env_flag(FILTER_BATCH_ENV))
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(false)
}

/// How a stage's instances run relative to the pipeline process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeploymentMode {
    CoLocated,
    ChildProcess,
    RemoteService,
}

impl DeploymentMode {
    /// Parse a descriptor's mode string. Historic names are accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "co-located" | "colocated" | "co_located" | "integrated" => Some(Self::CoLocated),
            "child-process" | "child_process" | "local" => Some(Self::ChildProcess),
            "remote-service" | "remote_service" | "remote" => Some(Self::RemoteService),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoLocated => "co-located",
            Self::ChildProcess => "child-process",
            Self::RemoteService => "remote-service",
        }
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative description of one pipeline stage.
///
/// # Fields
/// * `name` - Unique stage name (required)
/// * `deployment` - `co-located`, `child-process` or `remote-service`
/// * `implementation` - Registry key of a co-located stage
/// * `descriptor` - Location of the stage's descriptor file, re-resolved on redeploy
/// * `protocol` - Wire protocol of a remote service
/// * `host` / `port` / `service_name` - Remote endpoint, literal or resolved via the directory
/// * `timeout_ms` / `connect_retries` - Per-stage proxy overrides
/// * `executable` / `args` / `env` / `log_dir` - Child-process launch specification
/// * `filter_types` - Annotation types withheld from remote requests
/// * `instances` - Instances to deploy when the stage is parallelizable
/// * `parallelizable` - Whether the pipeline may run several instances at once (default true)
/// * `max_restarts` - Redeploys allowed before the pipeline gives up
/// * `on_failure` - Overrides the pipeline's failure strategy
/// * `options` - Free-form options handed to co-located factories
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StageDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub deployment: Option<String>,
    pub implementation: Option<String>,
    pub descriptor: Option<String>,
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub service_name: Option<String>,
    pub timeout_ms: Option<u64>,
    pub connect_retries: Option<u32>,
    pub executable: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub filter_types: Vec<String>,
    pub instances: Option<usize>,
    pub parallelizable: Option<bool>,
    pub max_restarts: Option<u32>,
    pub on_failure: Option<FailureStrategy>,
    #[serde(default)]
    pub options: HashMap<String, serde_yaml::Value>,
}

impl StageDescriptor {
    pub fn new(name: impl Into<String>, deployment: DeploymentMode) -> Self {
        Self {
            name: name.into(),
            deployment: Some(deployment.as_str().to_string()),
            ..Default::default()
        }
    }

    /// The declared deployment mode.
    ///
    /// Missing and unrecognized modes are both reported as a missing required attribute.
    pub fn deployment_mode(&self) -> Result<DeploymentMode, ConfigError> {
        let declared = self
            .deployment
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| ConfigError::missing_attribute(&self.name, "deployment"))?;

        DeploymentMode::parse(declared).ok_or_else(|| ConfigError::MissingRequiredAttribute {
            stage: self.name.clone(),
            attribute: "deployment",
            detail: Some(format!("unsupported value '{}'", declared)),
        })
    }

    pub fn timeout(&self, proxy: &ProxyOptions) -> Duration {
        self.timeout_ms
            .or(proxy.timeout_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CALL_TIMEOUT)
    }

    pub fn max_restarts(&self) -> u32 {
        self.max_restarts.unwrap_or(DEFAULT_MAX_RESTARTS)
    }

    pub fn failure_strategy(&self, pipeline_default: FailureStrategy) -> FailureStrategy {
        self.on_failure.unwrap_or(pipeline_default)
    }
}

/// Load a config from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Load {
        path: path.display().to_string(),
        source,
    })?;
    PipelineConfig::from_yaml(&content)
}

/// Load a config from a YAML file and check every stage descriptor.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, ConfigError> {
    let cfg = load_config(path)?;
    crate::config::validate_config(&cfg)?;
    Ok(cfg)
}
