// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pipeline driver.
//!
//! `build` deploys every stage into its pool, `run` pushes documents through
//! the stages with one worker per processing thread, and `finish` drains the
//! pools.
//!
//! Each worker owns a [`PoolContext`] and processes one work object at a time.
//! A failed stage instance is handled per the stage's [`FailureStrategy`]:
//! - `redeploy`: connection and timeout failures discard the instance and
//!   produce a fresh one, up to `max_restarts` per stage
//! - `retry_in_place`: connection and timeout failures retry once on the same instance
//! - `abort`: any failure stops the run
//!
//! Failures that a fresh instance cannot fix, such as an error reported by the
//! service itself, always stop the run.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use crate::config::{validate_config, DescriptorResolver, PipelineConfig, StageDescriptor};
use crate::errors::{FailureStrategy, PipelineError, StageError};
use crate::observability::messages::deployment::StageInstanceFailed;
use crate::observability::messages::pipeline::{RunCompleted, RunStarted};
use crate::work::{FeatureRecord, PoolContext, PoolStats, PoolTuning, WorkObject, WorkObjectManager};

use super::selector::DeploymentSelector;
use super::stage_pool::{StagePool, StagePoolRegistry};

/// Outcome for one input document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentResult {
    /// Position of the document in the input.
    pub index: usize,
    pub id: Uuid,
    pub document: String,
    pub annotations: Vec<FeatureRecord>,
}

impl DocumentResult {
    fn capture(index: usize, work: &WorkObject) -> Self {
        Self {
            index,
            id: work.id(),
            document: work.document().to_string(),
            annotations: work.annotations().to_vec(),
        }
    }
}

/// Instances to deploy for a stage.
///
/// Parallelizable stages get one per worker unless `instances` says otherwise.
fn instance_count(descriptor: &StageDescriptor, workers: usize) -> usize {
    if descriptor.parallelizable == Some(false) {
        1
    } else {
        descriptor.instances.unwrap_or(workers).max(1)
    }
}

pub struct Pipeline {
    stages: Vec<Arc<StagePool>>,
    pools: StagePoolRegistry,
    work: WorkObjectManager,
    contexts: Vec<Arc<PoolContext>>,
    failure_strategy: FailureStrategy,
}

impl Pipeline {
    /// Validate the configuration and deploy every stage.
    ///
    /// If any stage fails to deploy, the stages already deployed are drained.
    pub async fn build(
        config: &PipelineConfig,
        selector: &DeploymentSelector,
        resolver: Arc<dyn DescriptorResolver>,
    ) -> Result<Self, PipelineError> {
        validate_config(config)?;

        let workers = config.processing_threads.max(1);
        let work = WorkObjectManager::new(PoolTuning {
            initial_payload_capacity: config.work_objects.initial_payload_capacity,
            pool_size: None,
        });
        let contexts = (0..workers)
            .map(|i| {
                work.context(format!("worker-{}", i), config.work_objects.capacity)
                    .map(Arc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut stages = Vec::with_capacity(config.stages.len());
        let mut pools = StagePoolRegistry::new();
        for descriptor in &config.stages {
            let deployed = Self::deploy_stage(config, selector, resolver.clone(), descriptor, workers)
                .await
                .and_then(|pool| pools.register(pool.clone()).map(|_| pool).map_err(Into::into));
            match deployed {
                Ok(pool) => stages.push(pool),
                Err(e) => {
                    for pool in &stages {
                        pool.drain().await;
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            stages,
            pools,
            work,
            contexts,
            failure_strategy: config.failure_strategy,
        })
    }

    async fn deploy_stage(
        config: &PipelineConfig,
        selector: &DeploymentSelector,
        resolver: Arc<dyn DescriptorResolver>,
        descriptor: &StageDescriptor,
        workers: usize,
    ) -> Result<Arc<StagePool>, PipelineError> {
        let deployer = selector.select(descriptor)?;
        let pool = Arc::new(StagePool::new(
            descriptor.clone(),
            deployer,
            resolver,
            config.batch_size,
        )?);
        pool.deploy(instance_count(descriptor, workers)).await?;
        Ok(pool)
    }

    /// Stage pools by name, for monitoring.
    pub fn pools(&self) -> &StagePoolRegistry {
        &self.pools
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|p| p.name()).collect()
    }

    pub fn work_object_stats(&self) -> PoolStats {
        self.work.stats()
    }

    /// Process `documents`. Results come back in input order.
    ///
    /// The first failure stops all workers once their current document is done.
    pub async fn run(&self, documents: Vec<String>) -> Result<Vec<DocumentResult>, PipelineError> {
        let total = documents.len();
        tracing::info!(
            "{}",
            RunStarted {
                documents: total,
                stages: self.stages.len(),
                workers: self.contexts.len(),
            }
        );
        let started = Instant::now();

        let queue = Arc::new(Mutex::new(documents.into_iter().enumerate().collect::<VecDeque<_>>()));
        let abort = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = self
            .contexts
            .iter()
            .map(|ctx| {
                let worker = Worker {
                    ctx: ctx.clone(),
                    stages: self.stages.clone(),
                    queue: queue.clone(),
                    abort: abort.clone(),
                    failure_strategy: self.failure_strategy,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        let mut results = Vec::with_capacity(total);
        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(done)) => results.extend(done),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(join) => {
                    first_error.get_or_insert(PipelineError::Worker(join.to_string()));
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        results.sort_by_key(|r| r.index);
        tracing::info!(
            "{}",
            RunCompleted {
                documents: results.len(),
                duration: started.elapsed(),
            }
        );
        Ok(results)
    }

    /// Send collection complete to every stage instance and shut them down.
    pub async fn finish(self) {
        for pool in &self.stages {
            pool.drain().await;
        }
    }
}

struct Worker {
    ctx: Arc<PoolContext>,
    stages: Vec<Arc<StagePool>>,
    queue: Arc<Mutex<VecDeque<(usize, String)>>>,
    abort: Arc<AtomicBool>,
    failure_strategy: FailureStrategy,
}

impl Worker {
    fn next(&self) -> Option<(usize, String)> {
        if self.abort.load(Ordering::SeqCst) {
            return None;
        }
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    async fn run(self) -> Result<Vec<DocumentResult>, PipelineError> {
        let mut done = Vec::new();
        while let Some((index, text)) = self.next() {
            let mut work = self.ctx.acquire().await?;
            work.set_document(&text);

            let mut outcome = Ok(());
            for pool in &self.stages {
                outcome = run_stage(pool, &mut work, self.failure_strategy).await;
                if outcome.is_err() {
                    break;
                }
            }
            let result = DocumentResult::capture(index, &work);
            self.ctx.release(work).await?;

            if let Err(e) = outcome {
                self.abort.store(true, Ordering::SeqCst);
                return Err(e);
            }
            done.push(result);
        }
        Ok(done)
    }
}

fn recoverable(error: &StageError) -> bool {
    matches!(error, StageError::Service(e) if e.is_connection())
}

async fn run_stage(
    pool: &StagePool,
    work: &mut WorkObject,
    default_strategy: FailureStrategy,
) -> Result<(), PipelineError> {
    let strategy = pool.descriptor().failure_strategy(default_strategy);
    let mut retried = false;
    let mut instance = pool.borrow().await?;
    loop {
        let error = match instance.process(work).await {
            Ok(()) => {
                pool.release(instance).await;
                return Ok(());
            }
            Err(e) => e,
        };
        tracing::warn!(
            "{}",
            StageInstanceFailed {
                stage: pool.name(),
                strategy: strategy.as_str(),
                error: &error,
            }
        );

        match strategy {
            FailureStrategy::Redeploy if recoverable(&error) => {
                pool.discard(instance).await;
                pool.redeploy().await?;
                instance = pool.borrow().await?;
            }
            // Same instance again, once, after it restores its connection.
            FailureStrategy::RetryInPlace if recoverable(&error) && !retried => {
                retried = true;
                if let Err(e) = instance.reconnect().await {
                    pool.release(instance).await;
                    return Err(PipelineError::Stage {
                        stage: pool.name().to_string(),
                        source: e,
                    });
                }
            }
            _ => {
                pool.release(instance).await;
                return Err(PipelineError::Stage {
                    stage: pool.name().to_string(),
                    source: error,
                });
            }
        }
    }
}
