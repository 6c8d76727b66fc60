// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pools of deployed stage instances, one per stage type.
//!
//! A pool lends each instance to one worker at a time. `deploy`, `redeploy`,
//! `borrow`, `release` and `discard` all take the pool's lock, so a pool is
//! never read while it is being redeployed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

use crate::config::{DescriptorResolver, StageDescriptor};
use crate::errors::{ConfigError, DeploymentError, StageError};
use crate::observability::messages::deployment::{
    RestartLimitReached, StageDeployed, StagePoolDrained, StageRedeployed,
};
use crate::observability::messages::pipeline::CollectionCompleteFailed;
use crate::traits::{Stage, StageDeployer, StageMetadata};
use crate::work::WorkObject;

/// A stage instance on loan from its pool.
///
/// Counts the work objects it processed and sends `batch_complete` every
/// `batch_size` of them.
pub struct PooledStage {
    stage: Box<dyn Stage>,
    processed: u64,
    batch_size: Option<u64>,
}

impl PooledStage {
    fn new(stage: Box<dyn Stage>, batch_size: Option<u64>) -> Self {
        Self {
            stage,
            processed: 0,
            batch_size: batch_size.filter(|n| *n > 0),
        }
    }

    pub fn name(&self) -> &str {
        self.stage.name()
    }

    pub fn metadata(&self) -> StageMetadata {
        self.stage.metadata()
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub async fn process(&mut self, work: &mut WorkObject) -> Result<(), StageError> {
        self.stage.process(work).await?;
        self.processed += 1;
        if let Some(batch) = self.batch_size {
            if self.processed % batch == 0 {
                self.stage.batch_complete().await;
            }
        }
        Ok(())
    }

    pub async fn reconnect(&mut self) -> Result<(), StageError> {
        self.stage.reconnect().await
    }

    async fn finish(mut self) -> Result<(), StageError> {
        let result = self.stage.collection_complete().await;
        self.stage.shutdown().await;
        result
    }
}

#[derive(Default)]
struct PoolState {
    idle: Vec<PooledStage>,
    live: usize,
    restarts: u32,
    drained: bool,
    metadata: Option<StageMetadata>,
}

/// Point-in-time view of a pool for monitoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub stage: String,
    pub size: usize,
    pub idle: usize,
    pub restarts: u32,
}

/// Ready-to-use instances of one stage type.
pub struct StagePool {
    descriptor: StageDescriptor,
    deployer: Arc<dyn StageDeployer>,
    resolver: Arc<dyn DescriptorResolver>,
    batch_size: Option<u64>,
    state: Mutex<PoolState>,
    available: Semaphore,
}

impl StagePool {
    /// A pool for `descriptor`. The stage must be named.
    pub fn new(
        descriptor: StageDescriptor,
        deployer: Arc<dyn StageDeployer>,
        resolver: Arc<dyn DescriptorResolver>,
        batch_size: Option<u64>,
    ) -> Result<Self, ConfigError> {
        if descriptor.name.trim().is_empty() {
            return Err(ConfigError::MissingStageName);
        }
        Ok(Self {
            descriptor,
            deployer,
            resolver,
            batch_size,
            state: Mutex::new(PoolState::default()),
            available: Semaphore::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &StageDescriptor {
        &self.descriptor
    }

    /// Metadata of the first deployed instance.
    pub async fn metadata(&self) -> Option<StageMetadata> {
        self.state.lock().await.metadata.clone()
    }

    /// Instances owned by the pool, idle or on loan.
    pub async fn size(&self) -> usize {
        self.state.lock().await.live
    }

    pub async fn idle(&self) -> usize {
        self.state.lock().await.idle.len()
    }

    pub async fn restarts(&self) -> u32 {
        self.state.lock().await.restarts
    }

    pub async fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock().await;
        PoolSnapshot {
            stage: self.descriptor.name.clone(),
            size: state.live,
            idle: state.idle.len(),
            restarts: state.restarts,
        }
    }

    fn resolve(&self) -> Result<Option<PathBuf>, ConfigError> {
        self.descriptor
            .descriptor
            .as_deref()
            .map(|location| self.resolver.resolve(&self.descriptor.name, location))
            .transpose()
    }

    /// Produce `count` instances and add them to the pool.
    pub async fn deploy(&self, count: usize) -> Result<usize, DeploymentError> {
        let mut state = self.state.lock().await;
        if state.drained {
            return Err(self.drained_error());
        }
        let resolved = self.resolve()?;
        let produced = self
            .deployer
            .produce(&self.descriptor, resolved.as_deref(), count)
            .await?;
        let added = produced.len();
        self.add(&mut state, produced);

        tracing::info!(
            "{}",
            StageDeployed {
                stage: &self.descriptor.name,
                mode: self.deployer.mode().as_str(),
                instances: added,
            }
        );
        Ok(added)
    }

    fn add(&self, state: &mut PoolState, produced: Vec<Box<dyn Stage>>) {
        if state.metadata.is_none() {
            state.metadata = produced.first().map(|s| s.metadata());
        }
        let added = produced.len();
        state.idle.extend(
            produced
                .into_iter()
                .map(|s| PooledStage::new(s, self.batch_size)),
        );
        state.live += added;
        self.available.add_permits(added);
    }

    /// Replace one failed instance with a fresh one from the same descriptor.
    ///
    /// The descriptor location is resolved again. Every call counts against
    /// `max_restarts`, successful or not.
    pub async fn redeploy(&self) -> Result<(), DeploymentError> {
        let mut state = self.state.lock().await;
        if state.drained {
            return Err(self.drained_error());
        }
        let limit = self.descriptor.max_restarts();
        if state.restarts >= limit {
            tracing::error!(
                "{}",
                RestartLimitReached {
                    stage: &self.descriptor.name,
                    limit,
                }
            );
            self.close_if_empty(&state);
            return Err(DeploymentError::RestartLimit {
                stage: self.descriptor.name.clone(),
                limit,
            });
        }
        state.restarts += 1;

        let produced = match self.resolve() {
            Ok(resolved) => {
                self.deployer
                    .produce(&self.descriptor, resolved.as_deref(), 1)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        match produced {
            Ok(produced) => {
                self.add(&mut state, produced);
                tracing::info!(
                    "{}",
                    StageRedeployed {
                        stage: &self.descriptor.name,
                        restarts: state.restarts,
                        limit,
                    }
                );
                Ok(())
            }
            Err(e) => {
                self.close_if_empty(&state);
                Err(e)
            }
        }
    }

    /// With no instances left and none coming, waiting borrowers must not hang.
    fn close_if_empty(&self, state: &PoolState) {
        if state.live == 0 {
            self.available.close();
        }
    }

    fn drained_error(&self) -> DeploymentError {
        DeploymentError::PoolDrained {
            stage: self.descriptor.name.clone(),
        }
    }

    /// Take an idle instance, waiting until one is returned if none is.
    pub async fn borrow(&self) -> Result<PooledStage, DeploymentError> {
        let permit = self
            .available
            .acquire()
            .await
            .map_err(|_| self.drained_error())?;
        permit.forget();
        let mut state = self.state.lock().await;
        state.idle.pop().ok_or_else(|| self.drained_error())
    }

    /// Return a borrowed instance.
    pub async fn release(&self, stage: PooledStage) {
        let mut state = self.state.lock().await;
        if state.drained {
            state.live = state.live.saturating_sub(1);
            drop(state);
            if let Err(e) = stage.finish().await {
                tracing::warn!(
                    "{}",
                    CollectionCompleteFailed {
                        stage: &self.descriptor.name,
                        error: &e,
                    }
                );
            }
            return;
        }
        state.idle.push(stage);
        self.available.add_permits(1);
    }

    /// Drop a failed instance. It is shut down, not returned.
    pub async fn discard(&self, mut stage: PooledStage) {
        stage.stage.shutdown().await;
        let mut state = self.state.lock().await;
        state.live = state.live.saturating_sub(1);
    }

    /// Finish every idle instance: collection complete, then shutdown.
    ///
    /// Instances still on loan are finished when they are released.
    pub async fn drain(&self) -> usize {
        let idle = {
            let mut state = self.state.lock().await;
            state.drained = true;
            self.available.close();
            let idle = std::mem::take(&mut state.idle);
            state.live = state.live.saturating_sub(idle.len());
            idle
        };
        let count = idle.len();
        for stage in idle {
            if let Err(e) = stage.finish().await {
                tracing::warn!(
                    "{}",
                    CollectionCompleteFailed {
                        stage: &self.descriptor.name,
                        error: &e,
                    }
                );
            }
        }
        tracing::info!(
            "{}",
            StagePoolDrained {
                stage: &self.descriptor.name,
                instances: count,
            }
        );
        count
    }
}

/// Stage pools by stage name.
#[derive(Default)]
pub struct StagePoolRegistry {
    pools: BTreeMap<String, Arc<StagePool>>,
}

impl StagePoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pool: Arc<StagePool>) -> Result<(), ConfigError> {
        if self.pools.contains_key(pool.name()) {
            return Err(ConfigError::DuplicateStageName {
                name: pool.name().to_string(),
            });
        }
        self.pools.insert(pool.name().to_string(), pool);
        Ok(())
    }

    pub fn get(&self, stage: &str) -> Option<Arc<StagePool>> {
        self.pools.get(stage).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.pools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Monitoring view of one pool.
    pub async fn snapshot(&self, stage: &str) -> Option<PoolSnapshot> {
        match self.pools.get(stage) {
            Some(pool) => Some(pool.snapshot().await),
            None => None,
        }
    }

    pub async fn snapshots(&self) -> Vec<PoolSnapshot> {
        let mut all = Vec::with_capacity(self.pools.len());
        for pool in self.pools.values() {
            all.push(pool.snapshot().await);
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::CountingDeployer;
    use crate::config::{DeploymentMode, FsDescriptorResolver};
    use crate::work::{PoolTuning, WorkObjectManager};
    use std::time::Duration;

    fn descriptor(name: &str) -> StageDescriptor {
        let mut d = StageDescriptor::new(name, DeploymentMode::CoLocated);
        d.max_restarts = Some(2);
        d
    }

    fn pool_with(
        descriptor: StageDescriptor,
        deployer: Arc<CountingDeployer>,
        batch_size: Option<u64>,
    ) -> StagePool {
        StagePool::new(
            descriptor,
            deployer,
            Arc::new(FsDescriptorResolver::default()),
            batch_size,
        )
        .unwrap()
    }

    async fn work() -> (crate::work::PoolContext, WorkObject) {
        let manager = WorkObjectManager::new(PoolTuning::default());
        let ctx = manager.context("test", 1).unwrap();
        let obj = ctx.acquire().await.unwrap();
        (ctx, obj)
    }

    #[test]
    fn unnamed_stage_is_rejected_before_deploy() {
        let deployer = Arc::new(CountingDeployer::new(DeploymentMode::CoLocated));
        let result = StagePool::new(
            descriptor("  "),
            deployer.clone(),
            Arc::new(FsDescriptorResolver::default()),
            None,
        );
        assert!(matches!(result, Err(ConfigError::MissingStageName)));
        assert!(deployer.calls().is_empty());
    }

    #[tokio::test]
    async fn redeploy_replaces_failed_instance_from_same_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tagger.yaml"), "name: tagger").unwrap();
        let mut d = descriptor("tagger");
        d.descriptor = Some("tagger.yaml".into());

        let deployer = Arc::new(CountingDeployer::new(DeploymentMode::CoLocated).failing_first(1));
        let pool = StagePool::new(
            d,
            deployer.clone(),
            Arc::new(FsDescriptorResolver::new(Some(dir.path().to_path_buf()))),
            None,
        )
        .unwrap();
        assert_eq!(pool.deploy(2).await.unwrap(), 2);
        assert_eq!(pool.size().await, 2);

        // Find the failing instance and replace it.
        let (_ctx, mut obj) = work().await;
        let first = pool.borrow().await.unwrap();
        let second = pool.borrow().await.unwrap();
        let (mut bad, good) = {
            let mut a = first;
            if a.process(&mut obj).await.is_ok() {
                (second, a)
            } else {
                (a, second)
            }
        };
        assert!(bad.process(&mut obj).await.is_err());
        pool.release(good).await;
        pool.discard(bad).await;
        pool.redeploy().await.unwrap();

        assert_eq!(pool.size().await, 2);
        assert_eq!(pool.restarts().await, 1);
        let calls = deployer.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].count, 1);
        assert_eq!(calls[1].descriptor, calls[0].descriptor);
        assert_eq!(calls[1].resolved, Some(dir.path().join("tagger.yaml")));
        assert!(deployer.log().contains(&"tagger#0:shutdown".to_string()));
    }

    #[tokio::test]
    async fn redeploy_stops_at_restart_limit() {
        let deployer = Arc::new(CountingDeployer::new(DeploymentMode::CoLocated));
        let pool = pool_with(descriptor("tagger"), deployer.clone(), None);
        pool.deploy(1).await.unwrap();

        pool.redeploy().await.unwrap();
        pool.redeploy().await.unwrap();
        let err = pool.redeploy().await.unwrap_err();
        assert!(matches!(err, DeploymentError::RestartLimit { limit: 2, .. }));
        assert_eq!(deployer.produced(), 3);
    }

    #[tokio::test]
    async fn borrowed_instance_is_never_lent_twice() {
        let deployer = Arc::new(CountingDeployer::new(DeploymentMode::CoLocated));
        let pool = Arc::new(pool_with(descriptor("tagger"), deployer, None));
        pool.deploy(1).await.unwrap();

        let held = pool.borrow().await.unwrap();
        let waiting = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.borrow().await.map(|s| s.processed()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());
        assert_eq!(pool.idle().await, 0);

        pool.release(held).await;
        assert!(waiting.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn batch_complete_follows_per_instance_cadence() {
        let deployer = Arc::new(CountingDeployer::new(DeploymentMode::CoLocated));
        let pool = pool_with(descriptor("tagger"), deployer.clone(), Some(2));
        pool.deploy(1).await.unwrap();

        let (_ctx, mut obj) = work().await;
        let mut stage = pool.borrow().await.unwrap();
        for _ in 0..5 {
            stage.process(&mut obj).await.unwrap();
        }
        pool.release(stage).await;

        let batches = deployer
            .log()
            .iter()
            .filter(|c| c.ends_with("batch_complete"))
            .count();
        assert_eq!(batches, 2);
    }

    #[tokio::test]
    async fn drain_finishes_idle_and_late_returned_instances() {
        let deployer = Arc::new(CountingDeployer::new(DeploymentMode::CoLocated));
        let pool = pool_with(descriptor("tagger"), deployer.clone(), None);
        pool.deploy(2).await.unwrap();

        let on_loan = pool.borrow().await.unwrap();
        assert_eq!(pool.drain().await, 1);
        assert!(matches!(pool.borrow().await, Err(DeploymentError::PoolDrained { .. })));
        assert_eq!(pool.size().await, 1);

        pool.release(on_loan).await;
        assert_eq!(pool.size().await, 0);
        let log = deployer.log();
        assert_eq!(log.iter().filter(|c| c.ends_with("collection_complete")).count(), 2);
        assert_eq!(log.iter().filter(|c| c.ends_with("shutdown")).count(), 2);
    }

    #[tokio::test]
    async fn registry_reports_pools_by_name() {
        let deployer = Arc::new(CountingDeployer::new(DeploymentMode::CoLocated));
        let pool = Arc::new(pool_with(descriptor("tagger"), deployer.clone(), None));
        pool.deploy(3).await.unwrap();

        let mut registry = StagePoolRegistry::new();
        registry.register(pool.clone()).unwrap();
        assert!(matches!(
            registry.register(pool),
            Err(ConfigError::DuplicateStageName { .. })
        ));

        let _held = registry.get("tagger").unwrap().borrow().await.unwrap();
        assert_eq!(
            registry.snapshot("tagger").await,
            Some(PoolSnapshot {
                stage: "tagger".into(),
                size: 3,
                idle: 2,
                restarts: 0,
            })
        );
        assert!(registry.snapshot("parser").await.is_none());
    }
}
