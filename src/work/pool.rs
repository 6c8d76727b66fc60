// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded work object pooling.
//!
//! A single [`WorkObjectManager`] owns the backing pool shared by every
//! worker of one pipeline run. Each worker declares a [`PoolContext`] with the
//! number of work objects it may hold at once. The backing pool is sized to the
//! sum of all declared capacities and built lazily, exactly once, on the first
//! acquire from any context.
//!
//! Two different limits apply:
//! * a context at its declared capacity gets [`PoolError::TooManyOutstanding`] immediately;
//! * an exhausted backing pool makes `acquire` wait until some context releases.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tokio::sync::Semaphore;
use uuid::Uuid;

use super::object::WorkObject;
use crate::errors::PoolError;
use crate::observability::messages::pool::{BackingPoolBuilt, WorkObjectRejected};

/// Parameters applied when the backing pool is built.
///
/// `pool_size` overrides the default size, the sum of declared context
/// capacities. A smaller pool makes contexts compete for objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolTuning {
    pub initial_payload_capacity: usize,
    pub pool_size: Option<usize>,
}

/// Snapshot of the backing pool for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: usize,
    pub free: usize,
    pub constructions: usize,
}

#[derive(Default)]
struct Declared {
    total: usize,
    sealed: bool,
}

struct BackingPool {
    free: Mutex<Vec<WorkObject>>,
    available: Semaphore,
    issued: HashSet<Uuid>,
    size: usize,
}

impl BackingPool {
    fn build(size: usize, tuning: PoolTuning) -> Self {
        let objects: Vec<WorkObject> = (0..size)
            .map(|_| WorkObject::new(tuning.initial_payload_capacity))
            .collect();
        let issued = objects.iter().map(WorkObject::id).collect();
        Self {
            free: Mutex::new(objects),
            available: Semaphore::new(size),
            issued,
            size,
        }
    }

    async fn take(&self) -> Result<WorkObject, PoolError> {
        let permit = self.available.acquire().await.map_err(|_| PoolError::Closed)?;
        permit.forget();
        let mut free = self.free.lock().map_err(|_| PoolError::Closed)?;
        free.pop().ok_or(PoolError::Closed)
    }

    fn give_back(&self, mut obj: WorkObject) -> Result<(), PoolError> {
        obj.reset();
        self.free.lock().map_err(|_| PoolError::Closed)?.push(obj);
        self.available.add_permits(1);
        Ok(())
    }
}

struct ManagerInner {
    tuning: PoolTuning,
    declared: Mutex<Declared>,
    backing: OnceLock<BackingPool>,
    constructions: AtomicUsize,
}

/// Owner of the shared backing pool. Cheap to clone.
#[derive(Clone)]
pub struct WorkObjectManager {
    inner: Arc<ManagerInner>,
}

impl WorkObjectManager {
    pub fn new(tuning: PoolTuning) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                tuning,
                declared: Mutex::new(Declared::default()),
                backing: OnceLock::new(),
                constructions: AtomicUsize::new(0),
            }),
        }
    }

    /// Declare a context allowed to hold `capacity` work objects at once.
    ///
    /// Must happen before the first acquire from any context.
    pub fn context(&self, name: impl Into<String>, capacity: usize) -> Result<PoolContext, PoolError> {
        let name = name.into();
        let mut declared = self
            .inner
            .declared
            .lock()
            .map_err(|_| PoolError::Closed)?;
        if declared.sealed {
            return Err(PoolError::DeclaredAfterInit { context: name });
        }
        let capacity = capacity.max(1);
        declared.total += capacity;
        Ok(PoolContext {
            name,
            capacity,
            outstanding: Mutex::new(Outstanding::default()),
            manager: self.clone(),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.backing.get().is_some()
    }

    pub fn stats(&self) -> PoolStats {
        let constructions = self.inner.constructions.load(Ordering::SeqCst);
        match self.inner.backing.get() {
            Some(pool) => PoolStats {
                size: pool.size,
                free: pool.available.available_permits(),
                constructions,
            },
            None => PoolStats {
                size: 0,
                free: 0,
                constructions,
            },
        }
    }

    /// Backing pool, built on first use.
    ///
    /// `OnceLock` runs the builder at most once; concurrent first callers block
    /// until it finishes and never observe a partial pool.
    fn backing(&self) -> &BackingPool {
        self.inner.backing.get_or_init(|| {
            let declared_total = match self.inner.declared.lock() {
                Ok(mut declared) => {
                    declared.sealed = true;
                    declared.total
                }
                Err(poisoned) => {
                    let mut declared = poisoned.into_inner();
                    declared.sealed = true;
                    declared.total
                }
            };
            let size = self.inner.tuning.pool_size.unwrap_or(declared_total).max(1);
            self.inner.constructions.fetch_add(1, Ordering::SeqCst);
            tracing::info!(
                "{}",
                BackingPoolBuilt {
                    size,
                    initial_payload_capacity: self.inner.tuning.initial_payload_capacity,
                }
            );
            BackingPool::build(size, self.inner.tuning)
        })
    }
}

#[derive(Default)]
struct Outstanding {
    ids: HashSet<Uuid>,
    /// Acquires past the capacity check that are still waiting on the backing pool.
    reserved: usize,
}

impl Outstanding {
    fn held(&self) -> usize {
        self.ids.len() + self.reserved
    }
}

/// A capacity slot claimed by an in-flight acquire. Dropping it unclaimed
/// gives the slot back, so a failed or cancelled acquire leaves no trace.
struct Reservation<'a> {
    ctx: &'a PoolContext,
    claimed: bool,
}

impl Reservation<'_> {
    fn fulfil(mut self, outstanding: &mut Outstanding, id: Uuid) {
        outstanding.reserved = outstanding.reserved.saturating_sub(1);
        outstanding.ids.insert(id);
        self.claimed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.claimed {
            let mut outstanding = self.ctx.lock_outstanding();
            outstanding.reserved = outstanding.reserved.saturating_sub(1);
        }
    }
}

/// One worker's view of the pool, enforcing its declared capacity.
pub struct PoolContext {
    name: String,
    capacity: usize,
    outstanding: Mutex<Outstanding>,
    manager: WorkObjectManager,
}

impl PoolContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Objects held plus acquires still waiting for one.
    pub fn outstanding(&self) -> usize {
        self.lock_outstanding().held()
    }

    fn lock_outstanding(&self) -> MutexGuard<'_, Outstanding> {
        self.outstanding.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reserve(&self) -> Result<Reservation<'_>, PoolError> {
        let mut outstanding = self.lock_outstanding();
        if outstanding.held() >= self.capacity {
            return Err(PoolError::TooManyOutstanding {
                context: self.name.clone(),
                limit: self.capacity,
                requested: outstanding.held() + 1,
            });
        }
        outstanding.reserved += 1;
        Ok(Reservation {
            ctx: self,
            claimed: false,
        })
    }

    /// Borrow a work object.
    ///
    /// Fails at once if this context already holds, or is waiting for,
    /// `capacity` objects. Otherwise a slot is reserved under this context's
    /// lock and the wait for the backing pool happens outside it, so a
    /// release from the same context is never stuck behind a waiting acquire.
    /// Owner installation and bookkeeping share one critical section.
    pub async fn acquire(&self) -> Result<WorkObject, PoolError> {
        let reservation = self.reserve()?;
        let mut obj = self.manager.backing().take().await?;

        let mut outstanding = self.lock_outstanding();
        obj.install(&self.name);
        reservation.fulfil(&mut outstanding, obj.id());
        Ok(obj)
    }

    /// Return a work object borrowed from this context.
    ///
    /// An object that is not outstanding here is rejected and dropped.
    pub async fn release(&self, obj: WorkObject) -> Result<(), PoolError> {
        let id = obj.id();
        let backing = match self.manager.inner.backing.get() {
            Some(pool) if pool.issued.contains(&id) => pool,
            _ => {
                tracing::warn!("{}", WorkObjectRejected { context: &self.name, id });
                return Err(PoolError::WrongPool { id: id.to_string() });
            }
        };

        if !self.lock_outstanding().ids.remove(&id) {
            tracing::warn!("{}", WorkObjectRejected { context: &self.name, id });
            return Err(PoolError::NotOutstanding {
                context: self.name.clone(),
                id: id.to_string(),
            });
        }
        backing.give_back(obj)
    }
}
