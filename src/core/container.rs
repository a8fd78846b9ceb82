//! Service container
//!
//! Holds the assembled engine so HTTP apps receive their dependencies instead
//! of reaching for globals.

use std::{sync::Arc, time::Duration};

use log::{info, warn};

use crate::{
    executor::{BoundedPool, PoolStats},
    orchestration::{RequestExecutor, RequestRouter},
};

pub struct ServiceContainer {
    executor: Arc<RequestExecutor>,
    router: Arc<RequestRouter>,
    /// Shared pool behind the pooled strategy
    task_pool: BoundedPool,
    /// Fixed pool for CPU items of the structured strategy
    cpu_pool: BoundedPool,
}

impl ServiceContainer {
    pub fn new(
        executor: RequestExecutor,
        router: RequestRouter,
        task_pool: BoundedPool,
        cpu_pool: BoundedPool,
    ) -> Self {
        Self {
            executor: Arc::new(executor),
            router: Arc::new(router),
            task_pool,
            cpu_pool,
        }
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn router(&self) -> &RequestRouter {
        &self.router
    }

    pub fn task_pool(&self) -> &BoundedPool {
        &self.task_pool
    }

    pub fn cpu_pool(&self) -> &BoundedPool {
        &self.cpu_pool
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        vec![self.task_pool.stats(), self.cpu_pool.stats()]
    }

    /// Stop both pools and wait up to `grace` for their workers.
    pub fn shutdown(&self, grace: Duration) -> bool {
        self.task_pool.shutdown();
        self.cpu_pool.shutdown();

        let drained =
            self.task_pool.await_termination(grace) && self.cpu_pool.await_termination(grace);
        if drained {
            info!("Worker pools drained");
        } else {
            warn!("Worker pools still busy after {grace:?}");
        }
        drained
    }
}
