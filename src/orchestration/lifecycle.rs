//! Component lifecycle management
//!
//! Assembles the engine in dependency order: collaborators, worker pools,
//! strategies, then routing. Shutdown drains the pools.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{error, info};
use pingora::{
    server::{ListenFds, ShutdownWatch},
    services::Service,
};

use super::{
    catalog::{CallPolicy, WorkRunner},
    executor::RequestExecutor,
    router::RequestRouter,
    strategy::{PooledFutureStrategy, SequentialStrategy, StructuredConcurrentStrategy},
};
use crate::{
    collaborator,
    config::Config,
    core::{container::ServiceContainer, error::RalResult, status, traits::Collaborators},
    executor::{BoundedPool, ContextPropagatingDecorator, TaskDecorator},
};

const CPU_POOL_NAME: &str = "ral-cpu";

pub struct ComponentLifecycle;

impl ComponentLifecycle {
    /// Build the engine with the default collaborators.
    pub fn initialize(config: &Config) -> RalResult<Arc<ServiceContainer>> {
        info!("Starting component initialization...");
        let collaborators = collaborator::from_config(config)?;
        Self::assemble(config, collaborators)
    }

    /// Build the engine against the given collaborators.
    pub fn assemble(
        config: &Config,
        collaborators: Collaborators,
    ) -> RalResult<Arc<ServiceContainer>> {
        let decorator: Arc<dyn TaskDecorator> = Arc::new(ContextPropagatingDecorator);
        let task_pool = BoundedPool::with_decorator(&config.executor, Some(decorator.clone()));
        let cpu_pool =
            BoundedPool::fixed(CPU_POOL_NAME, config.engine.cpu_workers(), Some(decorator));
        info!(
            "Worker pools ready: {} (core {}, max {}, queue {}), {} ({} workers)",
            task_pool.name(),
            config.executor.core_size,
            config.executor.max_size,
            config.executor.queue_capacity,
            cpu_pool.name(),
            config.engine.cpu_workers()
        );

        let runner = WorkRunner::new(collaborators, CallPolicy::from_config(&config.trend));
        let mut executor = RequestExecutor::new(config.engine.request_timeout());
        executor.register(Arc::new(SequentialStrategy::new(runner.clone())));
        executor.register(Arc::new(PooledFutureStrategy::new(
            task_pool.clone(),
            runner.clone(),
        )));
        executor.register(Arc::new(StructuredConcurrentStrategy::new(
            runner,
            cpu_pool.clone(),
        )));

        let router = RequestRouter::new()?;
        let container = ServiceContainer::new(executor, router, task_pool, cpu_pool);

        info!("Component initialization completed successfully");
        Ok(Arc::new(container))
    }

    /// Drain the worker pools, waiting at most `grace`.
    pub fn shutdown(container: &ServiceContainer, grace: Duration) -> bool {
        info!("Starting graceful shutdown...");
        container.shutdown(grace)
    }
}

/// Background service draining the worker pools on server shutdown.
pub struct PoolDrainService {
    container: Arc<ServiceContainer>,
    grace: Duration,
}

impl PoolDrainService {
    pub fn new(container: Arc<ServiceContainer>, grace: Duration) -> Self {
        Self { container, grace }
    }
}

#[async_trait]
impl Service for PoolDrainService {
    async fn start_service(&mut self, _fds: Option<ListenFds>, mut shutdown: ShutdownWatch) {
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        status::reset();
        let container = self.container.clone();
        let grace = self.grace;
        if let Err(e) =
            tokio::task::spawn_blocking(move || ComponentLifecycle::shutdown(&container, grace))
                .await
        {
            error!("Pool drain failed: {e}");
        }
    }

    fn name(&self) -> &'static str {
        "pool drain"
    }

    fn threads(&self) -> Option<usize> {
        Some(1)
    }
}
