use std::future::Future;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};
use tokio::runtime::{Handle, RuntimeFlavor};

use super::{ExecutionStrategy, StrategyKind};
use crate::{
    core::{
        context::RequestContext,
        error::{RalError, RalResult},
        model::{AggregateResponse, Request, WorkId, WorkResult},
    },
    executor::BoundedPool,
    orchestration::{
        aggregator::merge,
        catalog::{WorkCatalog, WorkRunner},
    },
};

/// Submits every item to the shared worker pool, then waits for all handles
/// before merging.
///
/// A task the pool refuses resolves to `PoolSaturated` on its own handle; the
/// barrier still waits for every other task.
pub struct PooledFutureStrategy {
    pool: BoundedPool,
    runner: WorkRunner,
}

impl PooledFutureStrategy {
    pub fn new(pool: BoundedPool, runner: WorkRunner) -> Self {
        Self { pool, runner }
    }
}

#[async_trait]
impl ExecutionStrategy for PooledFutureStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PooledFuture
    }

    async fn execute(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> RalResult<AggregateResponse> {
        let runtime = Handle::current();

        let submitted: Vec<_> = {
            // the pool decorator captures the submitter's ambient context
            let _ambient = ctx.install();
            WorkCatalog::expand(request)
                .into_iter()
                .map(|item| {
                    let id = item.id;
                    let runner = self.runner.clone();
                    let ctx = ctx.clone();
                    let runtime = runtime.clone();
                    let pool = self.pool.name().to_string();
                    let handle = self
                        .pool
                        .submit(move || drive(&runtime, &pool, id, runner.run(item, &ctx)));
                    (id, handle)
                })
                .collect()
        };

        let results = join_all(submitted.into_iter().map(|(id, handle)| async move {
            match handle {
                Ok(handle) => handle
                    .await
                    .unwrap_or_else(|err| WorkResult::failed(id, err)),
                Err(err) => WorkResult::failed(id, err),
            }
        }))
        .await;

        debug!(
            correlation_id = ctx.correlation_id();
            "All pooled tasks joined, pool stats {:?}", self.pool.stats()
        );
        merge(results)
    }
}

/// Drive an item future to completion from the thread running the task.
///
/// Under `CallerRuns` a rejected task lands on the submitting runtime thread.
/// A multi-threaded runtime lets that thread block, a current-thread runtime
/// cannot, so the item is refused there.
fn drive<F>(runtime: &Handle, pool: &str, id: WorkId, fut: F) -> WorkResult
where
    F: Future<Output = WorkResult>,
{
    match Handle::try_current() {
        Ok(current) => match current.runtime_flavor() {
            RuntimeFlavor::CurrentThread => {
                warn!("Pool {pool} saturated on a current-thread runtime, refusing {id}");
                WorkResult::failed(id, RalError::PoolSaturated(pool.to_string()))
            }
            _ => tokio::task::block_in_place(|| runtime.block_on(fut)),
        },
        Err(_) => runtime.block_on(fut),
    }
}
