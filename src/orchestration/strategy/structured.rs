use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use tokio::task::{Id, JoinSet};

use super::{ExecutionStrategy, StrategyKind};
use crate::{
    core::{
        context::RequestContext,
        error::{RalError, RalResult},
        model::{AggregateResponse, Request, WorkId, WorkResult},
    },
    executor::BoundedPool,
    orchestration::{
        aggregator::Aggregator,
        catalog::{WorkCatalog, WorkRunner},
    },
};

/// Runs every item as a child of one scope tied to the request.
///
/// I/O items are tokio tasks; CPU items go to a dedicated fixed pool and are
/// awaited from a child task. The first failing child cancels all siblings,
/// the scope then waits for them before returning that failure. Dropping the
/// call cancels every child as well.
///
/// Each aborted sibling is reported as `Cancelled`; the aggregator keeps the
/// root cause over those.
pub struct StructuredConcurrentStrategy {
    runner: WorkRunner,
    cpu_pool: BoundedPool,
}

impl StructuredConcurrentStrategy {
    pub fn new(runner: WorkRunner, cpu_pool: BoundedPool) -> Self {
        Self { runner, cpu_pool }
    }

    fn spawn_all(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> (JoinSet<WorkResult>, HashMap<Id, WorkId>) {
        let mut children = JoinSet::new();
        let mut items = HashMap::new();
        for item in WorkCatalog::expand(request) {
            let runner = self.runner.clone();
            let child_ctx = ctx.clone();
            let id = item.id;

            let abort = if id.kind.is_cpu_bound() {
                let submitted = {
                    let _ambient = ctx.install();
                    self.cpu_pool
                        .submit(move || runner.run_blocking(item, &child_ctx))
                };
                // a compute already running finishes on its worker, only the
                // wait for it is cancelled
                children.spawn(async move {
                    match submitted {
                        Ok(handle) => handle
                            .await
                            .unwrap_or_else(|err| WorkResult::failed(id, err)),
                        Err(err) => WorkResult::failed(id, err),
                    }
                })
            } else {
                children.spawn(
                    child_ctx
                        .clone()
                        .scope(async move { runner.run(item, &child_ctx).await }),
                )
            };
            items.insert(abort.id(), id);
        }
        (children, items)
    }
}

#[async_trait]
impl ExecutionStrategy for StructuredConcurrentStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::StructuredConcurrent
    }

    async fn execute(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> RalResult<AggregateResponse> {
        let (mut children, items) = self.spawn_all(request, ctx);
        let mut aggregator = Aggregator::new();
        let mut cancelled = 0usize;

        while let Some(joined) = children.join_next_with_id().await {
            let result = match joined {
                Ok((_, result)) => result,
                Err(join_err) => {
                    let Some(&id) = items.get(&join_err.id()) else {
                        aggregator.fail(RalError::Internal(format!(
                            "unknown child task ended: {join_err}"
                        )));
                        continue;
                    };
                    if join_err.is_cancelled() {
                        cancelled += 1;
                        WorkResult::failed(
                            id,
                            RalError::Cancelled(format!("{id} aborted after a sibling failed")),
                        )
                    } else {
                        WorkResult::failed(
                            id,
                            RalError::Internal(format!("{id} panicked: {join_err}")),
                        )
                    }
                }
            };

            let failure = match result.outcome {
                Ok(value) => {
                    aggregator.insert(result.id, value);
                    continue;
                }
                Err(err) => err,
            };

            if !aggregator.has_failed() {
                debug!(
                    correlation_id = ctx.correlation_id();
                    "Cancelling {} siblings after: {failure}", children.len()
                );
                children.abort_all();
            }
            aggregator.fail(failure);
        }

        if cancelled > 0 {
            debug!(
                correlation_id = ctx.correlation_id();
                "{cancelled} children wound down after cancellation"
            );
        }
        aggregator.finish()
    }
}
