use async_trait::async_trait;

use super::{ExecutionStrategy, StrategyKind};
use crate::{
    core::{
        context::RequestContext,
        error::RalResult,
        model::{AggregateResponse, Request},
    },
    orchestration::{
        aggregator::Aggregator,
        catalog::{WorkCatalog, WorkRunner},
    },
};

/// Runs every item on the calling task in catalog order and stops at the
/// first failure.
pub struct SequentialStrategy {
    runner: WorkRunner,
}

impl SequentialStrategy {
    pub fn new(runner: WorkRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ExecutionStrategy for SequentialStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    async fn execute(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> RalResult<AggregateResponse> {
        let mut aggregator = Aggregator::new();
        for item in WorkCatalog::expand(request) {
            let result = self.runner.run(item, ctx).await;
            match result.outcome {
                Ok(value) => aggregator.insert(result.id, value),
                Err(err) => return Err(err),
            }
        }
        aggregator.finish()
    }
}
