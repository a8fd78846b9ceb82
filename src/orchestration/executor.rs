//! Request execution orchestration
//!
//! Dispatches a request to the selected strategy under the request deadline
//! and records the outcome.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use log::{info, warn};
use tokio::time::timeout;

use super::strategy::{ExecutionStrategy, StrategyKind};
use crate::{
    core::{
        context::RequestContext,
        error::{RalError, RalResult},
        model::{AggregateResponse, Request},
    },
    internal_error, metrics,
};

pub struct RequestExecutor {
    strategies: HashMap<StrategyKind, Arc<dyn ExecutionStrategy>>,
    request_timeout: Duration,
}

impl RequestExecutor {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            strategies: HashMap::new(),
            request_timeout,
        }
    }

    /// Register a strategy, replacing any previous one of the same kind.
    pub fn register(&mut self, strategy: Arc<dyn ExecutionStrategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    pub fn strategy(&self, kind: StrategyKind) -> Option<&Arc<dyn ExecutionStrategy>> {
        self.strategies.get(&kind)
    }

    /// Execute `request` with the strategy of `kind`.
    ///
    /// The context is ambient for the whole call, so work and collaborators
    /// can find it without a parameter.
    pub async fn execute(
        &self,
        kind: StrategyKind,
        request: &Request,
        ctx: &RequestContext,
    ) -> RalResult<AggregateResponse> {
        let strategy = self
            .strategy(kind)
            .ok_or_else(|| internal_error!("no strategy registered for {}", kind))?;

        let started = Instant::now();
        let result = match timeout(
            self.request_timeout,
            ctx.clone().scope(strategy.execute(request, ctx)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RalError::Timeout(format!(
                "{kind} request exceeded {:?}",
                self.request_timeout
            ))),
        };
        let elapsed = started.elapsed();

        match &result {
            Ok(_) => {
                metrics::observe_request(kind.as_str(), "ok", elapsed);
                info!(correlation_id = ctx.correlation_id(); "{kind} request served in {elapsed:?}");
            }
            Err(err) => {
                metrics::observe_request(kind.as_str(), err.kind(), elapsed);
                warn!(correlation_id = ctx.correlation_id(); "{kind} request failed after {elapsed:?}: {err}");
            }
        }
        result
    }
}
