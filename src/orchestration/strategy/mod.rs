//! Interchangeable execution strategies
//!
//! Every strategy runs the same sixteen work items of a request and hands the
//! results to the same aggregator. They only differ in how the items are
//! scheduled.

mod pooled;
mod sequential;
mod structured;

use std::fmt;

use async_trait::async_trait;

use crate::core::{
    context::RequestContext,
    error::RalResult,
    model::{AggregateResponse, Request},
};

pub use pooled::PooledFutureStrategy;
pub use sequential::SequentialStrategy;
pub use structured::StructuredConcurrentStrategy;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StrategyKind {
    Sequential,
    PooledFuture,
    StructuredConcurrent,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Sequential,
        StrategyKind::PooledFuture,
        StrategyKind::StructuredConcurrent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Sequential => "sequential",
            StrategyKind::PooledFuture => "pooled_future",
            StrategyKind::StructuredConcurrent => "structured_concurrent",
        }
    }

    /// API version segment serving this strategy
    pub fn version(&self) -> &'static str {
        match self {
            StrategyKind::Sequential => "v1",
            StrategyKind::PooledFuture => "v2",
            StrategyKind::StructuredConcurrent => "v3",
        }
    }

    pub fn from_version(version: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.version() == version)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns one request into one aggregate response.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn execute(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> RalResult<AggregateResponse>;
}
