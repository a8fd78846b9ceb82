//! Request orchestration layer
//!
//! Catalog, strategies and aggregation of one request, plus the routing and
//! lifecycle glue around them.

pub mod aggregator;
pub mod catalog;
pub mod executor;
pub mod lifecycle;
pub mod router;
pub mod strategy;

#[cfg(test)]
mod tests;

pub use aggregator::{merge, Aggregator};
pub use catalog::{CallPolicy, WorkCatalog, WorkInput, WorkItem, WorkRunner};
pub use executor::RequestExecutor;
pub use lifecycle::{ComponentLifecycle, PoolDrainService};
pub use router::{RequestRouter, Route};
pub use strategy::{
    ExecutionStrategy, PooledFutureStrategy, SequentialStrategy, StrategyKind,
    StructuredConcurrentStrategy,
};
