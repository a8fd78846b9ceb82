//! Concurrent request aggregation engine.
//!
//! One request fans out into sixteen independent calls against storage, cache,
//! computation and an external trend endpoint. Three interchangeable strategies
//! schedule those calls and a shared aggregator merges the results.

pub mod collaborator;
pub mod config;
pub mod core;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod orchestration;
pub mod service;
pub(crate) mod utils;
