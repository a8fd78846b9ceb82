//! Merges work results into one [`AggregateResponse`].
//!
//! Results are placed by `(kind, family)`, so arrival order never matters.
//! Slots nobody filled keep their empty value.

use crate::core::{
    error::{RalError, RalResult},
    model::{AggregateResponse, WorkId, WorkResult, WorkValue},
};

#[derive(Debug, Default)]
pub struct Aggregator {
    response: AggregateResponse,
    failure: Option<RalError>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, result: WorkResult) {
        match result.outcome {
            Ok(value) => self.insert(result.id, value),
            Err(err) => self.fail(err),
        }
    }

    pub fn insert(&mut self, id: WorkId, value: WorkValue) {
        let slot = id.family.index();
        match value {
            WorkValue::Entities(entities) => self.response.entities[slot] = entities,
            WorkValue::Cached(cached) => self.response.cache[slot] = cached,
            WorkValue::Computed(computed) => self.response.computed[slot] = computed,
            WorkValue::Trend(trend) => self.response.trends[slot] = trend,
        }
    }

    /// Record a failure. The first root cause wins over cancellations.
    pub fn fail(&mut self, err: RalError) {
        let replace = match &self.failure {
            None => true,
            Some(current) => current.is_secondary() && !err.is_secondary(),
        };
        if replace {
            self.failure = Some(err);
        }
    }

    pub fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn finish(self) -> RalResult<AggregateResponse> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.response),
        }
    }
}

/// Merge a complete set of results.
pub fn merge<I>(results: I) -> RalResult<AggregateResponse>
where
    I: IntoIterator<Item = WorkResult>,
{
    let mut aggregator = Aggregator::new();
    for result in results {
        aggregator.accept(result);
    }
    aggregator.finish()
}
