//! Work catalog
//!
//! Expands one [`Request`] into its sixteen work items and runs a single item
//! against the matching collaborator.

use std::{
    collections::BTreeSet,
    time::{Duration, Instant},
};

use log::{debug, warn};
use tokio::time::timeout;

use crate::{
    config::Trend,
    core::{
        context::RequestContext,
        error::{RalError, RalResult},
        model::{EntityId, Family, Request, TrendSnapshot, WorkId, WorkKind, WorkResult, WorkValue},
        traits::Collaborators,
    },
    metrics,
};

/// Input of one work item. The variant decides the collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkInput {
    Lookup(BTreeSet<EntityId>),
    Cache(String),
    Compute,
    Trend,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    pub id: WorkId,
    pub input: WorkInput,
}

pub struct WorkCatalog;

impl WorkCatalog {
    /// All items of a request in catalog order: every lookup, then every
    /// cache read, every compute and every trend call, families ascending.
    pub fn expand(request: &Request) -> Vec<WorkItem> {
        WorkKind::ALL
            .iter()
            .flat_map(|&kind| {
                Family::ALL.iter().map(move |&family| WorkItem {
                    id: WorkId::new(kind, family),
                    input: match kind {
                        WorkKind::Lookup => WorkInput::Lookup(request.ids(family).clone()),
                        WorkKind::Cache => WorkInput::Cache(cache_key(family, request.ids(family))),
                        WorkKind::Compute => WorkInput::Compute,
                        WorkKind::Trend => WorkInput::Trend,
                    },
                })
            })
            .collect()
    }
}

/// Cache key of one family, e.g. `test1:key:[1, 2]`.
pub fn cache_key(family: Family, ids: &BTreeSet<EntityId>) -> String {
    let rendered = ids
        .iter()
        .map(EntityId::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("test{family}:key:[{rendered}]")
}

/// Per-call limits applied to collaborator calls
#[derive(Clone, Debug)]
pub struct CallPolicy {
    pub trend_timeout: Duration,
    pub trend_retries: u32,
}

impl CallPolicy {
    pub fn from_config(trend: &Trend) -> Self {
        Self {
            trend_timeout: trend.timeout(),
            trend_retries: trend.retries,
        }
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::from_config(&Trend::default())
    }
}

/// Runs work items against the collaborators. Cheap to clone.
#[derive(Clone)]
pub struct WorkRunner {
    collaborators: Collaborators,
    policy: CallPolicy,
}

impl WorkRunner {
    pub fn new(collaborators: Collaborators, policy: CallPolicy) -> Self {
        Self {
            collaborators,
            policy,
        }
    }

    /// Run one item to its result. Errors are attributed to the item.
    pub async fn run(&self, item: WorkItem, ctx: &RequestContext) -> WorkResult {
        let started = Instant::now();
        let outcome = match item.input {
            WorkInput::Lookup(ids) => self
                .collaborators
                .lookup(item.id.family)
                .find_all_by_id(&ids)
                .await
                .map(WorkValue::Entities),
            WorkInput::Cache(key) => self
                .collaborators
                .cache()
                .get(&key)
                .await
                .map(WorkValue::Cached),
            WorkInput::Compute => self.compute(),
            WorkInput::Trend => self.fetch_trend(item.id, ctx).await.map(WorkValue::Trend),
        };
        self.finish(item.id, outcome, started, ctx)
    }

    /// Synchronous path for CPU-bound items. Other kinds need the async
    /// scheduler and are refused here.
    pub fn run_blocking(&self, item: WorkItem, ctx: &RequestContext) -> WorkResult {
        let started = Instant::now();
        let outcome = match item.input {
            WorkInput::Compute => self.compute(),
            _ => Err(RalError::Internal(format!(
                "{} cannot run on the CPU scheduler",
                item.id
            ))),
        };
        self.finish(item.id, outcome, started, ctx)
    }

    fn compute(&self) -> RalResult<WorkValue> {
        self.collaborators
            .compute()
            .execute()
            .map(WorkValue::Computed)
    }

    async fn fetch_trend(
        &self,
        id: WorkId,
        ctx: &RequestContext,
    ) -> RalResult<Option<TrendSnapshot>> {
        let mut attempt = 0;
        loop {
            let result =
                match timeout(self.policy.trend_timeout, self.collaborators.trend().fetch_trend())
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(RalError::Collaborator {
                        item: id,
                        reason: format!("no answer within {:?}", self.policy.trend_timeout),
                    }),
                };

            match result {
                Err(err) if attempt < self.policy.trend_retries => {
                    attempt += 1;
                    warn!(
                        correlation_id = ctx.correlation_id();
                        "{id} attempt {attempt} failed, retrying: {err}"
                    );
                }
                other => return other,
            }
        }
    }

    fn finish(
        &self,
        id: WorkId,
        outcome: RalResult<WorkValue>,
        started: Instant,
        ctx: &RequestContext,
    ) -> WorkResult {
        let duration = started.elapsed();
        let outcome = outcome.map_err(|err| err.for_item(id));

        match &outcome {
            Ok(_) => {
                metrics::observe_work_item(id.kind.as_str(), "ok", duration);
                debug!(correlation_id = ctx.correlation_id(); "{id} completed in {duration:?}");
            }
            Err(err) => {
                metrics::observe_work_item(id.kind.as_str(), err.kind(), duration);
                warn!(correlation_id = ctx.correlation_id(); "{id} failed after {duration:?}: {err}");
            }
        }

        WorkResult {
            id,
            outcome,
            duration,
        }
    }
}
