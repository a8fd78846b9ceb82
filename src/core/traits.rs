//! Collaborator ports
//!
//! The engine only talks to storage, cache, computation and the trend
//! endpoint through these interfaces.

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;

use super::{
    error::RalResult,
    model::{Entity, EntityId, Family, TrendSnapshot, FAMILY_COUNT},
};

/// Lookup of persisted entities of one family by id set
#[async_trait]
pub trait EntityLookup: Send + Sync {
    /// Entities for the ids that exist, ordered by id. Unknown ids are skipped.
    async fn find_all_by_id(&self, ids: &BTreeSet<EntityId>) -> RalResult<Vec<Entity>>;
}

/// Key-value cache read
#[async_trait]
pub trait CacheGet: Send + Sync {
    async fn get(&self, key: &str) -> RalResult<Option<String>>;
}

/// CPU-bound computation. Runs synchronously on whichever thread the
/// strategy picks for CPU work.
pub trait Compute: Send + Sync {
    fn execute(&self) -> RalResult<String>;
}

/// External trend endpoint
#[async_trait]
pub trait TrendFetch: Send + Sync {
    /// `Ok(None)` when the endpoint answered with nothing decodable.
    async fn fetch_trend(&self) -> RalResult<Option<TrendSnapshot>>;
}

/// Set of collaborators one request is executed against
#[derive(Clone)]
pub struct Collaborators {
    lookups: [Arc<dyn EntityLookup>; FAMILY_COUNT],
    cache: Arc<dyn CacheGet>,
    compute: Arc<dyn Compute>,
    trend: Arc<dyn TrendFetch>,
}

impl Collaborators {
    pub fn new(
        lookups: [Arc<dyn EntityLookup>; FAMILY_COUNT],
        cache: Arc<dyn CacheGet>,
        compute: Arc<dyn Compute>,
        trend: Arc<dyn TrendFetch>,
    ) -> Self {
        Self {
            lookups,
            cache,
            compute,
            trend,
        }
    }

    pub fn lookup(&self, family: Family) -> &Arc<dyn EntityLookup> {
        &self.lookups[family.index()]
    }

    pub fn cache(&self) -> &Arc<dyn CacheGet> {
        &self.cache
    }

    pub fn compute(&self) -> &Arc<dyn Compute> {
        &self.compute
    }

    pub fn trend(&self) -> &Arc<dyn TrendFetch> {
        &self.trend
    }
}
