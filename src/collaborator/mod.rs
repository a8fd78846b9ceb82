//! Concrete collaborators the service runs against out of the box.

pub mod cache;
pub mod math;
pub mod store;
pub mod trend;

use std::sync::Arc;

use crate::{
    config::Config,
    core::{
        error::RalResult,
        traits::{Collaborators, EntityLookup},
    },
};

pub use cache::InMemoryCache;
pub use math::MathEngine;
pub use store::InMemoryEntityStore;
pub use trend::HttpTrendClient;

/// Assemble the default collaborator set from configuration.
pub fn from_config(config: &Config) -> RalResult<Collaborators> {
    let lookups = InMemoryEntityStore::seeded(&config.fixtures)
        .map(|store| store as Arc<dyn EntityLookup>);
    let cache = Arc::new(InMemoryCache::from_entries(config.fixtures.cache.clone()));
    let compute = Arc::new(MathEngine::new(config.compute.samples, config.compute.seed));
    let trend = Arc::new(HttpTrendClient::new(&config.trend)?);

    Ok(Collaborators::new(lookups, cache, compute, trend))
}
