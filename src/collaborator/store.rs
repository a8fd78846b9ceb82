//! In-memory entity storage, one table per family.

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local};
use dashmap::DashMap;
use log::{debug, warn};

use crate::{
    config::{EntityFixture, Fixtures},
    core::{
        context,
        error::RalResult,
        model::{Entity, EntityId, Family, FAMILY_COUNT},
        traits::EntityLookup,
    },
};

pub struct InMemoryEntityStore {
    family: Family,
    rows: DashMap<EntityId, Entity>,
}

impl InMemoryEntityStore {
    pub fn new(family: Family) -> Self {
        Self {
            family,
            rows: DashMap::new(),
        }
    }

    /// One store per family, populated from the fixture list.
    pub fn seeded(fixtures: &Fixtures) -> [Arc<InMemoryEntityStore>; FAMILY_COUNT] {
        let stores = Family::ALL.map(|family| Arc::new(InMemoryEntityStore::new(family)));
        let loaded_at = Local::now().fixed_offset();

        for fixture in &fixtures.entities {
            match Family::new(fixture.family) {
                Some(family) => stores[family.index()].insert(entity_from(fixture, loaded_at)),
                None => warn!(
                    "Skipping fixture entity {} with unknown family {}",
                    fixture.id, fixture.family
                ),
            }
        }

        for store in &stores {
            debug!("Family {} store seeded with {} entities", store.family, store.len());
        }
        stores
    }

    pub fn insert(&self, entity: Entity) {
        self.rows.insert(entity.id, entity);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn entity_from(fixture: &EntityFixture, loaded_at: DateTime<FixedOffset>) -> Entity {
    let created_at = fixture.created_at.unwrap_or(loaded_at);
    Entity {
        id: fixture.id,
        title: fixture.title.clone(),
        description: fixture.description.clone(),
        created_at,
        modified_at: fixture.modified_at.unwrap_or(created_at),
    }
}

#[async_trait]
impl EntityLookup for InMemoryEntityStore {
    async fn find_all_by_id(&self, ids: &BTreeSet<EntityId>) -> RalResult<Vec<Entity>> {
        let found: Vec<Entity> = ids
            .iter()
            .filter_map(|id| self.rows.get(id).map(|row| row.value().clone()))
            .collect();

        if let Some(correlation_id) = context::current_correlation_id() {
            debug!(
                correlation_id = correlation_id.as_str();
                "Family {} lookup matched {} of {} ids", self.family, found.len(), ids.len()
            );
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(family: u8, id: i64) -> EntityFixture {
        EntityFixture {
            family,
            id,
            title: Some(format!("title-{id}")),
            description: None,
            created_at: None,
            modified_at: None,
        }
    }

    #[tokio::test]
    async fn test_lookup_skips_unknown_ids() {
        let fixtures = Fixtures {
            entities: vec![fixture(1, 2), fixture(1, 1), fixture(3, 5)],
            ..Fixtures::default()
        };
        let stores = InMemoryEntityStore::seeded(&fixtures);
        assert_eq!(2, stores[0].len());
        assert!(stores[1].is_empty());

        let ids = BTreeSet::from([2, 1, 9]);
        let found = stores[0].find_all_by_id(&ids).await.unwrap();
        let found_ids: Vec<_> = found.iter().map(|e| e.id).collect();
        assert_eq!(vec![1, 2], found_ids);
        assert_eq!(found[0].created_at, found[0].modified_at);
    }

    #[tokio::test]
    async fn test_empty_id_set() {
        let store = InMemoryEntityStore::new(Family::ALL[0]);
        assert!(store.find_all_by_id(&BTreeSet::new()).await.unwrap().is_empty());
    }
}
