use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::core::{error::RalResult, traits::CacheGet};

/// Key-value cache backed by a concurrent map.
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, String>,
}

impl InMemoryCache {
    pub fn from_entries(entries: HashMap<String, String>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }
}

#[async_trait]
impl CacheGet for InMemoryCache {
    async fn get(&self, key: &str) -> RalResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_and_put() {
        let cache = InMemoryCache::from_entries(HashMap::from([(
            "test1:key:[1, 2]".to_string(),
            "cached".to_string(),
        )]));
        assert_eq!(
            Some("cached".to_string()),
            cache.get("test1:key:[1, 2]").await.unwrap()
        );
        assert_eq!(None, cache.get("test2:key:[]").await.unwrap());

        cache.put("test2:key:[]", "empty");
        assert_eq!(Some("empty".to_string()), cache.get("test2:key:[]").await.unwrap());
    }
}
