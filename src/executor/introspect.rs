//! Read-only view of live pool workers.
//!
//! Every worker registers itself on start and removes itself on exit, so a
//! snapshot lists exactly the workers alive at call time.

use std::collections::BTreeMap;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::Serialize;

static WORKERS: Lazy<DashMap<String, WorkerInfo>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Running,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    pub pool: String,
    pub state: WorkerState,
    pub completed: u64,
}

pub(crate) fn register(name: &str, pool: &str) {
    WORKERS.insert(
        name.to_string(),
        WorkerInfo {
            pool: pool.to_string(),
            state: WorkerState::Running,
            completed: 0,
        },
    );
}

pub(crate) fn set_state(name: &str, state: WorkerState) {
    if let Some(mut info) = WORKERS.get_mut(name) {
        info.state = state;
    }
}

pub(crate) fn record_completed(name: &str) {
    if let Some(mut info) = WORKERS.get_mut(name) {
        info.completed += 1;
    }
}

pub(crate) fn unregister(name: &str) {
    WORKERS.remove(name);
}

/// Snapshot of live workers keyed by worker name, optionally narrowed to
/// names starting with `prefix`. An empty prefix matches everything.
pub fn list_workers(prefix: Option<&str>) -> BTreeMap<String, WorkerInfo> {
    WORKERS
        .iter()
        .filter(|entry| prefix.map_or(true, |p| entry.key().starts_with(p)))
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect()
}
