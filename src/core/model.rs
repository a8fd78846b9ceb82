//! Request, work item and response types shared by every execution strategy.

use std::{collections::BTreeSet, fmt, time::Duration};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize, Serializer};

use super::error::RalResult;

/// Number of entity families fanned out per request.
pub const FAMILY_COUNT: usize = 4;

pub type EntityId = i64;

/// The four kinds of work one request fans out into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkKind {
    Lookup,
    Cache,
    Compute,
    Trend,
}

impl WorkKind {
    /// Catalog order.
    pub const ALL: [WorkKind; 4] = [
        WorkKind::Lookup,
        WorkKind::Cache,
        WorkKind::Compute,
        WorkKind::Trend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkKind::Lookup => "lookup",
            WorkKind::Cache => "cache",
            WorkKind::Compute => "compute",
            WorkKind::Trend => "trend",
        }
    }

    /// CPU-shaped work is kept off the I/O scheduler.
    pub fn is_cpu_bound(&self) -> bool {
        matches!(self, WorkKind::Compute)
    }
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity family, always in `1..=4`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Family(u8);

impl Family {
    pub const ALL: [Family; FAMILY_COUNT] = [Family(1), Family(2), Family(3), Family(4)];

    pub fn new(value: u8) -> Option<Self> {
        (1..=FAMILY_COUNT as u8).contains(&value).then_some(Family(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based slot in the aggregate response.
    pub fn index(self) -> usize {
        usize::from(self.0) - 1
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a work item within one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId {
    pub kind: WorkKind,
    pub family: Family,
}

impl WorkId {
    pub fn new(kind: WorkKind, family: Family) -> Self {
        Self { kind, family }
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.family)
    }
}

/// One logical request: an id set per entity family.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    ids: [BTreeSet<EntityId>; FAMILY_COUNT],
}

impl Request {
    pub fn new(ids: [BTreeSet<EntityId>; FAMILY_COUNT]) -> Self {
        Self { ids }
    }

    /// Replace the id set of one family. Duplicates collapse.
    pub fn with_ids<I>(mut self, family: Family, ids: I) -> Self
    where
        I: IntoIterator<Item = EntityId>,
    {
        self.ids[family.index()] = ids.into_iter().collect();
        self
    }

    pub fn ids(&self, family: Family) -> &BTreeSet<EntityId> {
        &self.ids[family.index()]
    }
}

/// A persisted entity as returned by a lookup collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: EntityId,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: DateTime<FixedOffset>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub modified_at: DateTime<FixedOffset>,
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

fn serialize_timestamp<S>(value: &DateTime<FixedOffset>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
}

/// Real-time trend snapshot returned by the external trend endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSnapshot {
    #[serde(default)]
    pub featured_story_ids: Vec<String>,
    #[serde(default)]
    pub trending_story_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_summaries: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Successful payload of a single work item.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkValue {
    Entities(Vec<Entity>),
    Cached(Option<String>),
    Computed(String),
    Trend(Option<TrendSnapshot>),
}

/// Outcome of one work item, produced exactly once per item.
#[derive(Debug)]
pub struct WorkResult {
    pub id: WorkId,
    pub outcome: RalResult<WorkValue>,
    pub duration: Duration,
}

impl WorkResult {
    pub fn failed(id: WorkId, err: super::error::RalError) -> Self {
        Self {
            id,
            outcome: Err(err),
            duration: Duration::ZERO,
        }
    }
}

/// The merged response; every field holds exactly one slot per family.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AggregateResponse {
    pub cache: [Option<String>; FAMILY_COUNT],
    pub entities: [Vec<Entity>; FAMILY_COUNT],
    pub computed: [String; FAMILY_COUNT],
    pub trends: [Option<TrendSnapshot>; FAMILY_COUNT],
}
