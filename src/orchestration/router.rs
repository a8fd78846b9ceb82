//! Request routing
//!
//! Maps request paths onto aggregate strategies or the worker listing.

use matchit::{Match, Router as MatchRouter};

use super::strategy::StrategyKind;
use crate::{config_error, core::error::RalResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Aggregate(StrategyKind),
    Threads,
}

#[derive(Clone, Copy, Debug)]
enum Target {
    Versioned,
    Threads,
}

const ROUTES: &[(&str, Target)] = &[
    ("/{version}/test", Target::Versioned),
    ("/api/ral/{version}/test", Target::Versioned),
    ("/threads", Target::Threads),
];

pub struct RequestRouter {
    matcher: MatchRouter<Target>,
}

impl RequestRouter {
    pub fn new() -> RalResult<Self> {
        let mut matcher = MatchRouter::new();
        for (path, target) in ROUTES {
            matcher
                .insert(*path, *target)
                .map_err(|e| config_error!("failed to insert route {}: {}", path, e))?;
        }
        Ok(Self { matcher })
    }

    pub fn match_path(&self, path: &str) -> Option<Route> {
        let Match { value, params } = self.matcher.at(path).ok()?;
        match value {
            Target::Threads => Some(Route::Threads),
            Target::Versioned => params
                .get("version")
                .and_then(StrategyKind::from_version)
                .map(Route::Aggregate),
        }
    }
}
