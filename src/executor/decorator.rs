//! Task decoration at submission time

use crate::core::context::{self, ContextGuard};

use super::pool::Job;

/// Wraps every job a pool accepts. `decorate` runs on the submitting thread,
/// the returned job runs on a worker.
pub trait TaskDecorator: Send + Sync {
    fn decorate(&self, job: Job) -> Job;
}

/// Carries the submitter's ambient [`RequestContext`](crate::core::context::RequestContext)
/// into the worker for the duration of the job.
///
/// A job submitted without a context runs with none, so nothing left behind
/// by an earlier job on the same worker is observable.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContextPropagatingDecorator;

impl TaskDecorator for ContextPropagatingDecorator {
    fn decorate(&self, job: Job) -> Job {
        let captured = context::current();
        Box::new(move || {
            let _guard = ContextGuard::replace(captured);
            job()
        })
    }
}
