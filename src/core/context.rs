//! Request context management
//!
//! [`RequestContext`] carries the correlation id of one logical request. It is
//! passed explicitly to every work item and can additionally be made ambient,
//! either for the current thread ([`RequestContext::install`]) or for the
//! current tokio task ([`RequestContext::scope`]), so that collaborators can
//! tag their own log lines without a context parameter.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use uuid::Uuid;

thread_local! {
    static THREAD_CONTEXT: RefCell<Option<RequestContext>> = const { RefCell::new(None) };
}

tokio::task_local! {
    static TASK_CONTEXT: RequestContext;
}

/// Context that holds per-request correlation state
#[derive(Clone, Debug)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    correlation_id: String,
    request_start: Instant,
    vars: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self::with_vars(correlation_id, BTreeMap::new())
    }

    /// Create a context with additional string baggage
    pub fn with_vars(correlation_id: impl Into<String>, vars: BTreeMap<String, String>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                correlation_id: correlation_id.into(),
                request_start: Instant::now(),
                vars,
            }),
        }
    }

    /// Create a context with a freshly generated correlation id
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn correlation_id(&self) -> &str {
        &self.inner.correlation_id
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.vars.get(key).map(String::as_str)
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.request_start.elapsed()
    }

    /// Make this context ambient on the current thread until the guard drops.
    pub fn install(&self) -> ContextGuard {
        ContextGuard::replace(Some(self.clone()))
    }

    /// Run a future with this context ambient for the current task.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        TASK_CONTEXT.scope(self, fut).await
    }
}

/// The ambient context: task scope first, then the thread slot.
pub fn current() -> Option<RequestContext> {
    TASK_CONTEXT
        .try_with(RequestContext::clone)
        .ok()
        .or_else(|| THREAD_CONTEXT.with(|slot| slot.borrow().clone()))
}

/// Correlation id of the ambient context, if any
pub fn current_correlation_id() -> Option<String> {
    current().map(|ctx| ctx.correlation_id().to_string())
}

/// Restores the previous thread-ambient context on drop.
#[must_use = "the context is uninstalled as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: Option<RequestContext>,
}

impl ContextGuard {
    /// Swap the thread-ambient context, `None` clears it.
    pub fn replace(context: Option<RequestContext>) -> Self {
        let previous = THREAD_CONTEXT.with(|slot| slot.replace(context));
        Self { previous }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        THREAD_CONTEXT.with(|slot| {
            slot.replace(previous);
        });
    }
}
