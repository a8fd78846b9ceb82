//! Bounded worker pool
//!
//! A thread pool with a core size, a growable maximum and a bounded admission
//! queue. Admission follows the classic order: start a core worker, else
//! queue, else grow up to the maximum, else apply the rejection policy.
//! Rejection is always observable, a rejected task never leaves its handle
//! waiting forever.

use std::{
    collections::VecDeque,
    future::Future,
    panic::{catch_unwind, AssertUnwindSafe},
    pin::Pin,
    sync::{
        atomic::{AtomicU8, AtomicUsize, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    task::{Context, Poll},
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::{debug, error, warn};
use serde::Serialize;
use tokio::sync::oneshot;

use super::{
    decorator::TaskDecorator,
    introspect::{self, WorkerState},
};
use crate::{
    config::{PoolConfig, RejectionPolicy},
    core::error::{RalError, RalResult},
    metrics,
};

/// A unit of work as the pool stores it
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle of one submitted task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Submitted = 0,
    Queued = 1,
    Running = 2,
    Completed = 3,
    Rejected = 4,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TaskState::Queued,
            2 => TaskState::Running,
            3 => TaskState::Completed,
            4 => TaskState::Rejected,
            _ => TaskState::Submitted,
        }
    }
}

#[derive(Clone)]
struct TaskTracker(Arc<AtomicU8>);

impl TaskTracker {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(TaskState::Submitted as u8)))
    }

    fn set(&self, state: TaskState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn get(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Handle to the result of a submitted task.
///
/// Await it from async code or [`TaskHandle::join`] it from a plain thread.
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<T>,
    tracker: TaskTracker,
    pool: String,
}

impl<T> TaskHandle<T> {
    pub fn state(&self) -> TaskState {
        self.tracker.get()
    }

    /// Block the current thread until the task resolves.
    ///
    /// Must not be called from within an async runtime.
    pub fn join(self) -> RalResult<T> {
        let TaskHandle {
            receiver,
            tracker,
            pool,
        } = self;
        receiver
            .blocking_recv()
            .map_err(|_| lost_result(&tracker, &pool))
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = RalResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(Ok(value)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(lost_result(&this.tracker, &this.pool))),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn lost_result(tracker: &TaskTracker, pool: &str) -> RalError {
    match tracker.get() {
        TaskState::Rejected => RalError::PoolSaturated(pool.to_string()),
        state => RalError::Internal(format!(
            "task on pool {pool} ended without a result in state {state:?}"
        )),
    }
}

/// Point-in-time pool occupancy
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub workers: usize,
    pub idle: usize,
    pub queued: usize,
    pub core_size: usize,
    pub max_size: usize,
    pub queue_capacity: usize,
}

/// Process-wide bounded worker pool. Clones share the same workers.
#[derive(Clone)]
pub struct BoundedPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: PoolConfig,
    epoch: u64,
    next_worker: AtomicUsize,
    decorator: Option<Arc<dyn TaskDecorator>>,
    state: Mutex<PoolState>,
    work_available: Condvar,
    terminated: Condvar,
}

#[derive(Default)]
struct PoolState {
    queue: VecDeque<Job>,
    workers: usize,
    idle: usize,
    shutdown: bool,
}

impl BoundedPool {
    pub fn new(config: &PoolConfig) -> Self {
        Self::with_decorator(config, None)
    }

    /// Create a pool whose tasks are wrapped by `decorator` at submission.
    pub fn with_decorator(config: &PoolConfig, decorator: Option<Arc<dyn TaskDecorator>>) -> Self {
        let mut config = config.clone();
        config.core_size = config.core_size.max(1);
        config.max_size = config.max_size.max(config.core_size);

        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self {
            inner: Arc::new(PoolInner {
                config,
                epoch,
                next_worker: AtomicUsize::new(0),
                decorator,
                state: Mutex::new(PoolState::default()),
                work_available: Condvar::new(),
                terminated: Condvar::new(),
            }),
        }
    }

    /// Pool with `size` workers and an unbounded queue.
    pub fn fixed(
        name: &str,
        size: usize,
        decorator: Option<Arc<dyn TaskDecorator>>,
    ) -> Self {
        Self::with_decorator(&PoolConfig::fixed(name, size), decorator)
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Common prefix of every worker name of this pool instance.
    pub fn worker_prefix(&self) -> String {
        format!("{}-{}-", self.inner.config.name, self.inner.epoch)
    }

    /// Submit a task. See the module docs for the admission order.
    pub fn submit<F, T>(&self, task: F) -> RalResult<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let tracker = TaskTracker::new();
        let job_tracker = tracker.clone();
        let job: Job = Box::new(move || {
            job_tracker.set(TaskState::Running);
            let output = task();
            job_tracker.set(TaskState::Completed);
            // the caller may have stopped waiting
            let _ = sender.send(output);
        });
        let job = match &self.inner.decorator {
            Some(decorator) => decorator.decorate(job),
            None => job,
        };

        let name = &self.inner.config.name;
        let handle = TaskHandle {
            receiver,
            tracker: tracker.clone(),
            pool: name.clone(),
        };
        metrics::record_submitted(name);

        let rejected = match self.inner.admit(job, &tracker) {
            Ok(()) => return Ok(handle),
            Err(job) => job,
        };

        let policy = self.inner.config.rejection_policy;
        metrics::record_rejected(name, policy_label(policy));
        match policy {
            RejectionPolicy::Abort => {
                tracker.set(TaskState::Rejected);
                drop(rejected);
                warn!("Pool {name} saturated, task rejected");
                Err(RalError::PoolSaturated(name.clone()))
            }
            RejectionPolicy::Discard => {
                tracker.set(TaskState::Rejected);
                drop(rejected);
                warn!("Pool {name} saturated, task discarded");
                Ok(handle)
            }
            RejectionPolicy::CallerRuns => {
                debug!("Pool {name} saturated, running task on caller");
                // a panic drops the sender, the handle resolves to Internal
                if catch_unwind(AssertUnwindSafe(rejected)).is_err() {
                    error!("Task panicked on caller of pool {name}");
                }
                Ok(handle)
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock_state();
        let config = &self.inner.config;
        PoolStats {
            name: config.name.clone(),
            workers: state.workers,
            idle: state.idle,
            queued: state.queue.len(),
            core_size: config.core_size,
            max_size: config.max_size,
            queue_capacity: config.queue_capacity,
        }
    }

    /// Stop admitting work. Queued tasks still run before workers exit.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock_state();
        if !state.shutdown {
            state.shutdown = true;
            debug!("Pool {} shutting down", self.inner.config.name);
        }
        self.inner.work_available.notify_all();
    }

    /// Wait until every worker exited. Returns false on timeout.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let state = self.inner.lock_state();
        let (state, _) = self
            .inner
            .terminated
            .wait_timeout_while(state, timeout, |s| s.workers > 0)
            .unwrap_or_else(PoisonError::into_inner);
        state.workers == 0
    }
}

fn policy_label(policy: RejectionPolicy) -> &'static str {
    match policy {
        RejectionPolicy::Abort => "abort",
        RejectionPolicy::Discard => "discard",
        RejectionPolicy::CallerRuns => "caller_runs",
    }
}

impl PoolInner {
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands the job back when it cannot be admitted.
    fn admit(self: &Arc<Self>, job: Job, tracker: &TaskTracker) -> Result<(), Job> {
        let mut state = self.lock_state();
        if state.shutdown {
            return Err(job);
        }

        if state.workers < self.config.core_size {
            return self.start_worker(&mut state, job);
        }

        if state.queue.len() < self.config.queue_capacity {
            tracker.set(TaskState::Queued);
            state.queue.push_back(job);
            self.work_available.notify_one();
            return Ok(());
        }

        if state.workers < self.config.max_size {
            return self.start_worker(&mut state, job);
        }

        Err(job)
    }

    /// Start a worker whose first task is `job`.
    ///
    /// The job is parked at the queue head while the lock is held, so the new
    /// worker (or an idle one) picks it up first.
    fn start_worker(self: &Arc<Self>, state: &mut PoolState, job: Job) -> Result<(), Job> {
        let seq = self.next_worker.fetch_add(1, Ordering::Relaxed) + 1;
        let name = format!("{}-{}-{}", self.config.name, self.epoch, seq);

        state.queue.push_front(job);
        introspect::register(&name, &self.config.name);

        let inner = Arc::clone(self);
        let worker_name = name.clone();
        match thread::Builder::new()
            .name(name.clone())
            .spawn(move || inner.run_worker(worker_name))
        {
            Ok(_) => {
                state.workers += 1;
                debug!("Started worker {name} ({} live)", state.workers);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start worker {name}: {e}");
                introspect::unregister(&name);
                match state.queue.pop_front() {
                    Some(job) => Err(job),
                    None => Ok(()),
                }
            }
        }
    }

    fn run_worker(self: Arc<Self>, name: String) {
        while let Some(job) = self.next_job(&name) {
            introspect::set_state(&name, WorkerState::Running);
            match catch_unwind(AssertUnwindSafe(job)) {
                Ok(()) => introspect::record_completed(&name),
                Err(_) => error!("Task panicked on worker {name}"),
            }
        }
        introspect::unregister(&name);
    }

    /// Next job for a worker, or `None` once it should exit.
    fn next_job(&self, name: &str) -> Option<Job> {
        let mut state = self.lock_state();
        loop {
            if let Some(job) = state.queue.pop_front() {
                return Some(job);
            }
            if state.shutdown {
                return self.retire(state, name);
            }

            introspect::set_state(name, WorkerState::Idle);
            state.idle += 1;
            if state.workers > self.config.core_size {
                let (guard, wait) = self
                    .work_available
                    .wait_timeout(state, self.config.keep_alive())
                    .unwrap_or_else(PoisonError::into_inner);
                state = guard;
                state.idle -= 1;
                if wait.timed_out()
                    && state.queue.is_empty()
                    && state.workers > self.config.core_size
                {
                    return self.retire(state, name);
                }
            } else {
                state = self
                    .work_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
                state.idle -= 1;
            }
        }
    }

    fn retire(&self, mut state: MutexGuard<'_, PoolState>, name: &str) -> Option<Job> {
        state.workers -= 1;
        debug!("Worker {name} exiting ({} live)", state.workers);
        if state.workers == 0 {
            self.terminated.notify_all();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::AtomicUsize,
        time::Instant,
    };

    use super::*;

    /// Blocks tasks until opened.
    #[derive(Clone, Default)]
    struct Gate(Arc<(Mutex<bool>, Condvar)>);

    impl Gate {
        fn wait(&self) {
            let (lock, cvar) = &*self.0;
            let mut open = lock.lock().unwrap();
            while !*open {
                open = cvar.wait(open).unwrap();
            }
        }

        fn open(&self) {
            let (lock, cvar) = &*self.0;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn config(name: &str, core: usize, max: usize, queue: usize) -> PoolConfig {
        PoolConfig {
            name: name.to_string(),
            core_size: core,
            max_size: max,
            queue_capacity: queue,
            ..PoolConfig::default()
        }
    }

    #[test]
    fn test_worker_naming() {
        let pool = BoundedPool::new(&config("pool-naming", 1, 1, 4));
        let name = pool
            .submit(|| thread::current().name().map(str::to_string))
            .unwrap()
            .join()
            .unwrap()
            .unwrap();
        assert!(name.starts_with(&pool.worker_prefix()));
        assert!(name.ends_with("-1"));
        assert!(introspect::list_workers(Some(&pool.worker_prefix())).contains_key(&name));
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert!(introspect::list_workers(Some(&pool.worker_prefix())).is_empty());
    }

    #[test]
    fn test_queue_then_grow_then_reject() {
        let pool = BoundedPool::new(&config("pool-admission", 1, 2, 1));
        let gate = Gate::default();

        let g = gate.clone();
        let first = pool.submit(move || { g.wait(); 1 }).unwrap();
        wait_for(|| first.state() == TaskState::Running);

        let g = gate.clone();
        let second = pool.submit(move || { g.wait(); 2 }).unwrap();
        assert_eq!(TaskState::Queued, second.state());

        let g = gate.clone();
        let third = pool.submit(move || { g.wait(); 3 }).unwrap();
        wait_for(|| third.state() == TaskState::Running);

        let stats = pool.stats();
        assert_eq!(2, stats.workers);
        assert_eq!(1, stats.queued);

        let fourth = pool.submit(|| 4);
        assert!(matches!(fourth, Err(RalError::PoolSaturated(ref name)) if name == "pool-admission"));

        gate.open();
        assert_eq!(1, first.join().unwrap());
        assert_eq!(2, second.join().unwrap());
        assert_eq!(3, third.join().unwrap());
        pool.shutdown();
    }

    #[test]
    fn test_discard_resolves_handle_with_saturation() {
        let mut cfg = config("pool-discard", 1, 1, 0);
        cfg.rejection_policy = RejectionPolicy::Discard;
        let pool = BoundedPool::new(&cfg);
        let gate = Gate::default();

        let g = gate.clone();
        let busy = pool.submit(move || g.wait()).unwrap();
        wait_for(|| busy.state() == TaskState::Running);

        let dropped = pool.submit(|| "never runs").unwrap();
        assert_eq!(TaskState::Rejected, dropped.state());
        assert!(matches!(dropped.join(), Err(RalError::PoolSaturated(_))));

        gate.open();
        busy.join().unwrap();
        pool.shutdown();
    }

    #[test]
    fn test_caller_runs_on_submitting_thread() {
        let mut cfg = config("pool-caller-runs", 1, 1, 0);
        cfg.rejection_policy = RejectionPolicy::CallerRuns;
        let pool = BoundedPool::new(&cfg);
        let gate = Gate::default();

        let g = gate.clone();
        let busy = pool.submit(move || g.wait()).unwrap();
        wait_for(|| busy.state() == TaskState::Running);

        let caller = thread::current().id();
        let ran_on = pool.submit(|| thread::current().id()).unwrap();
        assert_eq!(TaskState::Completed, ran_on.state());
        assert_eq!(caller, ran_on.join().unwrap());

        gate.open();
        busy.join().unwrap();
        pool.shutdown();
    }

    #[test]
    fn test_caller_runs_panic_resolves_handle() {
        let mut cfg = config("pool-caller-panic", 1, 1, 0);
        cfg.rejection_policy = RejectionPolicy::CallerRuns;
        let pool = BoundedPool::new(&cfg);
        let gate = Gate::default();

        let g = gate.clone();
        let busy = pool.submit(move || g.wait()).unwrap();
        wait_for(|| busy.state() == TaskState::Running);

        let failed = pool.submit(|| -> u8 { panic!("boom on caller") }).unwrap();
        assert!(matches!(failed.join(), Err(RalError::Internal(_))));

        gate.open();
        busy.join().unwrap();
        pool.shutdown();
    }

    #[test]
    fn test_panicking_task_keeps_worker() {
        let pool = BoundedPool::new(&config("pool-panic", 1, 1, 4));
        let failed = pool.submit(|| -> u8 { panic!("boom") }).unwrap();
        assert!(matches!(failed.join(), Err(RalError::Internal(_))));
        assert_eq!(7, pool.submit(|| 7).unwrap().join().unwrap());
        assert_eq!(1, pool.stats().workers);
        pool.shutdown();
    }

    #[test]
    fn test_non_core_workers_retire() {
        let mut cfg = config("pool-keep-alive", 1, 2, 0);
        cfg.keep_alive_ms = 20;
        let pool = BoundedPool::new(&cfg);
        let gate = Gate::default();

        let g = gate.clone();
        let first = pool.submit(move || g.wait()).unwrap();
        wait_for(|| first.state() == TaskState::Running);
        let g = gate.clone();
        let second = pool.submit(move || g.wait()).unwrap();
        assert_eq!(2, pool.stats().workers);

        gate.open();
        first.join().unwrap();
        second.join().unwrap();
        wait_for(|| pool.stats().workers == 1);
        pool.shutdown();
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let pool = BoundedPool::new(&config("pool-drain", 1, 1, 16));
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let counter = counter.clone();
                pool.submit(move || {
                    thread::sleep(Duration::from_millis(5));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
        assert_eq!(5, counter.load(Ordering::SeqCst));
        for handle in handles {
            assert_eq!(TaskState::Completed, handle.state());
        }
        assert!(matches!(pool.submit(|| ()), Err(RalError::PoolSaturated(_))));
    }

    #[test]
    fn test_fixed_pool_never_rejects() {
        let pool = BoundedPool::fixed("pool-fixed", 2, None);
        let handles: Vec<_> = (0..64).map(|i| pool.submit(move || i * 2).unwrap()).collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!((0..64).map(|i| i * 2).sum::<usize>(), total);
        assert!(pool.stats().workers <= 2);
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_handle_is_awaitable() {
        let pool = BoundedPool::new(&config("pool-await", 1, 1, 4));
        let value = pool.submit(|| "done").unwrap().await.unwrap();
        assert_eq!("done", value);
        pool.shutdown();
    }
}
