//! Contract tests shared by every execution strategy.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{FixedOffset, TimeZone};

use super::{
    catalog::{CallPolicy, WorkRunner},
    executor::RequestExecutor,
    strategy::{
        PooledFutureStrategy, SequentialStrategy, StrategyKind, StructuredConcurrentStrategy,
    },
};
use crate::{
    config::{PoolConfig, RejectionPolicy},
    core::{
        context::{current_correlation_id, RequestContext},
        error::{RalError, RalResult},
        model::{AggregateResponse, Entity, EntityId, Family, Request, TrendSnapshot, WorkKind},
        traits::{CacheGet, Collaborators, Compute, EntityLookup, TrendFetch},
    },
    executor::{BoundedPool, ContextPropagatingDecorator},
};

const POISON_ID: EntityId = 666;

/// Correlation ids observed by the stubs, in call order.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Option<String>>>>);

impl Recorder {
    fn record(&self) {
        self.0.lock().unwrap().push(current_correlation_id());
    }

    fn take(&self) -> Vec<Option<String>> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

struct StubLookup {
    recorder: Recorder,
    delay: Duration,
}

#[async_trait]
impl EntityLookup for StubLookup {
    async fn find_all_by_id(&self, ids: &BTreeSet<EntityId>) -> RalResult<Vec<Entity>> {
        self.recorder.record();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if ids.contains(&POISON_ID) {
            return Err(RalError::Internal("poisoned id".to_string()));
        }
        let at = FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2022, 12, 1, 0, 0, 0)
            .unwrap();
        Ok(ids
            .iter()
            .map(|&id| Entity {
                id,
                title: Some(format!("e{id}")),
                description: None,
                created_at: at,
                modified_at: at,
            })
            .collect())
    }
}

struct StubCache {
    recorder: Recorder,
}

#[async_trait]
impl CacheGet for StubCache {
    async fn get(&self, key: &str) -> RalResult<Option<String>> {
        self.recorder.record();
        Ok(key.starts_with("test1").then(|| format!("cached:{key}")))
    }
}

struct StubCompute {
    recorder: Recorder,
}

impl Compute for StubCompute {
    fn execute(&self) -> RalResult<String> {
        self.recorder.record();
        Ok("3.141593".to_string())
    }
}

#[derive(Clone, Default)]
struct TrendProbe {
    slow: Arc<AtomicBool>,
    started: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
}

/// Counts a cancellation when dropped while armed.
struct CancelGuard {
    cancelled: Arc<AtomicUsize>,
    armed: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct StubTrend {
    recorder: Recorder,
    probe: TrendProbe,
    delay: Duration,
}

#[async_trait]
impl TrendFetch for StubTrend {
    async fn fetch_trend(&self) -> RalResult<Option<TrendSnapshot>> {
        self.recorder.record();
        self.probe.started.fetch_add(1, Ordering::SeqCst);
        let mut guard = CancelGuard {
            cancelled: self.probe.cancelled.clone(),
            armed: true,
        };
        if self.probe.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        guard.armed = false;
        self.probe.completed.fetch_add(1, Ordering::SeqCst);
        Ok(Some(TrendSnapshot {
            trending_story_ids: vec!["story".to_string()],
            ..TrendSnapshot::default()
        }))
    }
}

struct Harness {
    recorder: Recorder,
    probe: TrendProbe,
    executor: RequestExecutor,
    task_pool: BoundedPool,
}

struct Setup {
    pool: PoolConfig,
    lookup_delay: Duration,
    trend_delay: Duration,
    request_timeout: Duration,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            pool: PoolConfig {
                name: "contract".to_string(),
                ..PoolConfig::default()
            },
            lookup_delay: Duration::ZERO,
            trend_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Setup {
    fn build(self) -> Harness {
        let recorder = Recorder::default();
        let probe = TrendProbe::default();

        let lookups = Family::ALL.map(|_| {
            Arc::new(StubLookup {
                recorder: recorder.clone(),
                delay: self.lookup_delay,
            }) as Arc<dyn EntityLookup>
        });
        let collaborators = Collaborators::new(
            lookups,
            Arc::new(StubCache {
                recorder: recorder.clone(),
            }),
            Arc::new(StubCompute {
                recorder: recorder.clone(),
            }),
            Arc::new(StubTrend {
                recorder: recorder.clone(),
                probe: probe.clone(),
                delay: self.trend_delay,
            }),
        );

        let runner = WorkRunner::new(collaborators, CallPolicy::default());
        let task_pool = BoundedPool::with_decorator(
            &self.pool,
            Some(Arc::new(ContextPropagatingDecorator)),
        );
        let cpu_pool = BoundedPool::fixed(
            "contract-cpu",
            2,
            Some(Arc::new(ContextPropagatingDecorator)),
        );

        let mut executor = RequestExecutor::new(self.request_timeout);
        executor.register(Arc::new(SequentialStrategy::new(runner.clone())));
        executor.register(Arc::new(PooledFutureStrategy::new(
            task_pool.clone(),
            runner.clone(),
        )));
        executor.register(Arc::new(StructuredConcurrentStrategy::new(runner, cpu_pool)));

        Harness {
            recorder,
            probe,
            executor,
            task_pool,
        }
    }
}

impl Harness {
    async fn run(&self, kind: StrategyKind, request: &Request) -> RalResult<AggregateResponse> {
        let ctx = RequestContext::generate();
        self.executor.execute(kind, request, &ctx).await
    }
}

fn example_request() -> Request {
    Request::default()
        .with_ids(Family::ALL[0], [1, 2])
        .with_ids(Family::ALL[2], [5])
}

fn entity_ids(response: &AggregateResponse) -> Vec<Vec<EntityId>> {
    response
        .entities
        .iter()
        .map(|family| family.iter().map(|e| e.id).collect())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_strategies_produce_identical_json() {
    let harness = Setup::default().build();
    let request = example_request();

    let mut rendered = Vec::new();
    for kind in StrategyKind::ALL {
        let response = harness.run(kind, &request).await.unwrap();
        assert_eq!(
            vec![vec![1, 2], vec![], vec![5], vec![]],
            entity_ids(&response),
            "{kind}"
        );
        assert_eq!(
            Some("cached:test1:key:[1, 2]".to_string()),
            response.cache[0]
        );
        assert!(response.cache[1..].iter().all(Option::is_none));
        assert!(response.computed.iter().all(|c| c == "3.141593"));
        assert!(response.trends.iter().all(Option::is_some));
        rendered.push(serde_json::to_string(&response).unwrap());
    }

    assert_eq!(rendered[0], rendered[1]);
    assert_eq!(rendered[1], rendered[2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reruns_are_idempotent() {
    let harness = Setup::default().build();
    let request = example_request();
    for kind in StrategyKind::ALL {
        let first = harness.run(kind, &request).await.unwrap();
        let second = harness.run(kind, &request).await.unwrap();
        assert_eq!(first, second, "{kind}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_empty_request_fills_every_slot() {
    let harness = Setup::default().build();
    for kind in StrategyKind::ALL {
        let response = harness.run(kind, &Request::default()).await.unwrap();
        let json = serde_json::to_value(&response).unwrap();
        for field in ["cache", "entities", "computed", "trends"] {
            assert_eq!(Some(4), json[field].as_array().map(Vec::len), "{kind} {field}");
        }
    }
}

fn saturating_setup(policy: RejectionPolicy) -> Setup {
    Setup {
        pool: PoolConfig {
            name: "contract-saturated".to_string(),
            core_size: 1,
            max_size: 1,
            queue_capacity: 2,
            rejection_policy: policy,
            ..PoolConfig::default()
        },
        lookup_delay: Duration::from_millis(50),
        ..Setup::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_saturated_pool_surfaces_rejection() {
    let harness = saturating_setup(RejectionPolicy::Abort).build();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        harness.run(StrategyKind::PooledFuture, &example_request()),
    )
    .await
    .expect("saturated request must not hang");
    assert!(matches!(result, Err(RalError::PoolSaturated(ref pool)) if pool == "contract-saturated"));

    // the pool keeps serving once the burst is over
    let value = harness.task_pool.submit(|| 5).unwrap().await.unwrap();
    assert_eq!(5, value);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_discarded_tasks_do_not_hang() {
    let harness = saturating_setup(RejectionPolicy::Discard).build();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        harness.run(StrategyKind::PooledFuture, &example_request()),
    )
    .await
    .expect("discarded tasks must resolve");
    assert!(matches!(result, Err(RalError::PoolSaturated(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_caller_runs_completes_the_request() {
    let harness = saturating_setup(RejectionPolicy::CallerRuns).build();
    let response = tokio::time::timeout(
        Duration::from_secs(5),
        harness.run(StrategyKind::PooledFuture, &example_request()),
    )
    .await
    .expect("caller-run tasks must resolve")
    .unwrap();
    assert_eq!(vec![vec![1, 2], vec![], vec![5], vec![]], entity_ids(&response));
    assert!(response.trends.iter().all(Option::is_some));
}

#[tokio::test]
async fn test_caller_runs_on_current_thread_runtime_refuses() {
    let harness = saturating_setup(RejectionPolicy::CallerRuns).build();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        harness.run(StrategyKind::PooledFuture, &example_request()),
    )
    .await
    .expect("refused tasks must resolve");
    assert!(matches!(result, Err(RalError::PoolSaturated(ref pool)) if pool == "contract-saturated"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_the_pool() {
    let harness = Arc::new(
        Setup {
            pool: PoolConfig {
                name: "contract-shared".to_string(),
                core_size: 4,
                max_size: 8,
                queue_capacity: 64,
                ..PoolConfig::default()
            },
            ..Setup::default()
        }
        .build(),
    );

    let runs: Vec<_> = (0..3)
        .map(|_| {
            let harness = harness.clone();
            tokio::spawn(async move {
                harness
                    .run(StrategyKind::PooledFuture, &example_request())
                    .await
            })
        })
        .collect();
    for run in runs {
        let response = run.await.unwrap().unwrap();
        assert_eq!(vec![vec![1, 2], vec![], vec![5], vec![]], entity_ids(&response));
    }
    assert!(harness.task_pool.stats().workers <= 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_cancels_slow_siblings() {
    let harness = Setup {
        lookup_delay: Duration::from_millis(20),
        ..Setup::default()
    }
    .build();
    harness.probe.slow.store(true, Ordering::SeqCst);

    let poisoned = Request::default().with_ids(Family::ALL[0], [POISON_ID]);
    let started = std::time::Instant::now();
    let result = harness
        .run(StrategyKind::StructuredConcurrent, &poisoned)
        .await;
    assert!(started.elapsed() < Duration::from_secs(2));

    match result {
        Err(RalError::Collaborator { item, .. }) => {
            assert_eq!(WorkKind::Lookup, item.kind);
            assert_eq!(Family::ALL[0], item.family);
        }
        other => panic!("expected lookup failure, got {other:?}"),
    }

    // the aborted trend siblings reach the aggregator as cancellations, the
    // lookup failure above still wins
    let started_trends = harness.probe.started.load(Ordering::SeqCst);
    assert!(started_trends > 0);
    assert_eq!(0, harness.probe.completed.load(Ordering::SeqCst));
    assert_eq!(started_trends, harness.probe.cancelled.load(Ordering::SeqCst));

    // the next request is unaffected
    harness.probe.slow.store(false, Ordering::SeqCst);
    let response = harness
        .run(StrategyKind::StructuredConcurrent, &example_request())
        .await
        .unwrap();
    assert!(response.trends.iter().all(Option::is_some));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lookup_failure_fails_every_strategy() {
    let harness = Setup::default().build();
    let poisoned = Request::default().with_ids(Family::ALL[3], [POISON_ID]);
    for kind in StrategyKind::ALL {
        let result = harness.run(kind, &poisoned).await;
        assert!(
            matches!(result, Err(RalError::Collaborator { item, .. }) if item.family == Family::ALL[3]),
            "{kind}"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sequential_stops_at_first_failure() {
    let harness = Setup::default().build();
    let poisoned = Request::default().with_ids(Family::ALL[0], [POISON_ID]);
    assert!(harness.run(StrategyKind::Sequential, &poisoned).await.is_err());
    // only the failing lookup ran
    assert_eq!(1, harness.recorder.take().len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_context_reaches_every_item() {
    let harness = Setup::default().build();
    let request = example_request();

    for kind in StrategyKind::ALL {
        for correlation_id in ["request-a", "request-b"] {
            let ctx = RequestContext::new(correlation_id);
            harness.executor.execute(kind, &request, &ctx).await.unwrap();

            let seen = harness.recorder.take();
            assert_eq!(16, seen.len(), "{kind}");
            assert!(
                seen.iter().all(|id| id.as_deref() == Some(correlation_id)),
                "{kind} saw {seen:?}"
            );
        }
    }

    // pool workers keep nothing from earlier requests
    let leftover = harness
        .task_pool
        .submit(current_correlation_id)
        .unwrap()
        .await
        .unwrap();
    assert_eq!(None, leftover);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_deadline() {
    let harness = Setup {
        trend_delay: Duration::from_millis(500),
        request_timeout: Duration::from_millis(50),
        ..Setup::default()
    }
    .build();
    harness.probe.slow.store(true, Ordering::SeqCst);

    for kind in StrategyKind::ALL {
        let result = harness.run(kind, &example_request()).await;
        assert!(matches!(result, Err(RalError::Timeout(_))), "{kind}");
    }
}
