// Engine facade: owns the worker pool, the result cache and the request API

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::algorithm::{AStarAlgorithm, PathQuery, PathfindAlgorithm};
use crate::config::EngineConfig;
use crate::error::{PathfindError, Result};
use crate::graph::{CollisionCategory, DefinitionNodeGrid, DefinitionNodeNetwork, NodeIndex};
use crate::storage::{CacheLookup, PathCache};

use super::fingerprint::RequestComparer;
use super::processor::{PathJob, PathProcessor, RequestProcessor};
use super::registry::RegisteredPathfinder;
use super::request::PathRequest;
use super::sync_context::{SynchronizationContext, ThreadSyncContext};
use super::workers::WorkerPool;

/// Grid A* engine, the common setup
pub type GridPathfinder = PathfindEngine<DefinitionNodeGrid, AStarAlgorithm>;

type DisposedListener = Box<dyn FnOnce(&str) + Send + 'static>;

/// Asynchronous pathfinder over a shared definition network.
///
/// Every worker owns one clone of the definition. Requests are fingerprinted on submission:
/// cached results complete the request right away, duplicates of an in-flight search attach
/// to it, and only genuinely new work reaches the worker queue.
pub struct PathfindEngine<G, A>
where
    G: DefinitionNodeNetwork,
    A: PathfindAlgorithm<G::ThreadNetwork>,
{
    id: String,
    definition: Arc<G>,
    cache: Arc<PathCache<A::Path>>,
    pool: WorkerPool<A::Path>,
    sync_context: Arc<dyn SynchronizationContext>,
    disposed: AtomicBool,
    /// `None` once the disposed notification fired
    disposed_listeners: Mutex<Option<Vec<DisposedListener>>>,
}

pub struct PathfindEngineBuilder<G, A> {
    definition: Arc<G>,
    algorithm: A,
    config: EngineConfig,
    comparer: Option<Arc<dyn RequestComparer>>,
    sync_context: Option<Arc<dyn SynchronizationContext>>,
}

impl<G, A> PathfindEngineBuilder<G, A>
where
    G: DefinitionNodeNetwork,
    A: PathfindAlgorithm<G::ThreadNetwork>,
{
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the comparer selected by the config's cache policy
    pub fn comparer(mut self, comparer: Arc<dyn RequestComparer>) -> Self {
        self.comparer = Some(comparer);
        self
    }

    /// Where completion callbacks run; defaults to a dedicated delivery thread
    pub fn sync_context(mut self, sync_context: Arc<dyn SynchronizationContext>) -> Self {
        self.sync_context = Some(sync_context);
        self
    }

    pub fn build(self) -> Result<PathfindEngine<G, A>> {
        let config = self.config;
        config.validate()?;

        let comparer = self
            .comparer
            .unwrap_or_else(|| config.cache_policy.comparer());
        let sync_context: Arc<dyn SynchronizationContext> = match self.sync_context {
            Some(sync_context) => sync_context,
            None => Arc::new(ThreadSyncContext::new(&format!("{}-sync", config.thread_name_prefix))?),
        };

        let definition = self.definition;
        let algorithm = Arc::new(self.algorithm);
        let pool = WorkerPool::new(config.worker_threads, &config.thread_name_prefix, |_| {
            let processor = RequestProcessor::<G, A>::new(&definition, Arc::clone(&algorithm));
            Ok(Box::new(processor) as Box<dyn PathProcessor<A::Path>>)
        })?;

        info!(
            id = %config.pathfinder_id,
            workers = config.worker_threads,
            nodes = definition.node_count(),
            cache_capacity = config.cache_capacity,
            "Pathfinder created"
        );

        Ok(PathfindEngine {
            id: config.pathfinder_id,
            cache: Arc::new(PathCache::new(comparer, config.cache_capacity)),
            definition,
            pool,
            sync_context,
            disposed: AtomicBool::new(false),
            disposed_listeners: Mutex::new(Some(Vec::new())),
        })
    }
}

impl<G, A> PathfindEngine<G, A>
where
    G: DefinitionNodeNetwork,
    A: PathfindAlgorithm<G::ThreadNetwork>,
{
    pub fn builder(definition: Arc<G>, algorithm: A) -> PathfindEngineBuilder<G, A> {
        PathfindEngineBuilder {
            definition,
            algorithm,
            config: EngineConfig::default(),
            comparer: None,
            sync_context: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn definition(&self) -> &Arc<G> {
        &self.definition
    }

    pub fn cache(&self) -> &Arc<PathCache<A::Path>> {
        &self.cache
    }

    pub fn sync_context(&self) -> &Arc<dyn SynchronizationContext> {
        &self.sync_context
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.thread_count()
    }

    pub fn queued_len(&self) -> usize {
        self.pool.queued_len()
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_running()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Start the workers; requests submitted before this wait in the queue
    pub fn start(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(PathfindError::Disposed);
        }
        self.pool.start()?;
        info!(id = %self.id, "Pathfinder started");
        Ok(())
    }

    /// Finish in-flight searches and park the workers; queued requests survive a restart
    pub fn stop(&self) {
        self.pool.stop();
        info!(id = %self.id, "Pathfinder stopped");
    }

    /// Stop for good: queued requests are cancelled, worker networks released, retained
    /// results dropped, then the disposed notification fires. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pool.dispose();
        self.cache.clear();
        info!(id = %self.id, "Pathfinder disposed");

        let listeners = self.disposed_listeners.lock().take().unwrap_or_default();
        for listener in listeners {
            listener(&self.id);
        }
    }

    /// Register a disposed notification; runs immediately if already disposed
    pub fn on_disposed<F>(&self, listener: F)
    where
        F: FnOnce(&str) + Send + 'static,
    {
        let mut listeners = self.disposed_listeners.lock();
        match listeners.as_mut() {
            Some(pending) => pending.push(Box::new(listener)),
            None => {
                drop(listeners);
                listener(&self.id);
            }
        }
    }

    /// Request a path between two world positions
    pub fn request_path(
        &self,
        start: (f32, f32),
        end: (f32, f32),
        collision_category: CollisionCategory,
        agent_size: u8,
    ) -> Result<Arc<PathRequest<A::Path>>> {
        let start_node = self.resolve(start)?;
        let end_node = self.resolve(end)?;
        self.request_path_nodes(start_node, end_node, collision_category, agent_size)
    }

    /// Request a path between two node indexes
    pub fn request_path_nodes(
        &self,
        start: NodeIndex,
        end: NodeIndex,
        collision_category: CollisionCategory,
        agent_size: u8,
    ) -> Result<Arc<PathRequest<A::Path>>> {
        let query = PathQuery::new(start, end)
            .with_collision_category(collision_category)
            .with_agent_size(agent_size);
        let request = self.create_request(query)?;
        self.submit(&request)?;
        Ok(request)
    }

    /// Build a request without submitting it, so callbacks can be attached first
    pub fn create_request(&self, query: PathQuery) -> Result<Arc<PathRequest<A::Path>>> {
        let node_count = self.definition.node_count();
        for node in [query.start, query.end] {
            if node >= node_count {
                return Err(PathfindError::InvalidNode(node));
            }
        }
        Ok(PathRequest::new(query, Arc::clone(&self.sync_context)))
    }

    /// Hand a created request to the engine: served from the cache, attached to an
    /// identical in-flight search, or queued for a worker
    pub fn submit(&self, request: &Arc<PathRequest<A::Path>>) -> Result<()> {
        if self.is_disposed() {
            return Err(PathfindError::Disposed);
        }
        if !request.mark_queued() {
            return Err(PathfindError::AlreadySubmitted(request.id()));
        }

        match self.cache.try_get_or_reserve(request) {
            CacheLookup::HitCompleted(outcome) => {
                debug!(request = %request.id(), "Path served from cache");
                request.complete(outcome);
                Ok(())
            }
            CacheLookup::HitInProgress => {
                debug!(request = %request.id(), "Path request attached to in-flight search");
                Ok(())
            }
            CacheLookup::Miss(reservation) => {
                debug!(request = %request.id(), "Path request queued");
                self.pool.enqueue(PathJob {
                    request: Arc::clone(request),
                    reservation,
                })
            }
        }
    }

    fn resolve(&self, (x, y): (f32, f32)) -> Result<NodeIndex> {
        self.definition
            .node_index(x, y)
            .ok_or(PathfindError::OutOfBounds { x, y })
    }
}

impl<G, A> RegisteredPathfinder for PathfindEngine<G, A>
where
    G: DefinitionNodeNetwork,
    A: PathfindAlgorithm<G::ThreadNetwork>,
{
    fn pathfinder_id(&self) -> &str {
        &self.id
    }

    fn on_disposed(&self, listener: Box<dyn FnOnce(&str) + Send + 'static>) {
        PathfindEngine::on_disposed(self, listener);
    }
}

impl<G, A> Drop for PathfindEngine<G, A>
where
    G: DefinitionNodeNetwork,
    A: PathfindAlgorithm<G::ThreadNetwork>,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::NodePath;
    use crate::config::CachePolicy;
    use crate::engine::{ChannelSyncContext, FailureReason, PathOutcome, RequestState};
    use crate::error::HeapError;
    use crate::graph::ThreadNodeGrid;
    use crate::storage::RefMaxHeap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// A* that records which targets it searched
    #[derive(Default)]
    struct RecordingAStar {
        searched: Arc<Mutex<Vec<NodeIndex>>>,
    }

    impl PathfindAlgorithm<ThreadNodeGrid> for RecordingAStar {
        type Path = NodePath;

        fn find_path(
            &self,
            network: &mut ThreadNodeGrid,
            open: &mut RefMaxHeap,
            query: &PathQuery,
        ) -> std::result::Result<Option<NodePath>, HeapError> {
            self.searched.lock().push(query.end);
            AStarAlgorithm.find_path(network, open, query)
        }
    }

    fn grid(width: i32, height: i32, blocked: &[(i32, i32)]) -> Arc<DefinitionNodeGrid> {
        let mut grid = DefinitionNodeGrid::new(width, height).unwrap();
        for &(x, y) in blocked {
            grid.set_collision(x, y, CollisionCategory::CAT1).unwrap();
        }
        Arc::new(grid)
    }

    fn engine(
        definition: Arc<DefinitionNodeGrid>,
        config: EngineConfig,
    ) -> (
        PathfindEngine<DefinitionNodeGrid, RecordingAStar>,
        Arc<Mutex<Vec<NodeIndex>>>,
        Arc<ChannelSyncContext>,
    ) {
        init_tracing();
        let algorithm = RecordingAStar::default();
        let searched = algorithm.searched.clone();
        let sync = Arc::new(ChannelSyncContext::new());
        let engine = PathfindEngine::builder(definition, algorithm)
            .config(config)
            .sync_context(sync.clone())
            .build()
            .unwrap();
        (engine, searched, sync)
    }

    fn length(request: &PathRequest<NodePath>) -> f32 {
        request.completed_path().expect("expected a solved path").length
    }

    #[test]
    fn test_grid_scenarios() {
        let cases: [(&[(i32, i32)], (f32, f32), f32); 4] = [
            (&[], (10.0, 0.0), 10.0),
            (&[(5, 0)], (10.0, 0.0), 10.83),
            (&[(5, 0), (5, 1)], (10.0, 0.0), 11.66),
            (&[(5, 0), (5, 1), (5, 2), (2, 2), (3, 2), (3, 1)], (7.0, 2.0), 9.24),
        ];
        for (blocked, end, expected) in cases {
            let (engine, _, _) = engine(grid(11, 11, blocked), EngineConfig::default());
            engine.start().unwrap();
            let request = engine
                .request_path((0.0, 0.0), end, CollisionCategory::CAT1, 1)
                .unwrap();
            assert!(request.wait(WAIT));
            assert!((length(&request) - expected).abs() < 0.01);
        }

        let (engine, _, _) = engine(grid(7, 7, &[]), EngineConfig::default());
        engine.start().unwrap();
        let request = engine
            .request_path((0.0, 0.0), (6.0, 6.0), CollisionCategory::CAT1, 1)
            .unwrap();
        assert!(request.wait(WAIT));
        assert!((length(&request) - 8.49).abs() < 0.01);
    }

    #[test]
    fn test_no_path_fails_through_callback() {
        let (engine, _, sync) = engine(grid(3, 3, &[(1, 0), (1, 1), (1, 2)]), EngineConfig::default());
        engine.start().unwrap();
        let request = engine
            .request_path((0.0, 0.0), (2.0, 2.0), CollisionCategory::CAT1, 1)
            .unwrap();

        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        request.add_callback(move |r| *slot.lock() = Some(r.state()));

        assert!(request.wait(WAIT));
        sync.drain_timeout(WAIT);
        assert_eq!(*seen.lock(), Some(RequestState::Failed));
        assert!(matches!(
            request.outcome(),
            Some(PathOutcome::Failed(FailureReason::NoPathFound))
        ));
    }

    #[test]
    fn test_duplicates_run_one_search() {
        let config = EngineConfig::default()
            .with_worker_threads(4)
            .with_cache_policy(CachePolicy::SingleSource);
        let (engine, searched, sync) = engine(grid(11, 11, &[(5, 0)]), config);

        // Same destination and constraints, different starts
        let first = engine.request_path_nodes(0, 10, CollisionCategory::CAT1, 1).unwrap();
        let second = engine.request_path_nodes(0, 10, CollisionCategory::CAT1, 1).unwrap();
        assert_eq!(engine.queued_len(), 1);

        let delivered = Arc::new(AtomicUsize::new(0));
        for request in [&first, &second] {
            let delivered = delivered.clone();
            request.add_callback(move |_| {
                delivered.fetch_add(1, Ordering::SeqCst);
            });
        }

        engine.start().unwrap();
        assert!(first.wait(WAIT) && second.wait(WAIT));
        assert_eq!(searched.lock().len(), 1);
        assert!(Arc::ptr_eq(
            &first.completed_path().unwrap(),
            &second.completed_path().unwrap()
        ));

        while delivered.load(Ordering::SeqCst) < 2 {
            assert!(sync.drain_timeout(WAIT) > 0);
        }
    }

    #[test]
    fn test_completed_result_served_from_cache() {
        let (engine, searched, _) = engine(grid(11, 11, &[]), EngineConfig::default());
        engine.start().unwrap();
        let first = engine.request_path_nodes(0, 120, CollisionCategory::CAT1, 1).unwrap();
        assert!(first.wait(WAIT));

        let second = engine.request_path_nodes(0, 120, CollisionCategory::CAT1, 1).unwrap();
        // Completed during submit, no worker involved
        assert_eq!(second.state(), RequestState::Solved);
        assert_eq!(searched.lock().len(), 1);
        assert_eq!(engine.cache().stats().hits, 1);
    }

    #[test]
    fn test_single_worker_fifo() {
        let (engine, searched, _) = engine(grid(11, 11, &[]), EngineConfig::default());
        let targets = [10, 20, 30, 40, 50, 60];
        let requests: Vec<_> = targets
            .iter()
            .map(|&end| engine.request_path_nodes(0, end, CollisionCategory::CAT1, 1).unwrap())
            .collect();

        engine.start().unwrap();
        for request in &requests {
            assert!(request.wait(WAIT));
        }
        assert_eq!(*searched.lock(), targets.to_vec());
    }

    #[test]
    fn test_invalid_positions_rejected() {
        let (engine, _, _) = engine(grid(3, 3, &[]), EngineConfig::default());
        assert!(matches!(
            engine.request_path((0.0, 0.0), (9.0, 0.0), CollisionCategory::CAT1, 1),
            Err(PathfindError::OutOfBounds { .. })
        ));
        assert!(matches!(
            engine.request_path_nodes(0, 9, CollisionCategory::CAT1, 1),
            Err(PathfindError::InvalidNode(9))
        ));
    }

    #[test]
    fn test_submit_twice_rejected() {
        let (engine, _, _) = engine(grid(3, 3, &[]), EngineConfig::default());
        let request = engine.create_request(PathQuery::new(0, 8)).unwrap();
        engine.submit(&request).unwrap();
        assert!(matches!(
            engine.submit(&request),
            Err(PathfindError::AlreadySubmitted(_))
        ));
    }

    #[test]
    fn test_dispose_while_queued_reaches_terminal_state() {
        let (engine, _, sync) = engine(grid(3, 3, &[]), EngineConfig::default());
        let request = engine.create_request(PathQuery::new(0, 8)).unwrap();
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        request.add_callback(move |r| *slot.lock() = Some(r.state()));
        engine.submit(&request).unwrap();

        let notified = Arc::new(Mutex::new(None));
        let id_slot = notified.clone();
        engine.on_disposed(move |id| *id_slot.lock() = Some(id.to_string()));

        engine.dispose();
        engine.dispose();
        sync.drain();

        assert_eq!(*seen.lock(), Some(RequestState::Cancelled));
        assert_eq!(notified.lock().as_deref(), Some("default"));
        assert!(engine.is_disposed());
        assert!(matches!(engine.start(), Err(PathfindError::Disposed)));
        assert!(matches!(
            engine.request_path_nodes(0, 8, CollisionCategory::CAT1, 1),
            Err(PathfindError::Disposed)
        ));
    }

    #[test]
    fn test_stop_then_restart() {
        let (engine, _, _) = engine(grid(5, 5, &[]), EngineConfig::default());
        engine.start().unwrap();
        engine.stop();
        let request = engine.request_path_nodes(0, 24, CollisionCategory::CAT1, 1).unwrap();
        assert!(!request.wait(Duration::from_millis(20)));
        assert_eq!(request.state(), RequestState::Queued);

        engine.start().unwrap();
        assert!(request.wait(WAIT));
        assert_eq!(request.state(), RequestState::Solved);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = PathfindEngine::builder(grid(3, 3, &[]), AStarAlgorithm)
            .config(EngineConfig::default().with_worker_threads(0))
            .build();
        assert!(matches!(result, Err(PathfindError::Configuration(_))));
    }

    #[test]
    fn test_default_sync_context_delivers_on_its_thread() {
        let engine: GridPathfinder = PathfindEngine::builder(grid(5, 5, &[]), AStarAlgorithm)
            .build()
            .unwrap();
        engine.start().unwrap();

        let (tx, rx) = crossbeam_channel::bounded(1);
        let request = engine.create_request(PathQuery::new(0, 24)).unwrap();
        request.add_callback(move |r| {
            let _ = tx.send((r.state(), std::thread::current().name().map(str::to_string)));
        });
        engine.submit(&request).unwrap();

        let (state, thread_name) = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(state, RequestState::Solved);
        assert_eq!(thread_name.as_deref(), Some("pathfind-worker-sync"));
    }
}
