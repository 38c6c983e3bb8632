// Path request: unit of work, result holder and callback list

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use ulid::Ulid;

use crate::algorithm::PathQuery;

use super::sync_context::SynchronizationContext;

/// Completion handler; receives the finished request
pub type PathCallback<P> = Box<dyn FnOnce(&PathRequest<P>) + Send + 'static>;

/// Request lifecycle. Transitions only move forward; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Created,
    Queued,
    Processing,
    Solved,
    Failed,
    Cancelled,
}

impl RequestState {
    #[inline]
    fn rank(self) -> u8 {
        match self {
            RequestState::Created => 0,
            RequestState::Queued => 1,
            RequestState::Processing => 2,
            RequestState::Solved | RequestState::Failed | RequestState::Cancelled => 3,
        }
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        self.rank() == 3
    }

    /// Forward-only rule; cancelling is only possible before processing starts
    pub fn can_transition_to(self, next: RequestState) -> bool {
        if self.is_terminal() || next.rank() <= self.rank() {
            return false;
        }
        next != RequestState::Cancelled || self.rank() < RequestState::Processing.rank()
    }
}

/// Why a request ended in [`RequestState::Failed`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The search finished and no path exists; an expected outcome
    NoPathFound,
    /// The search faulted or was abandoned; the message is for logs only
    WorkerFault(String),
}

/// Terminal result shared by a request and every waiter with the same fingerprint
pub enum PathOutcome<P> {
    Solved(Arc<P>),
    Failed(FailureReason),
}

impl<P> PathOutcome<P> {
    pub fn state(&self) -> RequestState {
        match self {
            PathOutcome::Solved(_) => RequestState::Solved,
            PathOutcome::Failed(_) => RequestState::Failed,
        }
    }

    pub fn path(&self) -> Option<&Arc<P>> {
        match self {
            PathOutcome::Solved(path) => Some(path),
            PathOutcome::Failed(_) => None,
        }
    }

    /// Faults are transient and must not be served from the cache
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, PathOutcome::Failed(FailureReason::WorkerFault(_)))
    }
}

impl<P> Clone for PathOutcome<P> {
    fn clone(&self) -> Self {
        match self {
            PathOutcome::Solved(path) => PathOutcome::Solved(Arc::clone(path)),
            PathOutcome::Failed(reason) => PathOutcome::Failed(reason.clone()),
        }
    }
}

impl<P> fmt::Debug for PathOutcome<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathOutcome::Solved(_) => f.write_str("Solved(..)"),
            PathOutcome::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
        }
    }
}

struct RequestInner<P> {
    state: RequestState,
    outcome: Option<PathOutcome<P>>,
    callbacks: Vec<PathCallback<P>>,
}

/// Asynchronous path request handle.
///
/// Owned by the engine from submission until its outcome is published. Callbacks are
/// never run by the thread that completes the request; they are posted to the request's
/// synchronization context, in registration order. Callbacks added after completion are
/// posted immediately.
pub struct PathRequest<P> {
    id: Ulid,
    query: PathQuery,
    sync_context: Arc<dyn SynchronizationContext>,
    inner: Mutex<RequestInner<P>>,
    finished: Condvar,
}

impl<P: Send + Sync + 'static> PathRequest<P> {
    pub fn new(query: PathQuery, sync_context: Arc<dyn SynchronizationContext>) -> Arc<Self> {
        Arc::new(Self {
            id: Ulid::new(),
            query,
            sync_context,
            inner: Mutex::new(RequestInner {
                state: RequestState::Created,
                outcome: None,
                callbacks: Vec::new(),
            }),
            finished: Condvar::new(),
        })
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn query(&self) -> &PathQuery {
        &self.query
    }

    pub fn state(&self) -> RequestState {
        self.inner.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// `None` until solved or failed; cancelled requests never get an outcome
    pub fn outcome(&self) -> Option<PathOutcome<P>> {
        self.inner.lock().outcome.clone()
    }

    pub fn completed_path(&self) -> Option<Arc<P>> {
        self.inner.lock().outcome.as_ref().and_then(|o| o.path().cloned())
    }

    pub fn add_callback<F>(self: &Arc<Self>, callback: F)
    where
        F: FnOnce(&PathRequest<P>) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            drop(inner);
            let callback: PathCallback<P> = Box::new(callback);
            self.dispatch(vec![callback]);
        } else {
            inner.callbacks.push(Box::new(callback));
        }
    }

    /// Cancel a request that has not been picked up by a worker yet
    pub fn cancel(self: &Arc<Self>) -> bool {
        self.finish(RequestState::Cancelled, None)
    }

    /// Block until the request reaches a terminal state (callbacks may still be pending)
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !inner.state.is_terminal() {
            if self.finished.wait_until(&mut inner, deadline).timed_out() {
                return inner.state.is_terminal();
            }
        }
        true
    }

    /// Created -> Queued
    pub(crate) fn mark_queued(&self) -> bool {
        self.advance(RequestState::Queued)
    }

    /// Queued -> Processing; false when the request was cancelled while queued
    pub(crate) fn begin_processing(&self) -> bool {
        self.advance(RequestState::Processing)
    }

    /// Store the outcome and post callbacks; false if the request already finished
    pub(crate) fn complete(self: &Arc<Self>, outcome: PathOutcome<P>) -> bool {
        let state = outcome.state();
        self.finish(state, Some(outcome))
    }

    fn advance(&self, next: RequestState) -> bool {
        let mut inner = self.inner.lock();
        if !inner.state.can_transition_to(next) {
            return false;
        }
        inner.state = next;
        true
    }

    fn finish(self: &Arc<Self>, next: RequestState, outcome: Option<PathOutcome<P>>) -> bool {
        let callbacks = {
            let mut inner = self.inner.lock();
            if !inner.state.can_transition_to(next) {
                return false;
            }
            inner.state = next;
            inner.outcome = outcome;
            std::mem::take(&mut inner.callbacks)
        };
        self.finished.notify_all();
        self.dispatch(callbacks);
        true
    }

    fn dispatch(self: &Arc<Self>, callbacks: Vec<PathCallback<P>>) {
        if callbacks.is_empty() {
            return;
        }
        let request = Arc::clone(self);
        self.sync_context.post(Box::new(move || {
            for callback in callbacks {
                callback(&request);
            }
        }));
    }
}

impl<P> fmt::Debug for PathRequest<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathRequest")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("state", &self.inner.lock().state)
            .finish()
    }
}
