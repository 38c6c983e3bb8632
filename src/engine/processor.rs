// Per-worker request processor: one node network clone, the shared algorithm, one open list

use std::sync::Arc;

use tracing::{debug, error};

use crate::algorithm::{PathQuery, PathfindAlgorithm};
use crate::graph::{DefinitionNodeNetwork, PathfindNodeNetwork};
use crate::storage::{RefMaxHeap, Reservation};

use super::request::{FailureReason, PathOutcome, PathRequest};

/// A reserved request waiting in the worker queue
pub struct PathJob<P: Send + Sync + 'static> {
    pub request: Arc<PathRequest<P>>,
    /// Exclusive right to solve the request's fingerprint
    pub reservation: Reservation<P>,
}

impl<P: Send + Sync + 'static> PathJob<P> {
    /// Drop the job without solving it; the request and its waiters are cancelled
    pub fn discard(self) {
        self.request.cancel();
        self.reservation.cancel_waiters();
    }
}

/// Worker-side executor, object safe so the pool does not depend on the network type
pub trait PathProcessor<P: Send + Sync + 'static>: Send {
    /// Run one job to completion. Returns the published outcome, or `None` when the job
    /// was cancelled and nobody else waited for it.
    fn process(&mut self, job: PathJob<P>) -> Option<PathOutcome<P>>;
}

pub struct RequestProcessor<G, A>
where
    G: DefinitionNodeNetwork,
    A: PathfindAlgorithm<G::ThreadNetwork>,
{
    network: G::ThreadNetwork,
    algorithm: Arc<A>,
    open: RefMaxHeap,
    searches: u64,
}

impl<G, A> RequestProcessor<G, A>
where
    G: DefinitionNodeNetwork,
    A: PathfindAlgorithm<G::ThreadNetwork>,
{
    /// Clones the definition into a network owned by this processor alone
    pub fn new(definition: &Arc<G>, algorithm: Arc<A>) -> Self {
        let network = G::create_thread_network(definition);
        let open = RefMaxHeap::with_capacity(network.node_count().min(4096));
        Self {
            network,
            algorithm,
            open,
            searches: 0,
        }
    }

    pub fn network(&self) -> &G::ThreadNetwork {
        &self.network
    }

    /// Searches run by this processor
    pub fn searches(&self) -> u64 {
        self.searches
    }

    /// Run the algorithm; a missing path and a broken heap both become failed outcomes
    pub fn solve(&mut self, query: &PathQuery) -> PathOutcome<A::Path> {
        self.searches += 1;
        debug_log!("Searching {} -> {} on a {} node network", query.start, query.end, self.network.node_count());

        match self.algorithm.find_path(&mut self.network, &mut self.open, query) {
            Ok(Some(path)) => PathOutcome::Solved(Arc::new(path)),
            Ok(None) => PathOutcome::Failed(FailureReason::NoPathFound),
            Err(e) => {
                error!("Open list violation while searching {} -> {}: {}", query.start, query.end, e);
                PathOutcome::Failed(FailureReason::WorkerFault(e.to_string()))
            }
        }
    }
}

impl<G, A> PathProcessor<A::Path> for RequestProcessor<G, A>
where
    G: DefinitionNodeNetwork,
    A: PathfindAlgorithm<G::ThreadNetwork>,
{
    fn process(&mut self, job: PathJob<A::Path>) -> Option<PathOutcome<A::Path>> {
        let PathJob { request, reservation } = job;

        if !request.begin_processing() {
            // Cancelled while queued; still solve if duplicates attached meanwhile
            let reservation = match reservation.release_if_unwatched() {
                Ok(()) => {
                    debug!(request = %request.id(), "Skipping cancelled path request");
                    return None;
                }
                Err(reservation) => reservation,
            };
            let outcome = self.solve(request.query());
            reservation.publish(outcome.clone());
            return Some(outcome);
        }

        let outcome = self.solve(request.query());
        request.complete(outcome.clone());
        let waiters = reservation.publish(outcome.clone());
        debug!(
            request = %request.id(),
            state = ?outcome.state(),
            waiters,
            "Path request processed"
        );
        Some(outcome)
    }
}
