/// Result cache with an atomic reserve/publish protocol
///
/// Keyed by request fingerprint. The first request for a fingerprint gets a [`Reservation`]
/// and becomes responsible for running the search; every request with the same fingerprint
/// arriving before publish attaches to the in-progress entry and is completed by that one
/// publish, in attach order. Completed results are then served directly until evicted.
///
/// Reservation happens under the map's entry lock, so exactly one caller wins even when
/// duplicates race. The lock is held only for the map operation, never across a search.
///
/// Eviction: completed entries are bounded by `capacity` and evicted least recently used
/// first. In-progress entries are never evicted.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::algorithm::PathQuery;
use crate::engine::{FailureReason, Fingerprint, PathOutcome, PathRequest, RequestComparer};

enum CacheEntry<P> {
    InProgress {
        /// Requests completed by the reservation holder's publish, in attach order
        waiters: Vec<Arc<PathRequest<P>>>,
        /// Cleared by invalidation while the search runs; the result is then delivered
        /// to the waiters but not retained
        retain: bool,
    },
    Completed(PathOutcome<P>),
}

/// Result of [`PathCache::try_get_or_reserve`]
pub enum CacheLookup<P: Send + Sync + 'static> {
    /// A published outcome; the caller completes its request with it
    HitCompleted(PathOutcome<P>),
    /// Another request is being solved; the caller's request was attached as a waiter
    HitInProgress,
    /// The caller now owns the search for this fingerprint
    Miss(Reservation<P>),
}

/// Counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub attached: u64,
    pub retained: usize,
}

pub struct PathCache<P> {
    comparer: Arc<dyn RequestComparer>,
    entries: DashMap<Fingerprint, CacheEntry<P>>,
    /// Completed fingerprints, least recently used at the front
    lru_order: Mutex<VecDeque<Fingerprint>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    attached: AtomicU64,
}

impl<P: Send + Sync + 'static> PathCache<P> {
    pub fn new(comparer: Arc<dyn RequestComparer>, capacity: usize) -> Self {
        Self {
            comparer,
            entries: DashMap::new(),
            lru_order: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            attached: AtomicU64::new(0),
        }
    }

    pub fn comparer(&self) -> &Arc<dyn RequestComparer> {
        &self.comparer
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn fingerprint(&self, query: &PathQuery) -> Fingerprint {
        self.comparer.fingerprint(query)
    }

    /// Look up the request's fingerprint, attaching or reserving atomically
    pub fn try_get_or_reserve(self: &Arc<Self>, request: &Arc<PathRequest<P>>) -> CacheLookup<P> {
        let fingerprint = self.fingerprint(request.query());

        let lookup = match self.entries.entry(fingerprint) {
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::InProgress {
                    waiters: Vec::new(),
                    retain: true,
                });
                self.misses.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Miss(Reservation {
                    cache: Arc::clone(self),
                    fingerprint,
                    settled: false,
                })
            }
            Entry::Occupied(mut occupied) => match occupied.get_mut() {
                CacheEntry::InProgress { waiters, .. } => {
                    waiters.push(Arc::clone(request));
                    self.attached.fetch_add(1, Ordering::Relaxed);
                    CacheLookup::HitInProgress
                }
                CacheEntry::Completed(outcome) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    CacheLookup::HitCompleted(outcome.clone())
                }
            },
        };

        if matches!(lookup, CacheLookup::HitCompleted(_)) {
            self.touch(&fingerprint);
        }
        lookup
    }

    /// Completed outcome for a fingerprint, if retained
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<PathOutcome<P>> {
        let outcome = match self.entries.get(fingerprint)?.value() {
            CacheEntry::Completed(outcome) => outcome.clone(),
            CacheEntry::InProgress { .. } => return None,
        };
        self.touch(fingerprint);
        Some(outcome)
    }

    /// Drop a retained result, or keep an in-flight one from being retained.
    /// Returns true when something was affected.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        self.lru_order.lock().retain(|fp| fp != fingerprint);

        match self.entries.entry(*fingerprint) {
            Entry::Vacant(_) => false,
            Entry::Occupied(mut occupied) => {
                let in_progress = match occupied.get_mut() {
                    CacheEntry::InProgress { retain, .. } => {
                        *retain = false;
                        true
                    }
                    CacheEntry::Completed(_) => false,
                };
                if !in_progress {
                    occupied.remove();
                }
                true
            }
        }
    }

    /// Forget every retained result, e.g. after the node network changed.
    /// Searches already running still complete their waiters.
    pub fn clear(&self) {
        self.lru_order.lock().clear();
        self.entries.retain(|_, entry| match entry {
            CacheEntry::Completed(_) => false,
            CacheEntry::InProgress { retain, .. } => {
                *retain = false;
                true
            }
        });
    }

    /// Entries currently held, in-progress included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            attached: self.attached.load(Ordering::Relaxed),
            retained: self.lru_order.lock().len(),
        }
    }

    /// Move to most recently used
    fn touch(&self, fingerprint: &Fingerprint) {
        let mut order = self.lru_order.lock();
        if let Some(pos) = order.iter().position(|fp| fp == fingerprint) {
            if let Some(fp) = order.remove(pos) {
                order.push_back(fp);
            }
        }
    }

    /// Take the waiters of an in-progress entry and either retain `outcome` or drop the entry
    fn settle(&self, fingerprint: Fingerprint, outcome: Option<&PathOutcome<P>>) -> Vec<Arc<PathRequest<P>>> {
        let mut stored = false;
        let waiters = match self.entries.entry(fingerprint) {
            Entry::Vacant(_) => return Vec::new(),
            Entry::Occupied(mut occupied) => {
                let (waiters, retain) = match occupied.get_mut() {
                    CacheEntry::InProgress { waiters, retain } => (std::mem::take(waiters), *retain),
                    CacheEntry::Completed(_) => return Vec::new(),
                };
                match outcome {
                    Some(outcome) if retain && self.capacity > 0 && outcome.is_cacheable() => {
                        occupied.insert(CacheEntry::Completed(outcome.clone()));
                        stored = true;
                    }
                    _ => {
                        occupied.remove();
                    }
                }
                waiters
            }
        };

        if stored {
            self.record_completed(fingerprint);
        }
        waiters
    }

    /// Track a newly completed fingerprint and evict beyond capacity
    fn record_completed(&self, fingerprint: Fingerprint) {
        let victims: Vec<Fingerprint> = {
            let mut order = self.lru_order.lock();
            order.retain(|fp| *fp != fingerprint);
            order.push_back(fingerprint);
            let excess = order.len().saturating_sub(self.capacity);
            order.drain(..excess).collect()
        };

        for victim in victims {
            self.entries
                .remove_if(&victim, |_, entry| matches!(entry, CacheEntry::Completed(_)));
        }
    }
}

/// Exclusive right to solve one fingerprint.
///
/// Must end in [`publish`](Self::publish), [`release_if_unwatched`](Self::release_if_unwatched)
/// or [`cancel_waiters`](Self::cancel_waiters). Dropping it unsettled fails every waiter
/// with a worker fault so nothing waits forever.
pub struct Reservation<P: Send + Sync + 'static> {
    cache: Arc<PathCache<P>>,
    fingerprint: Fingerprint,
    settled: bool,
}

impl<P: Send + Sync + 'static> Reservation<P> {
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Store the outcome (unless it is a fault or retention was invalidated) and complete
    /// every attached waiter with it. Returns the number of waiters completed.
    pub fn publish(mut self, outcome: PathOutcome<P>) -> usize {
        self.settled = true;
        let waiters = self.cache.settle(self.fingerprint, Some(&outcome));
        for waiter in &waiters {
            waiter.complete(outcome.clone());
        }
        waiters.len()
    }

    /// Give the fingerprint back when nobody attached; hands the reservation back otherwise
    pub fn release_if_unwatched(mut self) -> Result<(), Self> {
        let released = self
            .cache
            .entries
            .remove_if(&self.fingerprint, |_, entry| {
                matches!(entry, CacheEntry::InProgress { waiters, .. } if waiters.is_empty())
            })
            .is_some();

        if released {
            self.settled = true;
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Drop the entry and cancel every attached waiter. Returns the number cancelled.
    pub fn cancel_waiters(mut self) -> usize {
        self.settled = true;
        let waiters = self.cache.settle(self.fingerprint, None);
        waiters.iter().filter(|waiter| waiter.cancel()).count()
    }
}

impl<P: Send + Sync + 'static> Drop for Reservation<P> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let reason = FailureReason::WorkerFault("search abandoned before publishing".to_string());
        for waiter in self.cache.settle(self.fingerprint, None) {
            waiter.complete(PathOutcome::Failed(reason.clone()));
        }
    }
}
