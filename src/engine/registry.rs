// Registry of live pathfinders, looked up by id

use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{PathfindError, Result};

/// What the registry needs from a pathfinder
pub trait RegisteredPathfinder: Send + Sync + 'static {
    fn pathfinder_id(&self) -> &str;

    /// Called once with the pathfinder id when it is disposed
    fn on_disposed(&self, listener: Box<dyn FnOnce(&str) + Send + 'static>);
}

/// Explicitly owned id -> pathfinder map.
///
/// Disposed pathfinders remove themselves. Call [`clear`](Self::clear) when the owning
/// session or scene is torn down.
pub struct PathfinderRegistry<E: RegisteredPathfinder + ?Sized> {
    entries: Arc<DashMap<String, Arc<E>>>,
}

impl<E: RegisteredPathfinder + ?Sized> PathfinderRegistry<E> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn register(&self, pathfinder: Arc<E>) -> Result<()> {
        let id = pathfinder.pathfinder_id().to_string();
        match self.entries.entry(id.clone()) {
            Entry::Occupied(_) => return Err(PathfindError::DuplicatePathfinder(id)),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&pathfinder));
            }
        }

        // Entry guard is released; the listener may run right away if already disposed
        let entries = Arc::downgrade(&self.entries);
        let registered: Weak<E> = Arc::downgrade(&pathfinder);
        pathfinder.on_disposed(Box::new(move |id: &str| {
            let Some(entries) = entries.upgrade() else {
                return;
            };
            let removed = entries.remove_if(id, |_, current| {
                registered
                    .upgrade()
                    .is_some_and(|registered| Arc::ptr_eq(&registered, current))
            });
            if removed.is_some() {
                debug!(id, "Removed disposed pathfinder from registry");
            }
        }));

        debug!(id = %id, "Registered pathfinder");
        Ok(())
    }

    /// Look up by id. Without an id the only registered pathfinder is returned, and
    /// several registered pathfinders are an error.
    pub fn get(&self, id: Option<&str>) -> Result<Option<Arc<E>>> {
        match id {
            Some(id) => Ok(self.entries.get(id).map(|entry| Arc::clone(entry.value()))),
            None => {
                if self.entries.len() > 1 {
                    return Err(PathfindError::AmbiguousPathfinder);
                }
                Ok(self.entries.iter().next().map(|entry| Arc::clone(entry.value())))
            }
        }
    }

    pub fn remove(&self, id: &str) -> Option<Arc<E>> {
        self.entries.remove(id).map(|(_, pathfinder)| pathfinder)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Drops every registered pathfinder outside the map locks, since the last reference
    /// disposing a pathfinder calls back into the registry
    pub fn clear(&self) {
        for id in self.ids() {
            drop(self.remove(&id));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<E: RegisteredPathfinder + ?Sized> Default for PathfinderRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: RegisteredPathfinder + ?Sized> Clone for PathfinderRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}
