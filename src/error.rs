// Error types shared by the engine, the worker pool and the open-list heap

use crate::graph::NodeIndex;

/// Convenience alias used across the crate
pub type Result<T, E = PathfindError> = std::result::Result<T, E>;

/// Errors surfaced to callers of the engine API.
///
/// Per-request failures (no path, worker faults) are NOT errors; they travel through the
/// request's outcome instead. These variants cover construction, lifecycle and lookup problems.
#[derive(Debug, thiserror::Error)]
pub enum PathfindError {
    /// Invalid construction parameters (zero workers, empty id, unparsable config)
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The engine or worker pool was disposed and cannot accept work
    #[error("pathfinder has been disposed")]
    Disposed,

    /// World-space coordinate does not map onto the node network
    #[error("position ({x}, {y}) is outside the node network")]
    OutOfBounds { x: f32, y: f32 },

    /// Node index does not exist in the node network
    #[error("node index {0} is outside the node network")]
    InvalidNode(NodeIndex),

    /// A request can only be submitted once, from the `Created` state
    #[error("path request {0} was already submitted")]
    AlreadySubmitted(ulid::Ulid),

    /// Registry already holds a pathfinder with this id
    #[error("a pathfinder with id '{0}' is already registered")]
    DuplicatePathfinder(String),

    /// Registry lookup without an id while several pathfinders are registered
    #[error("multiple pathfinders are registered, a unique id has to be supplied")]
    AmbiguousPathfinder,

    /// Broken open-list invariant inside a search
    #[error(transparent)]
    Structure(#[from] HeapError),

    /// The OS refused to spawn a worker or delivery thread
    #[error("failed to spawn thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

/// Structural violations of the [`RefMaxHeap`](crate::storage::RefMaxHeap) contract.
///
/// These indicate a programmer error in the calling search algorithm, never a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    #[error("cannot remove from an empty heap")]
    EmptyStructure,

    #[error("item {0} is not held by the heap")]
    NotInHeap(usize),
}

impl PathfindError {
    /// Configuration problems are fatal and never worth retrying
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Disposed)
    }
}
