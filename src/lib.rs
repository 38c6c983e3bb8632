/// Per-search chatter, compiled in only with the `debug_logs` feature
macro_rules! debug_log {
    ($($arg:tt)*) => {
        if cfg!(feature = "debug_logs") {
            tracing::trace!($($arg)*);
        }
    };
}

pub mod config;  // Centralized configuration constants
pub mod error;
pub mod storage;  // Open-list heap and result cache
pub mod graph;
pub mod algorithm;
pub mod engine;  // Request lifecycle, worker pool, facade

pub use algorithm::{AStarAlgorithm, FlowField, FlowFieldAlgorithm, NodePath, PathQuery, PathfindAlgorithm};
pub use config::{CachePolicy, EngineConfig};
pub use engine::{
    ChannelSyncContext, FailureReason, GridPathfinder, PathOutcome, PathRequest, PathfindEngine,
    PathfinderRegistry, RequestState, SynchronizationContext, ThreadSyncContext,
};
pub use error::{PathfindError, Result};
pub use graph::{CollisionCategory, DefinitionNodeGrid, NodeIndex};
