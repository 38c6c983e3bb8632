/// Centralized configuration for the pathfinding engine
///
/// Constants live in the `pathfinding` module; runtime knobs are carried by [`EngineConfig`],
/// which can be built in code or parsed from JSON.

use serde::{Deserialize, Serialize};

use crate::error::{PathfindError, Result};

/// Pathfinding configuration constants
pub mod pathfinding {
    /// Worker threads used when the config does not say otherwise
    pub const DEFAULT_WORKER_THREADS: usize = 1;

    /// Completed results retained by the result cache (LRU beyond this)
    pub const DEFAULT_CACHE_CAPACITY: usize = 256;

    /// Cost of an orthogonal step between two grid nodes
    pub const STRAIGHT_COST: f32 = 1.0;

    /// Cost of a diagonal step between two grid nodes
    pub const DIAGONAL_COST: f32 = std::f32::consts::SQRT_2;

    /// Movement cost modifiers below this would make the octile heuristic overestimate
    pub const MIN_COST_MODIFIER: f32 = 1.0;

    pub const DEFAULT_PATHFINDER_ID: &str = "default";
    pub const DEFAULT_THREAD_NAME_PREFIX: &str = "pathfind-worker";
}

/// Which request attributes make two requests interchangeable in the result cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Destination, agent size and collision category (flow fields, reverse searches)
    SingleSource,
    /// Single-source key plus the start node (A* and other point-to-point searches)
    #[default]
    PointToPoint,
}

/// Runtime configuration of a [`PathfindEngine`](crate::engine::PathfindEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Identifier used by the pathfinder registry
    pub pathfinder_id: String,
    /// Number of worker threads, each owning one node network clone
    pub worker_threads: usize,
    /// Completed results kept by the cache; 0 keeps none but still de-duplicates in-flight work
    pub cache_capacity: usize,
    pub cache_policy: CachePolicy,
    pub thread_name_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pathfinder_id: pathfinding::DEFAULT_PATHFINDER_ID.to_string(),
            worker_threads: pathfinding::DEFAULT_WORKER_THREADS,
            cache_capacity: pathfinding::DEFAULT_CACHE_CAPACITY,
            cache_policy: CachePolicy::default(),
            thread_name_prefix: pathfinding::DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PathfindError::Configuration(format!("malformed engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    pub fn with_cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    pub fn with_pathfinder_id(mut self, id: impl Into<String>) -> Self {
        self.pathfinder_id = id.into();
        self
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads < 1 {
            return Err(PathfindError::Configuration(
                "there is a minimum of 1 worker thread".to_string(),
            ));
        }
        if self.pathfinder_id.trim().is_empty() {
            return Err(PathfindError::Configuration(
                "pathfinder id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
