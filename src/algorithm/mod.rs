// Pluggable search strategies run by the request processors

mod astar;
mod flow_field;

pub use astar::{AStarAlgorithm, NodePath};
pub use flow_field::{Direction, FlowField, FlowFieldAlgorithm};

use crate::error::HeapError;
use crate::graph::{CollisionCategory, NodeIndex};
use crate::storage::RefMaxHeap;

/// Traversal question asked of a node network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathQuery {
    pub start: NodeIndex,
    pub end: NodeIndex,
    /// Categories the agent collides with
    pub collision_category: CollisionCategory,
    /// Agent footprint in nodes (0 is treated as 1)
    pub agent_size: u8,
}

impl PathQuery {
    pub fn new(start: NodeIndex, end: NodeIndex) -> Self {
        Self {
            start,
            end,
            collision_category: CollisionCategory::empty(),
            agent_size: 1,
        }
    }

    pub fn with_collision_category(mut self, collision_category: CollisionCategory) -> Self {
        self.collision_category = collision_category;
        self
    }

    pub fn with_agent_size(mut self, agent_size: u8) -> Self {
        self.agent_size = agent_size;
        self
    }
}

/// Search strategy over a worker-owned node network `N`.
///
/// One instance is shared by every worker, so implementations keep all mutable search
/// state inside the network and the open list they are handed.
pub trait PathfindAlgorithm<N>: Send + Sync + 'static {
    /// Completed result, shared read-only with every waiter once published
    type Path: Send + Sync + 'static;

    /// `Ok(None)` means no path exists, which is a normal outcome.
    /// `Err` is only returned when the open list contract was broken.
    fn find_path(
        &self,
        network: &mut N,
        open: &mut RefMaxHeap,
        query: &PathQuery,
    ) -> Result<Option<Self::Path>, HeapError>;
}
