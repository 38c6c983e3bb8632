// Node networks: the shared read-only definition and the per-thread mutable clones

mod grid;

use std::sync::Arc;

use bitflags::bitflags;

pub use grid::{DefinitionNodeGrid, GridNode, SearchNode, ThreadNodeGrid};

/// Index of a node inside a node network
pub type NodeIndex = usize;

bitflags! {
    /// Collision categories a node blocks, or an agent collides with.
    ///
    /// A node is walkable for a request when the two sets do not intersect. An agent with
    /// an empty category therefore collides with nothing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CollisionCategory: u32 {
        const CAT1 = 1 << 0;
        const CAT2 = 1 << 1;
        const CAT3 = 1 << 2;
        const CAT4 = 1 << 3;
        const CAT5 = 1 << 4;
        const CAT6 = 1 << 5;
        const CAT7 = 1 << 6;
        const CAT8 = 1 << 7;
    }
}

/// Read-only graph shared by every worker; only ever mutated before workers start
pub trait DefinitionNodeNetwork: Send + Sync + 'static {
    /// Worker-exclusive mutable copy handed to each request processor
    type ThreadNetwork: PathfindNodeNetwork;

    fn node_count(&self) -> usize;

    /// Map a world-space coordinate onto a node
    fn node_index(&self, x: f32, y: f32) -> Option<NodeIndex>;

    /// Build one independent per-thread network backed by this definition
    fn create_thread_network(definition: &Arc<Self>) -> Self::ThreadNetwork
    where
        Self: Sized;
}

/// Mutable search state owned by exactly one worker thread
pub trait PathfindNodeNetwork: Send + 'static {
    fn node_count(&self) -> usize;
}
