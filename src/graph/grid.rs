/// Grid node network
///
/// `DefinitionNodeGrid` is the authored, read-only description of a rectangular grid:
/// which collision categories every node blocks and how expensive entering it is.
/// `ThreadNodeGrid` is the per-worker clone: it shares the definition through an `Arc`
/// and owns the mutable search scores, so searches on different workers never touch
/// the same memory.
///
/// Connectivity is 8-directional. A diagonal step is only allowed when at least one of
/// the two flanking orthogonal nodes is walkable, so agents never squeeze between two
/// blocked corners.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::pathfinding;
use crate::error::{PathfindError, Result};
use crate::storage::HeapItem;

use super::{CollisionCategory, DefinitionNodeNetwork, NodeIndex, PathfindNodeNetwork};

/// Definition data of a single grid node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridNode {
    /// Categories this node blocks
    pub collision: CollisionCategory,
    /// Multiplier applied to the cost of entering this node (>= 1.0)
    pub movement_cost_modifier: f32,
}

impl Default for GridNode {
    fn default() -> Self {
        Self {
            collision: CollisionCategory::empty(),
            movement_cost_modifier: 1.0,
        }
    }
}

/// Read-only grid definition shared by all workers
#[derive(Debug, Clone)]
pub struct DefinitionNodeGrid {
    width: i32,
    height: i32,
    /// World size of one node
    node_size: (f32, f32),
    /// World position of node (0, 0)
    offset: (f32, f32),
    /// Row-major: index = y * width + x
    nodes: Vec<GridNode>,
}

const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (1, -1),
    (-1, 1),
    (1, 1),
];

impl DefinitionNodeGrid {
    /// Create an open grid with unit node size at the world origin
    pub fn new(width: i32, height: i32) -> Result<Self> {
        if width < 1 || height < 1 {
            return Err(PathfindError::Configuration(format!(
                "grid dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            node_size: (1.0, 1.0),
            offset: (0.0, 0.0),
            nodes: vec![GridNode::default(); (width * height) as usize],
        })
    }

    pub fn with_node_size(mut self, width: f32, height: f32) -> Result<Self> {
        if !(width > 0.0 && height > 0.0) {
            return Err(PathfindError::Configuration(format!(
                "node size must be positive, got {}x{}",
                width, height
            )));
        }
        self.node_size = (width, height);
        Ok(self)
    }

    pub fn with_offset(mut self, x: f32, y: f32) -> Self {
        self.offset = (x, y);
        self
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.height
    }

    #[inline]
    pub fn is_in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.width && y >= 0 && y < self.height
    }

    /// Grid coordinates to node index
    #[inline]
    pub fn index_of(&self, x: i32, y: i32) -> Option<NodeIndex> {
        if self.is_in_bounds(x, y) {
            Some((y * self.width + x) as NodeIndex)
        } else {
            None
        }
    }

    /// Node index to grid coordinates
    #[inline]
    pub fn coordinates(&self, index: NodeIndex) -> (i32, i32) {
        let index = index as i32;
        (index % self.width, index / self.width)
    }

    pub fn node(&self, index: NodeIndex) -> Option<&GridNode> {
        self.nodes.get(index)
    }

    /// World position of a node's centre
    pub fn world_position(&self, index: NodeIndex) -> (f32, f32) {
        let (x, y) = self.coordinates(index);
        (
            self.offset.0 + x as f32 * self.node_size.0,
            self.offset.1 + y as f32 * self.node_size.1,
        )
    }

    /// Mark the categories a node blocks (replaces previous categories)
    pub fn set_collision(&mut self, x: i32, y: i32, collision: CollisionCategory) -> Result<()> {
        let index = self.require(x, y)?;
        self.nodes[index].collision = collision;
        Ok(())
    }

    /// Set the movement penalty of a node; values below the minimum are clamped
    pub fn set_movement_cost(&mut self, x: i32, y: i32, modifier: f32) -> Result<()> {
        let index = self.require(x, y)?;
        let clamped = if modifier.is_finite() {
            modifier.max(pathfinding::MIN_COST_MODIFIER)
        } else {
            pathfinding::MIN_COST_MODIFIER
        };
        if clamped != modifier {
            tracing::warn!(
                x,
                y,
                modifier,
                "movement cost modifier clamped to {}",
                clamped
            );
        }
        self.nodes[index].movement_cost_modifier = clamped;
        Ok(())
    }

    fn require(&self, x: i32, y: i32) -> Result<NodeIndex> {
        self.index_of(x, y).ok_or(PathfindError::OutOfBounds {
            x: x as f32,
            y: y as f32,
        })
    }

    #[inline]
    fn is_open(&self, x: i32, y: i32, category: CollisionCategory) -> bool {
        match self.index_of(x, y) {
            Some(index) => !self.nodes[index].collision.intersects(category),
            None => false,
        }
    }

    /// True when an agent of `agent_size` nodes fits with its corner on (x, y)
    pub fn fits(&self, x: i32, y: i32, agent_size: u8, category: CollisionCategory) -> bool {
        let size = agent_size.max(1) as i32;
        (0..size).all(|dy| (0..size).all(|dx| self.is_open(x + dx, y + dy, category)))
    }

    /// Index-based variant of [`fits`](Self::fits)
    pub fn is_walkable(&self, index: NodeIndex, agent_size: u8, category: CollisionCategory) -> bool {
        if index >= self.nodes.len() {
            return false;
        }
        let (x, y) = self.coordinates(index);
        self.fits(x, y, agent_size, category)
    }

    /// Movement cost modifier of a node (1.0 for unknown indexes)
    #[inline]
    pub fn cost_modifier(&self, index: NodeIndex) -> f32 {
        self.nodes
            .get(index)
            .map(|node| node.movement_cost_modifier)
            .unwrap_or(1.0)
    }

    /// Collect walkable neighbors of `index` with their unmodified step cost.
    /// The caller clears `buf` before calling.
    pub fn neighbors(
        &self,
        index: NodeIndex,
        agent_size: u8,
        category: CollisionCategory,
        buf: &mut Vec<(NodeIndex, f32)>,
    ) {
        let (x, y) = self.coordinates(index);
        for (dx, dy) in NEIGHBOR_OFFSETS {
            let (nx, ny) = (x + dx, y + dy);
            if !self.fits(nx, ny, agent_size, category) {
                continue;
            }

            let step = if dx != 0 && dy != 0 {
                // Both flankers blocked: the agent would squeeze through a corner
                if !self.fits(x + dx, y, agent_size, category)
                    && !self.fits(x, y + dy, agent_size, category)
                {
                    continue;
                }
                pathfinding::DIAGONAL_COST
            } else {
                pathfinding::STRAIGHT_COST
            };

            if let Some(neighbor) = self.index_of(nx, ny) {
                buf.push((neighbor, step));
            }
        }
    }

    /// Octile distance, admissible because modifiers never drop below 1.0
    pub fn octile_distance(&self, a: NodeIndex, b: NodeIndex) -> f32 {
        let (ax, ay) = self.coordinates(a);
        let (bx, by) = self.coordinates(b);
        let dx = (ax - bx).abs() as f32;
        let dy = (ay - by).abs() as f32;
        let (min, max) = if dx < dy { (dx, dy) } else { (dy, dx) };
        pathfinding::DIAGONAL_COST * min + pathfinding::STRAIGHT_COST * (max - min)
    }
}

impl DefinitionNodeNetwork for DefinitionNodeGrid {
    type ThreadNetwork = ThreadNodeGrid;

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_index(&self, x: f32, y: f32) -> Option<NodeIndex> {
        let gx = ((x - self.offset.0) / self.node_size.0).round();
        let gy = ((y - self.offset.1) / self.node_size.1).round();
        if !gx.is_finite() || !gy.is_finite() {
            return None;
        }
        self.index_of(gx as i32, gy as i32)
    }

    fn create_thread_network(definition: &Arc<Self>) -> ThreadNodeGrid {
        ThreadNodeGrid::new(Arc::clone(definition))
    }
}

/// Per-node search scores owned by one worker
#[derive(Debug, Clone)]
pub struct SearchNode {
    /// Cost from the search origin
    pub g: f32,
    /// Heuristic estimate to the search target
    pub h: f32,
    pub parent: Option<NodeIndex>,
    pub closed: bool,
    generation: u32,
    heap_index: Option<usize>,
}

impl SearchNode {
    fn new() -> Self {
        Self {
            g: f32::INFINITY,
            h: 0.0,
            parent: None,
            closed: false,
            generation: 0,
            heap_index: None,
        }
    }

    #[inline]
    pub fn f(&self) -> f32 {
        self.g + self.h
    }

    /// True when the scores were written by the search with this generation
    #[inline]
    pub fn generation_matches(&self, generation: u32) -> bool {
        self.generation == generation
    }
}

impl HeapItem for SearchNode {
    fn heap_index(&self) -> Option<usize> {
        self.heap_index
    }

    fn set_heap_index(&mut self, slot: Option<usize>) {
        self.heap_index = slot;
    }

    /// Lowest f cost is the heap maximum; ties prefer the node closer to the target
    fn priority_cmp(&self, other: &Self) -> Ordering {
        other
            .f()
            .partial_cmp(&self.f())
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.h.partial_cmp(&self.h).unwrap_or(Ordering::Equal))
    }
}

/// Worker-exclusive clone of a [`DefinitionNodeGrid`]
#[derive(Debug)]
pub struct ThreadNodeGrid {
    definition: Arc<DefinitionNodeGrid>,
    nodes: Vec<SearchNode>,
    /// Bumped per search so stale scores are reset lazily
    generation: u32,
}

impl ThreadNodeGrid {
    pub fn new(definition: Arc<DefinitionNodeGrid>) -> Self {
        let nodes = vec![SearchNode::new(); definition.nodes.len()];
        Self {
            definition,
            nodes,
            generation: 0,
        }
    }

    pub fn definition(&self) -> &Arc<DefinitionNodeGrid> {
        &self.definition
    }

    /// Start a new search; scores from earlier searches become stale
    pub fn begin_search(&mut self) -> u32 {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            // Wrapped: stale nodes could alias the new generation
            for node in &mut self.nodes {
                node.generation = 0;
            }
            self.generation = 1;
        }
        self.generation
    }

    pub fn nodes(&self) -> &[SearchNode] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [SearchNode] {
        &mut self.nodes
    }

    /// Reset a node to unvisited if its scores belong to an earlier search
    #[inline]
    pub fn touch(nodes: &mut [SearchNode], index: NodeIndex, generation: u32) {
        let node = &mut nodes[index];
        if node.generation != generation {
            node.g = f32::INFINITY;
            node.h = 0.0;
            node.parent = None;
            node.closed = false;
            node.generation = generation;
        }
    }
}

impl PathfindNodeNetwork for ThreadNodeGrid {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
