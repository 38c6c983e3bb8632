/// Flow field pathfinding for many agents sharing one destination
///
/// Instead of one path per agent, a single reverse Dijkstra pass from the destination
/// computes the cost of every node to the destination plus the next hop toward it.
/// Every agent heading to the same point can then follow the field, which is why this
/// strategy pairs with the single-source request comparer: the start node is irrelevant
/// to the result and requests only differ by destination and traversal constraints.
///
/// Time complexity:
/// - Build field: O(n log n) where n = number of nodes
/// - Query direction / next hop: O(1)

use std::sync::Arc;

use crate::error::HeapError;
use crate::graph::{NodeIndex, ThreadNodeGrid};
use crate::storage::RefMaxHeap;

use super::{PathQuery, PathfindAlgorithm};

/// Direction vector (normalized)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Direction {
    pub x: f32,
    pub y: f32,
}

impl Direction {
    pub const ZERO: Direction = Direction { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        let len = (x * x + y * y).sqrt();
        if len > 0.0001 {
            Self { x: x / len, y: y / len }
        } else {
            Self::ZERO
        }
    }

    /// Check if direction is zero (no valid path)
    pub fn is_zero(&self) -> bool {
        self.x.abs() < 0.0001 && self.y.abs() < 0.0001
    }
}

/// Costs and next hops toward one destination
#[derive(Debug, Clone)]
pub struct FlowField {
    target: NodeIndex,
    width: i32,
    /// Cost from each node to the target, infinite when unreachable
    costs: Vec<f32>,
    /// Next node toward the target, `None` for the target and unreachable nodes
    next: Vec<Option<NodeIndex>>,
}

impl FlowField {
    pub fn target(&self) -> NodeIndex {
        self.target
    }

    pub fn cost(&self, index: NodeIndex) -> Option<f32> {
        self.costs.get(index).copied().filter(|cost| cost.is_finite())
    }

    pub fn is_reachable(&self, index: NodeIndex) -> bool {
        self.cost(index).is_some()
    }

    pub fn next_node(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.next.get(index).copied().flatten()
    }

    /// Grid-space direction toward the next hop
    pub fn direction(&self, index: NodeIndex) -> Option<Direction> {
        let next = self.next_node(index)?;
        let (x, y) = self.coordinates(index);
        let (nx, ny) = self.coordinates(next);
        Some(Direction::new((nx - x) as f32, (ny - y) as f32))
    }

    /// Follow next hops from `start` to the target
    pub fn path_from(&self, start: NodeIndex) -> Option<Vec<NodeIndex>> {
        if !self.is_reachable(start) {
            return None;
        }
        let mut path = vec![start];
        let mut current = start;
        while let Some(next) = self.next_node(current) {
            path.push(next);
            current = next;
        }
        Some(path)
    }

    /// Number of nodes that can reach the target
    pub fn reachable_count(&self) -> usize {
        self.costs.iter().filter(|cost| cost.is_finite()).count()
    }

    #[inline]
    fn coordinates(&self, index: NodeIndex) -> (i32, i32) {
        let index = index as i32;
        (index % self.width, index / self.width)
    }
}

/// Reverse Dijkstra over a [`ThreadNodeGrid`] producing a [`FlowField`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowFieldAlgorithm;

impl FlowFieldAlgorithm {
    pub fn new() -> Self {
        Self
    }
}

impl PathfindAlgorithm<ThreadNodeGrid> for FlowFieldAlgorithm {
    type Path = FlowField;

    fn find_path(
        &self,
        network: &mut ThreadNodeGrid,
        open: &mut RefMaxHeap,
        query: &PathQuery,
    ) -> Result<Option<FlowField>, HeapError> {
        let definition = Arc::clone(network.definition());
        let target = query.end;
        let (size, category) = (query.agent_size, query.collision_category);

        // Goal is impassable, no field can lead to it
        if !definition.is_walkable(target, size, category) {
            return Ok(None);
        }

        let generation = network.begin_search();
        let nodes = network.nodes_mut();
        open.clear(nodes);

        ThreadNodeGrid::touch(nodes, target, generation);
        nodes[target].g = 0.0;
        open.add(nodes, target);

        let mut neighbors = Vec::with_capacity(8);

        while !open.is_empty() {
            let current = open.remove_first(nodes)?;
            nodes[current].closed = true;
            let current_g = nodes[current].g;
            // Stepping from a neighbor onto `current` pays current's modifier
            let enter_cost = definition.cost_modifier(current);

            neighbors.clear();
            definition.neighbors(current, size, category, &mut neighbors);

            for &(neighbor, step) in &neighbors {
                ThreadNodeGrid::touch(nodes, neighbor, generation);
                if nodes[neighbor].closed {
                    continue;
                }

                let tentative_g = current_g + step * enter_cost;
                if tentative_g >= nodes[neighbor].g {
                    continue;
                }

                nodes[neighbor].g = tentative_g;
                nodes[neighbor].parent = Some(current);

                if open.contains(nodes, neighbor) {
                    open.update_priority(nodes, neighbor)?;
                } else {
                    open.add(nodes, neighbor);
                }
            }
        }

        let mut costs = Vec::with_capacity(nodes.len());
        let mut next = Vec::with_capacity(nodes.len());
        for node in nodes.iter() {
            if node.generation_matches(generation) {
                costs.push(node.g);
                next.push(node.parent);
            } else {
                costs.push(f32::INFINITY);
                next.push(None);
            }
        }

        Ok(Some(FlowField {
            target,
            width: definition.width(),
            costs,
            next,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::AStarAlgorithm;
    use crate::graph::{CollisionCategory, DefinitionNodeGrid, DefinitionNodeNetwork};

    fn grid(width: i32, height: i32, blocked: &[(i32, i32)]) -> Arc<DefinitionNodeGrid> {
        let mut grid = DefinitionNodeGrid::new(width, height).unwrap();
        for &(x, y) in blocked {
            grid.set_collision(x, y, CollisionCategory::CAT1).unwrap();
        }
        Arc::new(grid)
    }

    fn build(definition: &Arc<DefinitionNodeGrid>, target: (i32, i32)) -> Option<FlowField> {
        let mut network = DefinitionNodeGrid::create_thread_network(definition);
        let mut open = RefMaxHeap::new();
        let end = definition.index_of(target.0, target.1).unwrap();
        let query = PathQuery::new(0, end).with_collision_category(CollisionCategory::CAT1);
        FlowFieldAlgorithm.find_path(&mut network, &mut open, &query).unwrap()
    }

    #[test]
    fn test_direction_normalization() {
        let dir = Direction::new(3.0, 4.0);
        let len = (dir.x * dir.x + dir.y * dir.y).sqrt();
        assert!((len - 1.0).abs() < 0.001);
        assert!(Direction::new(0.0, 0.0).is_zero());
    }

    #[test]
    fn test_costs_match_astar_lengths() {
        let definition = grid(11, 11, &[(5, 0), (5, 1)]);
        let field = build(&definition, (10, 0)).unwrap();
        let start = definition.index_of(0, 0).unwrap();
        assert!((field.cost(start).unwrap() - 11.66).abs() < 0.01);

        let mut network = DefinitionNodeGrid::create_thread_network(&definition);
        let mut open = RefMaxHeap::new();
        for y in 0..11 {
            for x in 0..11 {
                let Some(from) = definition.index_of(x, y) else { continue };
                if !definition.is_walkable(from, 1, CollisionCategory::CAT1) {
                    continue;
                }
                let query = PathQuery::new(from, field.target())
                    .with_collision_category(CollisionCategory::CAT1);
                let path = AStarAlgorithm.find_path(&mut network, &mut open, &query).unwrap().unwrap();
                assert!((field.cost(from).unwrap() - path.length).abs() < 0.001);
            }
        }
    }

    #[test]
    fn test_path_follows_next_hops() {
        let definition = grid(7, 7, &[]);
        let field = build(&definition, (6, 6)).unwrap();
        let path = field.path_from(0).unwrap();
        assert_eq!(path.len(), 7);
        assert_eq!(path.last(), Some(&field.target()));
        let dir = field.direction(0).unwrap();
        assert!((dir.x - dir.y).abs() < 0.001 && dir.x > 0.0);
        assert_eq!(field.direction(field.target()), None);
    }

    #[test]
    fn test_unreachable_side() {
        let definition = grid(3, 3, &[(1, 0), (1, 1), (1, 2)]);
        let field = build(&definition, (2, 2)).unwrap();
        assert!(!field.is_reachable(definition.index_of(0, 0).unwrap()));
        assert!(field.path_from(0).is_none());
        assert_eq!(field.reachable_count(), 3);
    }

    #[test]
    fn test_blocked_target_fails() {
        let definition = grid(3, 3, &[(2, 2)]);
        assert!(build(&definition, (2, 2)).is_none());
    }
}
