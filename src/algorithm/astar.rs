use std::sync::Arc;

use crate::error::HeapError;
use crate::graph::{DefinitionNodeGrid, NodeIndex, SearchNode, ThreadNodeGrid};
use crate::storage::RefMaxHeap;

use super::{PathQuery, PathfindAlgorithm};

/// Solved point-to-point path
#[derive(Debug, Clone, PartialEq)]
pub struct NodePath {
    /// Nodes from start to end, both included
    pub nodes: Vec<NodeIndex>,
    /// World positions of `nodes`
    pub positions: Vec<(f32, f32)>,
    /// Total movement cost
    pub length: f32,
}

impl NodePath {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A* over a [`ThreadNodeGrid`] with an octile heuristic
#[derive(Debug, Clone, Copy, Default)]
pub struct AStarAlgorithm;

impl AStarAlgorithm {
    pub fn new() -> Self {
        Self
    }
}

impl PathfindAlgorithm<ThreadNodeGrid> for AStarAlgorithm {
    type Path = NodePath;

    fn find_path(
        &self,
        network: &mut ThreadNodeGrid,
        open: &mut RefMaxHeap,
        query: &PathQuery,
    ) -> Result<Option<NodePath>, HeapError> {
        let definition = Arc::clone(network.definition());
        let (start, goal) = (query.start, query.end);
        let (size, category) = (query.agent_size, query.collision_category);

        if !definition.is_walkable(start, size, category) || !definition.is_walkable(goal, size, category) {
            return Ok(None);
        }

        let generation = network.begin_search();
        let nodes = network.nodes_mut();
        open.clear(nodes);

        ThreadNodeGrid::touch(nodes, start, generation);
        nodes[start].g = 0.0;
        nodes[start].h = definition.octile_distance(start, goal);
        open.add(nodes, start);

        let mut neighbors = Vec::with_capacity(8);

        while !open.is_empty() {
            let current = open.remove_first(nodes)?;
            if current == goal {
                return Ok(Some(reconstruct_path(&definition, nodes, goal)));
            }

            nodes[current].closed = true;
            let current_g = nodes[current].g;

            neighbors.clear();
            definition.neighbors(current, size, category, &mut neighbors);

            for &(neighbor, step) in &neighbors {
                ThreadNodeGrid::touch(nodes, neighbor, generation);
                if nodes[neighbor].closed {
                    continue;
                }

                let tentative_g = current_g + step * definition.cost_modifier(neighbor);
                if tentative_g >= nodes[neighbor].g {
                    continue;
                }

                let node = &mut nodes[neighbor];
                node.g = tentative_g;
                node.h = definition.octile_distance(neighbor, goal);
                node.parent = Some(current);

                if open.contains(nodes, neighbor) {
                    open.update_priority(nodes, neighbor)?;
                } else {
                    open.add(nodes, neighbor);
                }
            }
        }

        Ok(None)
    }
}

/// Walk parent links back from the goal
fn reconstruct_path(definition: &DefinitionNodeGrid, nodes: &[SearchNode], goal: NodeIndex) -> NodePath {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(parent) = nodes[current].parent {
        path.push(parent);
        current = parent;
    }
    path.reverse();

    let positions = path.iter().map(|&index| definition.world_position(index)).collect();
    NodePath {
        nodes: path,
        positions,
        length: nodes[goal].g,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CollisionCategory, DefinitionNodeNetwork};

    fn grid(width: i32, height: i32, blocked: &[(i32, i32)]) -> Arc<DefinitionNodeGrid> {
        let mut grid = DefinitionNodeGrid::new(width, height).unwrap();
        for &(x, y) in blocked {
            grid.set_collision(x, y, CollisionCategory::CAT1).unwrap();
        }
        Arc::new(grid)
    }

    fn solve(
        definition: &Arc<DefinitionNodeGrid>,
        start: (i32, i32),
        end: (i32, i32),
    ) -> Option<NodePath> {
        let mut network = DefinitionNodeGrid::create_thread_network(definition);
        let mut open = RefMaxHeap::new();
        let query = PathQuery::new(
            definition.index_of(start.0, start.1).unwrap(),
            definition.index_of(end.0, end.1).unwrap(),
        )
        .with_collision_category(CollisionCategory::CAT1);
        AStarAlgorithm.find_path(&mut network, &mut open, &query).unwrap()
    }

    fn assert_length(path: Option<NodePath>, expected: f32) {
        let path = path.expect("expected a path");
        assert!(
            (path.length - expected).abs() < 0.01,
            "path length {} != {}",
            path.length,
            expected
        );
    }

    #[test]
    fn test_open_grid_straight() {
        assert_length(solve(&grid(11, 11, &[]), (0, 0), (10, 0)), 10.0);
    }

    #[test]
    fn test_open_grid_diagonal() {
        assert_length(solve(&grid(7, 7, &[]), (0, 0), (6, 6)), 8.49);
    }

    #[test]
    fn test_open_grid_mixed() {
        assert_length(solve(&grid(7, 7, &[]), (0, 0), (6, 3)), 7.24);
        assert_length(solve(&grid(4, 3, &[]), (3, 0), (0, 2)), 3.83);
    }

    #[test]
    fn test_single_blocked_node() {
        assert_length(solve(&grid(11, 11, &[(5, 0)]), (0, 0), (10, 0)), 10.83);
    }

    #[test]
    fn test_two_blocked_nodes() {
        assert_length(solve(&grid(11, 11, &[(5, 0), (5, 1)]), (0, 0), (10, 0)), 11.66);
    }

    #[test]
    fn test_maze_obstacles() {
        let blocked = [(5, 0), (5, 1), (5, 2), (2, 2), (3, 2), (3, 1)];
        let definition = grid(11, 11, &blocked);
        assert_length(solve(&definition, (0, 0), (10, 0)), 13.07);
        assert_length(solve(&definition, (0, 0), (7, 2)), 9.24);
    }

    #[test]
    fn test_blocked_column_no_path() {
        let definition = grid(3, 3, &[(1, 0), (1, 1), (1, 2)]);
        assert!(solve(&definition, (0, 0), (2, 2)).is_none());
        assert!(solve(&definition, (2, 2), (0, 0)).is_none());
    }

    #[test]
    fn test_path_endpoints_and_positions() {
        let definition = grid(3, 3, &[]);
        let path = solve(&definition, (2, 2), (0, 0)).unwrap();
        assert_eq!(path.nodes.first(), Some(&definition.index_of(2, 2).unwrap()));
        assert_eq!(path.nodes.last(), Some(&0));
        assert_eq!(path.positions.last(), Some(&(0.0, 0.0)));
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_start_equals_end() {
        let path = solve(&grid(3, 3, &[]), (1, 1), (1, 1)).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path.length, 0.0);
    }

    #[test]
    fn test_movement_penalty_detour() {
        let mut definition = DefinitionNodeGrid::new(3, 3).unwrap();
        definition.set_movement_cost(1, 0, 10.0).unwrap();
        let definition = Arc::new(definition);
        let path = solve(&definition, (0, 0), (2, 0)).unwrap();
        assert!(!path.nodes.contains(&definition.index_of(1, 0).unwrap()));
        assert!((path.length - 2.0 * std::f32::consts::SQRT_2).abs() < 0.01);
    }

    #[test]
    fn test_network_reused_across_searches() {
        let definition = grid(11, 11, &[(5, 0)]);
        let mut network = DefinitionNodeGrid::create_thread_network(&definition);
        let mut open = RefMaxHeap::new();
        let query = PathQuery::new(0, 10).with_collision_category(CollisionCategory::CAT1);
        for _ in 0..3 {
            let path = AStarAlgorithm.find_path(&mut network, &mut open, &query).unwrap().unwrap();
            assert!((path.length - 10.83).abs() < 0.01);
        }
    }
}
