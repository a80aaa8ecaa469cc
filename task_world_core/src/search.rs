//! Shortest-path search over the implicit 4-connected grid graph.
//!
//! Nodes are the traversable cells of a [`GridWorld`] and every orthogonal
//! step costs 1. Both engines use the Manhattan heuristic, which is admissible
//! and consistent for this graph, so both return optimal routes and always
//! agree on route length.
//!
//! A route is the full cell sequence from `start` to `goal`, both included.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{Position, environment::GridWorld, map::Grid};

/// Orthogonal moves in expansion order: up, down, left, right.
const DIRECTIONS: [(isize, isize); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// Returns manhattan distance between two positions
pub fn manhattan_distance(a: Position, b: Position) -> usize {
    a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
}

/// In-bounds, non-barrier orthogonal neighbors of `position`, in the fixed
/// order up, down, left, right.
pub fn neighbors(world: &GridWorld, position: Position) -> Vec<Position> {
    DIRECTIONS
        .iter()
        .filter_map(|(dx, dy)| position.offset(*dx, *dy))
        .filter(|next| world.is_traversable(*next))
        .collect()
}

fn assert_in_bounds(world: &GridWorld, position: Position, role: &str) {
    assert!(
        world.is_within_bounds(position.x, position.y),
        "search {role} {position} is outside the {}x{} grid",
        world.columns(),
        world.rows()
    );
}

/// Which search engine the agent plans with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SearchAlgorithm {
    /// Best-first search with a priority queue and memoized costs.
    AStar,
    /// Iterative-deepening depth-first search under an f-cost bound.
    #[default]
    IdaStar,
}

impl SearchAlgorithm {
    pub const ALL: [SearchAlgorithm; 2] = [SearchAlgorithm::AStar, SearchAlgorithm::IdaStar];

    /// Finds a shortest route from `start` to `goal`.
    ///
    /// Returns `None` when the goal cannot be reached.
    ///
    /// # Panics
    ///
    /// Panics if `start` or `goal` lies outside the world.
    pub fn find_path(
        &self,
        world: &GridWorld,
        start: Position,
        goal: Position,
    ) -> Option<Vec<Position>> {
        match self {
            SearchAlgorithm::AStar => a_star_path(world, start, goal),
            SearchAlgorithm::IdaStar => ida_star_path(world, start, goal),
        }
    }
}

impl fmt::Display for SearchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchAlgorithm::AStar => f.write_str("A*"),
            SearchAlgorithm::IdaStar => f.write_str("IDA*"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown search algorithm '{0}', expected 'astar' or 'idastar'")]
pub struct ParseAlgorithmError(String);

impl FromStr for SearchAlgorithm {
    type Err = ParseAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "astar" | "a*" | "a-star" => Ok(SearchAlgorithm::AStar),
            "idastar" | "ida*" | "ida-star" => Ok(SearchAlgorithm::IdaStar),
            _ => Err(ParseAlgorithmError(s.to_string())),
        }
    }
}

/// A* pathfinding.
///
/// Frontier entries are ordered by f-cost, then by insertion order, so equal-f
/// entries come out first-in first-out. A cell is finalized the first time it
/// is popped; stale heap entries for it are skipped afterwards.
pub fn a_star_path(world: &GridWorld, start: Position, goal: Position) -> Option<Vec<Position>> {
    #[derive(Clone, Copy, Eq, PartialEq)]
    struct FrontierEntry {
        f: usize,
        sequence: usize,
        position: Position,
    }

    impl Ord for FrontierEntry {
        fn cmp(&self, other: &Self) -> Ordering {
            // Reversed for min-heap behavior
            other
                .f
                .cmp(&self.f)
                .then_with(|| other.sequence.cmp(&self.sequence))
        }
    }

    impl PartialOrd for FrontierEntry {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    assert_in_bounds(world, start, "start");
    assert_in_bounds(world, goal, "goal");

    let mut frontier = BinaryHeap::new();
    let mut came_from: HashMap<Position, Position> = HashMap::new();
    let mut cost_so_far: HashMap<Position, usize> = HashMap::new();
    let mut closed: HashSet<Position> = HashSet::new();
    let mut sequence = 0;

    frontier.push(FrontierEntry {
        f: manhattan_distance(start, goal),
        sequence,
        position: start,
    });
    cost_so_far.insert(start, 0);

    while let Some(FrontierEntry {
        position: current, ..
    }) = frontier.pop()
    {
        if current == goal {
            trace!(%start, %goal, expanded = closed.len(), "A* reached goal");
            return reconstruct_path(&came_from, start, goal);
        }
        if !closed.insert(current) {
            continue;
        }

        let new_cost = cost_so_far[&current] + 1;
        for neighbor in neighbors(world, current) {
            if closed.contains(&neighbor) {
                continue;
            }
            if cost_so_far
                .get(&neighbor)
                .is_none_or(|known| new_cost < *known)
            {
                cost_so_far.insert(neighbor, new_cost);
                came_from.insert(neighbor, current);
                sequence += 1;
                frontier.push(FrontierEntry {
                    f: new_cost + manhattan_distance(neighbor, goal),
                    sequence,
                    position: neighbor,
                });
            }
        }
    }

    trace!(%start, %goal, expanded = closed.len(), "A* frontier exhausted");
    None
}

fn reconstruct_path(
    came_from: &HashMap<Position, Position>,
    start: Position,
    goal: Position,
) -> Option<Vec<Position>> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        current = *came_from.get(&current)?;
        path.push(current);
    }
    path.reverse();
    Some(path)
}

/// Flood fill from `start`; true if `goal` is reachable through traversable cells.
fn is_connected(world: &GridWorld, start: Position, goal: Position) -> bool {
    let mut visited: Grid<bool> = Grid::new(world.columns(), world.rows());
    let mut stack = Vec::new();
    if visited.set(start.x, start.y, true).is_ok() {
        stack.push(start);
    }
    while let Some(current) = stack.pop() {
        if current == goal {
            return true;
        }
        for next in neighbors(world, current) {
            if visited.get(next.x, next.y) == Some(&false)
                && visited.set(next.x, next.y, true).is_ok()
            {
                stack.push(next);
            }
        }
    }
    false
}

/// Outcome of one bounded depth-first pass.
enum BoundedSearch {
    Found(Vec<Position>),
    /// Nothing within the bound; carries the smallest f-cost that exceeded it.
    Exceeded(usize),
    /// Every reachable cell was expanded without pruning: the goal is unreachable.
    Exhausted,
}

/// One level of the explicit depth-first stack.
struct Frame {
    g: usize,
    /// Neighbors still to try, stored reversed so `pop` follows expansion order.
    pending: Vec<Position>,
}

impl Frame {
    fn expand(world: &GridWorld, position: Position, g: usize) -> Self {
        let mut pending = neighbors(world, position);
        pending.reverse();
        Frame { g, pending }
    }
}

/// IDA* pathfinding.
///
/// Runs depth-first passes bounded by `g + h <= bound`, starting from
/// `bound = h(start, goal)` and raising the bound to the smallest f-cost that
/// was pruned. The depth-first walk keeps an explicit stack rather than
/// recursing, and never re-enters a cell already on the current route.
///
/// Within a pass, a cell reached again at a cost no better than one it was
/// already expanded at is skipped, but a cheaper arrival expands it again. The
/// table is rebuilt each pass, so nodes are still re-explored as the bound
/// grows.
///
/// A goal outside the start's connected region is rejected by a flood fill
/// before any pass runs. Otherwise the goal is found at the optimal bound; the
/// `Exhausted` and traversable-cell-count exits only guard that loop.
pub fn ida_star_path(world: &GridWorld, start: Position, goal: Position) -> Option<Vec<Position>> {
    assert_in_bounds(world, start, "start");
    assert_in_bounds(world, goal, "goal");

    if !is_connected(world, start, goal) {
        trace!(%start, %goal, "IDA* goal outside the start's region");
        return None;
    }

    let longest_route = world.traversable_cells();
    let mut best_g: HashMap<Position, usize> = HashMap::new();
    let mut bound = manhattan_distance(start, goal);

    loop {
        trace!(%start, %goal, bound, "IDA* pass");
        match bounded_search(world, start, goal, bound, &mut best_g) {
            BoundedSearch::Found(path) => return Some(path),
            BoundedSearch::Exhausted => return None,
            BoundedSearch::Exceeded(next) if next >= longest_route => return None,
            BoundedSearch::Exceeded(next) => bound = next,
        }
    }
}

fn bounded_search(
    world: &GridWorld,
    start: Position,
    goal: Position,
    bound: usize,
    best_g: &mut HashMap<Position, usize>,
) -> BoundedSearch {
    if start == goal {
        return BoundedSearch::Found(vec![start]);
    }

    best_g.clear();
    best_g.insert(start, 0);

    // `path[i]` is the cell expanded by `stack[i]`.
    let mut path = vec![start];
    let mut on_path: HashSet<Position> = HashSet::from([start]);
    let mut stack = vec![Frame::expand(world, start, 0)];
    let mut next_bound: Option<usize> = None;

    while let Some(frame) = stack.last_mut() {
        let Some(neighbor) = frame.pending.pop() else {
            stack.pop();
            if let Some(done) = path.pop() {
                on_path.remove(&done);
            }
            continue;
        };
        if on_path.contains(&neighbor) {
            continue;
        }

        let g = frame.g + 1;
        let f = g + manhattan_distance(neighbor, goal);
        if f > bound {
            next_bound = Some(next_bound.map_or(f, |lowest| lowest.min(f)));
            continue;
        }
        if neighbor == goal {
            path.push(neighbor);
            return BoundedSearch::Found(path);
        }
        if best_g.get(&neighbor).is_some_and(|seen| *seen <= g) {
            continue;
        }

        best_g.insert(neighbor, g);
        path.push(neighbor);
        on_path.insert(neighbor);
        stack.push(Frame::expand(world, neighbor, g));
    }

    match next_bound {
        Some(next) => BoundedSearch::Exceeded(next),
        None => BoundedSearch::Exhausted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn p(x: usize, y: usize) -> Position {
        Position::new(x, y)
    }

    fn world_with_barriers(columns: usize, rows: usize, barriers: &[(usize, usize)]) -> GridWorld {
        let mut world = GridWorld::new(columns, rows);
        for &(x, y) in barriers {
            world.add_barrier(p(x, y)).unwrap();
        }
        world
    }

    fn assert_valid_route(world: &GridWorld, route: &[Position], start: Position, goal: Position) {
        assert_eq!(route.first(), Some(&start));
        assert_eq!(route.last(), Some(&goal));
        for step in route.windows(2) {
            assert!(step[0].is_adjacent(&step[1]), "{} -> {}", step[0], step[1]);
            assert!(world.is_traversable(step[1]));
        }
    }

    // ── Heuristic and neighbors ─────────────────────────────────

    #[test]
    fn manhattan_is_symmetric() {
        assert_eq!(manhattan_distance(p(0, 0), p(2, 3)), 5);
        assert_eq!(manhattan_distance(p(2, 3), p(0, 0)), 5);
        assert_eq!(manhattan_distance(p(4, 4), p(4, 4)), 0);
    }

    #[test]
    fn neighbors_interior_in_fixed_order() {
        let world = GridWorld::new(5, 5);
        assert_eq!(
            neighbors(&world, p(2, 2)),
            vec![p(2, 1), p(2, 3), p(1, 2), p(3, 2)]
        );
    }

    #[test]
    fn neighbors_corner_and_edge() {
        let world = GridWorld::new(5, 5);
        assert_eq!(neighbors(&world, p(0, 0)), vec![p(0, 1), p(1, 0)]);
        assert_eq!(neighbors(&world, p(4, 4)), vec![p(4, 3), p(3, 4)]);
        assert_eq!(neighbors(&world, p(4, 2)).len(), 3);
    }

    #[test]
    fn neighbors_skip_barriers() {
        let world = world_with_barriers(3, 3, &[(1, 0), (0, 1)]);
        assert!(neighbors(&world, p(0, 0)).is_empty());
        assert_eq!(neighbors(&world, p(1, 1)), vec![p(1, 2), p(2, 1)]);
    }

    // ── Engines ─────────────────────────────────────────────────

    #[test]
    fn open_grid_routes_are_manhattan() {
        let world = GridWorld::new(5, 5);
        for algorithm in SearchAlgorithm::ALL {
            let route = algorithm.find_path(&world, p(0, 0), p(2, 3)).unwrap();
            assert_valid_route(&world, &route, p(0, 0), p(2, 3));
            assert_eq!(route.len() - 1, 5, "{algorithm}");
        }
    }

    #[test]
    fn routes_detour_around_wall() {
        // Vertical wall at x = 2 with a gap at the bottom row.
        let world = world_with_barriers(5, 4, &[(2, 0), (2, 1), (2, 2)]);
        for algorithm in SearchAlgorithm::ALL {
            let route = algorithm.find_path(&world, p(0, 0), p(4, 0)).unwrap();
            assert_valid_route(&world, &route, p(0, 0), p(4, 0));
            assert_eq!(route.len() - 1, 10, "{algorithm}");
            assert!(route.contains(&p(2, 3)));
        }
    }

    #[test]
    fn start_equals_goal() {
        let world = GridWorld::new(3, 3);
        for algorithm in SearchAlgorithm::ALL {
            assert_eq!(
                algorithm.find_path(&world, p(1, 1), p(1, 1)),
                Some(vec![p(1, 1)])
            );
        }
    }

    #[test]
    fn enclosed_goal_has_no_route() {
        let world = world_with_barriers(5, 5, &[(0, 1), (2, 1), (1, 0), (1, 2)]);
        for algorithm in SearchAlgorithm::ALL {
            assert_eq!(algorithm.find_path(&world, p(4, 4), p(1, 1)), None, "{algorithm}");
        }
    }

    #[test]
    fn barrier_goal_has_no_route() {
        let world = world_with_barriers(4, 4, &[(3, 3)]);
        for algorithm in SearchAlgorithm::ALL {
            assert_eq!(algorithm.find_path(&world, p(0, 0), p(3, 3)), None);
        }
    }

    #[test]
    fn ida_star_terminates_on_large_enclosed_region() {
        let mut barriers = Vec::new();
        for x in 10..15 {
            barriers.push((x, 10));
            barriers.push((x, 14));
        }
        for y in 11..14 {
            barriers.push((10, y));
            barriers.push((14, y));
        }
        let world = world_with_barriers(20, 20, &barriers);
        assert_eq!(ida_star_path(&world, p(0, 0), p(12, 12)), None);
    }

    #[test]
    fn walled_off_corner_on_default_board_has_no_route() {
        let world = world_with_barriers(20, 15, &[(18, 14), (19, 13)]);
        assert!(!is_connected(&world, p(0, 0), p(19, 14)));
        assert!(is_connected(&world, p(0, 0), p(18, 13)));
        for algorithm in SearchAlgorithm::ALL {
            assert_eq!(algorithm.find_path(&world, p(0, 0), p(19, 14)), None, "{algorithm}");
        }
        // The same board with the corner open is still routed optimally.
        let open = world_with_barriers(20, 15, &[(18, 14)]);
        let route = ida_star_path(&open, p(0, 0), p(19, 14)).unwrap();
        assert_eq!(route.len(), 34);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn out_of_bounds_goal_panics() {
        let world = GridWorld::new(3, 3);
        a_star_path(&world, p(0, 0), p(3, 0));
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn out_of_bounds_start_panics() {
        let world = GridWorld::new(3, 3);
        ida_star_path(&world, p(0, 9), p(0, 0));
    }

    #[test]
    fn algorithm_names_round_trip() {
        for algorithm in SearchAlgorithm::ALL {
            let name = algorithm.to_string();
            assert_eq!(name.parse::<SearchAlgorithm>(), Ok(algorithm));
        }
        assert_eq!("AStar".parse::<SearchAlgorithm>(), Ok(SearchAlgorithm::AStar));
        assert_eq!(
            "ida-star".parse::<SearchAlgorithm>(),
            Ok(SearchAlgorithm::IdaStar)
        );
        assert!("dijkstra".parse::<SearchAlgorithm>().is_err());
    }

    // ── Properties ──────────────────────────────────────────────

    const MAX_SIDE: usize = 7;

    fn arb_world() -> impl Strategy<Value = (GridWorld, Position, Position)> {
        (
            1..=MAX_SIDE,
            1..=MAX_SIDE,
            prop::collection::vec(prop::bool::weighted(0.3), MAX_SIDE * MAX_SIDE),
            0..MAX_SIDE * MAX_SIDE,
            0..MAX_SIDE * MAX_SIDE,
        )
            .prop_map(|(columns, rows, mask, s, g)| {
                let cells = columns * rows;
                let start = p(s % cells % columns, s % cells / columns);
                let goal = p(g % cells % columns, g % cells / columns);
                let mut world = GridWorld::new(columns, rows);
                for index in 0..cells {
                    let cell = p(index % columns, index / columns);
                    if mask[index] && cell != start && cell != goal {
                        world.add_barrier(cell).unwrap();
                    }
                }
                (world, start, goal)
            })
    }

    proptest! {
        #[test]
        fn engines_agree_on_route_length((world, start, goal) in arb_world()) {
            let a_star = a_star_path(&world, start, goal);
            let ida_star = ida_star_path(&world, start, goal);
            prop_assert_eq!(a_star.as_ref().map(Vec::len), ida_star.as_ref().map(Vec::len));
            for route in a_star.iter().chain(ida_star.iter()) {
                assert_valid_route(&world, route, start, goal);
                prop_assert!(route.len() - 1 >= manhattan_distance(start, goal));
            }
        }

        #[test]
        fn open_grid_length_is_manhattan(
            columns in 1..=MAX_SIDE,
            rows in 1..=MAX_SIDE,
            sx in 0..MAX_SIDE, sy in 0..MAX_SIDE,
            gx in 0..MAX_SIDE, gy in 0..MAX_SIDE,
        ) {
            let world = GridWorld::new(columns, rows);
            let start = p(sx % columns, sy % rows);
            let goal = p(gx % columns, gy % rows);
            for algorithm in SearchAlgorithm::ALL {
                let route = algorithm.find_path(&world, start, goal);
                prop_assert_eq!(route.map(|r| r.len() - 1), Some(manhattan_distance(start, goal)));
            }
        }
    }
}
