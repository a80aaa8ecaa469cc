use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Position, TaskId,
    environment::GridWorld,
    search::SearchAlgorithm,
    selector::{Selection, select_nearest_task},
};

/// What a single call to [`TaskAgent::advance`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveOutcome {
    /// Stepped onto a cell with no open task.
    Moved(Position),
    /// Stepped onto an open task and completed it.
    CompletedTask { position: Position, task_id: TaskId },
    /// No path left; the agent is now idle.
    Idle,
}

/// A planning agent that walks to the nearest open task, collects it and
/// plans again.
///
/// The agent alternates between two states. While idle it waits for
/// [`find_nearest_task`](Self::find_nearest_task) to install a path; while
/// moving, each [`advance`](Self::advance) consumes one cell of that path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAgent {
    algorithm: SearchAlgorithm,
    position: Position,
    current_plan: VecDeque<Position>, // Remaining cells, current position excluded
    moving: bool,
    tasks_completed: usize,
    completed_tasks: Vec<TaskId>,
    explored: Vec<Position>,
}

impl TaskAgent {
    pub fn new(start: Position, algorithm: SearchAlgorithm) -> Self {
        Self {
            algorithm,
            position: start,
            current_plan: VecDeque::new(),
            moving: false,
            tasks_completed: 0,
            completed_tasks: Vec::new(),
            explored: Vec::new(),
        }
    }

    /// Plans to the nearest reachable open task and starts moving towards it.
    ///
    /// Returns the chosen task's position. When no task is reachable (or none
    /// is open) the agent stays idle with an empty plan and `None` is returned.
    pub fn find_nearest_task(&mut self, world: &GridWorld) -> Option<Position> {
        match select_nearest_task(world, self.position, self.algorithm) {
            Some(Selection { task, route, .. }) => {
                // Skip the first position (current position)
                self.current_plan = route.into_iter().skip(1).collect();
                self.moving = true;
                Some(task)
            }
            None => {
                self.current_plan.clear();
                self.moving = false;
                None
            }
        }
    }

    /// Takes one step along the current plan.
    ///
    /// Stepping onto an open task removes it from `world` and records it. With
    /// an empty plan the agent turns idle and nothing else changes.
    pub fn advance(&mut self, world: &mut GridWorld) -> MoveOutcome {
        let Some(next_pos) = self.current_plan.pop_front() else {
            self.moving = false;
            return MoveOutcome::Idle;
        };
        debug_assert!(
            self.position.is_adjacent(&next_pos),
            "plan step {} -> {} is not a unit move",
            self.position,
            next_pos
        );

        self.position = next_pos;
        self.explored.push(next_pos);

        match self.check_task_completion(world) {
            Some(task_id) => MoveOutcome::CompletedTask {
                position: next_pos,
                task_id,
            },
            None => MoveOutcome::Moved(next_pos),
        }
    }

    fn check_task_completion(&mut self, world: &mut GridWorld) -> Option<TaskId> {
        let task_id = world.take_task(self.position)?;
        self.tasks_completed += 1;
        self.completed_tasks.push(task_id);
        debug!(
            task_id,
            position = %self.position,
            completed = self.tasks_completed,
            remaining = world.task_count(),
            "Task completed"
        );
        Some(task_id)
    }

    pub fn algorithm(&self) -> SearchAlgorithm {
        self.algorithm
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn remaining_path(&self) -> &VecDeque<Position> {
        &self.current_plan
    }

    pub fn tasks_completed(&self) -> usize {
        self.tasks_completed
    }

    /// Ids of completed tasks, in completion order.
    pub fn completed_tasks(&self) -> &[TaskId] {
        &self.completed_tasks
    }

    /// Every cell the agent has stepped onto, in order.
    pub fn explored(&self) -> &[Position] {
        &self.explored
    }

    /// Total number of steps taken so far.
    pub fn path_cost(&self) -> usize {
        self.explored.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: usize, y: usize) -> Position {
        Position::new(x, y)
    }

    #[test]
    fn new_agent_is_idle() {
        let agent = TaskAgent::new(p(1, 2), SearchAlgorithm::AStar);
        assert_eq!(agent.position(), p(1, 2));
        assert!(!agent.is_moving());
        assert!(agent.remaining_path().is_empty());
        assert_eq!(agent.tasks_completed(), 0);
        assert_eq!(agent.path_cost(), 0);
    }

    #[test]
    fn advance_with_empty_plan_goes_idle() {
        let mut world = GridWorld::new(3, 3);
        world.add_task(p(2, 2), 1).unwrap();
        let mut agent = TaskAgent::new(p(0, 0), SearchAlgorithm::IdaStar);

        assert_eq!(agent.advance(&mut world), MoveOutcome::Idle);
        assert_eq!(agent.position(), p(0, 0));
        assert!(agent.explored().is_empty());
        assert_eq!(world.task_count(), 1);
    }

    #[test]
    fn plan_excludes_current_position() {
        let mut world = GridWorld::new(4, 1);
        world.add_task(p(3, 0), 1).unwrap();
        let mut agent = TaskAgent::new(p(0, 0), SearchAlgorithm::AStar);

        assert_eq!(agent.find_nearest_task(&world), Some(p(3, 0)));
        assert!(agent.is_moving());
        assert_eq!(
            agent.remaining_path().iter().copied().collect::<Vec<_>>(),
            vec![p(1, 0), p(2, 0), p(3, 0)]
        );
    }

    #[test]
    fn advance_pops_one_step_and_completes_tasks_on_the_way() {
        let mut world = GridWorld::new(4, 1);
        world.add_task(p(1, 0), 5).unwrap();
        world.add_task(p(3, 0), 6).unwrap();
        let mut agent = TaskAgent::new(p(0, 0), SearchAlgorithm::AStar);
        agent.find_nearest_task(&world);

        let expected = agent.remaining_path()[0];
        let outcome = agent.advance(&mut world);
        assert_eq!(
            outcome,
            MoveOutcome::CompletedTask {
                position: expected,
                task_id: 5
            }
        );
        assert_eq!(agent.position(), expected);
        assert!(agent.remaining_path().is_empty());
        assert_eq!(world.task_count(), 1);
        assert_eq!(agent.completed_tasks(), &[5]);

        // Plan exhausted: the next call only flips to idle.
        assert_eq!(agent.advance(&mut world), MoveOutcome::Idle);
        assert!(!agent.is_moving());
        assert_eq!(agent.path_cost(), 1);
    }

    #[test]
    fn step_onto_empty_cell_leaves_tasks_alone() {
        let mut world = GridWorld::new(4, 1);
        world.add_task(p(3, 0), 2).unwrap();
        let mut agent = TaskAgent::new(p(0, 0), SearchAlgorithm::IdaStar);
        agent.find_nearest_task(&world);

        assert_eq!(agent.advance(&mut world), MoveOutcome::Moved(p(1, 0)));
        assert_eq!(agent.position(), p(1, 0));
        assert_eq!(world.task_count(), 1);
        assert_eq!(world.task_at(p(3, 0)), Some(2));
        assert_eq!(agent.tasks_completed(), 0);
        assert!(agent.completed_tasks().is_empty());
        assert_eq!(agent.remaining_path().len(), 2);
    }

    #[test]
    fn unreachable_tasks_leave_agent_idle() {
        let mut world = GridWorld::new(3, 3);
        world.add_barrier(p(1, 0)).unwrap();
        world.add_barrier(p(0, 1)).unwrap();
        world.add_task(p(2, 2), 1).unwrap();
        let mut agent = TaskAgent::new(p(0, 0), SearchAlgorithm::IdaStar);

        assert_eq!(agent.find_nearest_task(&world), None);
        assert!(!agent.is_moving());
        assert!(agent.remaining_path().is_empty());
        assert_eq!(world.task_count(), 1);
    }
}
