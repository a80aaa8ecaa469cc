use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    Position, TaskId,
    agent::{MoveOutcome, TaskAgent},
    config::WorldConfig,
    environment::{GridWorld, WorldError},
    search::SearchAlgorithm,
};

/// Represents the outcome of one simulation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickOutcome {
    /// The idle agent planned a route to `task`.
    Planned { task: Position, steps: usize },
    /// The idle agent could not reach any of the `remaining` open tasks.
    Stuck { remaining: usize },
    Moved(Position),
    CompletedTask { position: Position, task_id: TaskId },
    /// The agent ran out of path and is idle again.
    Idle,
    /// No tasks are left.
    Finished,
}

/// Summary of a finished (or cut short) run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub ticks: usize,
    pub algorithm: SearchAlgorithm,
    pub final_position: Position,
    pub completed_tasks: Vec<TaskId>,
    pub path_cost: usize,
    pub remaining_tasks: usize,
}

/// Owns the world and the agent and drives them one tick at a time.
///
/// Each tick does one thing: an idle agent with tasks left plans, a moving
/// agent takes a step.
#[derive(Debug, Clone)]
pub struct Simulation {
    world: GridWorld,
    agent: TaskAgent,
    ticks: usize,
    stuck: bool,
}

impl Simulation {
    pub fn new(world: GridWorld, start: Position, algorithm: SearchAlgorithm) -> Self {
        Simulation {
            world,
            agent: TaskAgent::new(start, algorithm),
            ticks: 0,
            stuck: false,
        }
    }

    /// Generates a random world from `config` and places the agent on its start cell.
    pub fn from_config(
        config: &WorldConfig,
        algorithm: SearchAlgorithm,
    ) -> Result<Self, WorldError> {
        let (world, start) = GridWorld::generate(config)?;
        Ok(Simulation::new(world, start, algorithm))
    }

    pub fn world(&self) -> &GridWorld {
        &self.world
    }

    pub fn agent(&self) -> &TaskAgent {
        &self.agent
    }

    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// True once every task is collected, or the remaining ones are unreachable.
    pub fn is_finished(&self) -> bool {
        !self.world.has_open_tasks() || self.stuck
    }

    /// Advances the simulation by one step.
    pub fn tick(&mut self) -> TickOutcome {
        if self.is_finished() && !self.agent.is_moving() {
            return TickOutcome::Finished;
        }
        self.ticks += 1;

        if self.agent.is_moving() {
            return match self.agent.advance(&mut self.world) {
                MoveOutcome::Moved(position) => TickOutcome::Moved(position),
                MoveOutcome::CompletedTask { position, task_id } => {
                    TickOutcome::CompletedTask { position, task_id }
                }
                MoveOutcome::Idle => TickOutcome::Idle,
            };
        }

        match self.agent.find_nearest_task(&self.world) {
            Some(task) => TickOutcome::Planned {
                task,
                steps: self.agent.remaining_path().len(),
            },
            None => {
                let remaining = self.world.task_count();
                debug!(remaining, position = %self.agent.position(), "No reachable task");
                self.stuck = true;
                TickOutcome::Stuck { remaining }
            }
        }
    }

    /// Ticks until the simulation finishes or `max_ticks` have run.
    pub fn run_to_completion(&mut self, max_ticks: usize) -> SimulationReport {
        while !(self.is_finished() && !self.agent.is_moving()) && self.ticks < max_ticks {
            self.tick();
        }
        let report = self.report();
        info!(
            ticks = report.ticks,
            algorithm = %report.algorithm,
            completed = report.completed_tasks.len(),
            remaining = report.remaining_tasks,
            path_cost = report.path_cost,
            "Simulation finished"
        );
        report
    }

    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            ticks: self.ticks,
            algorithm: self.agent.algorithm(),
            final_position: self.agent.position(),
            completed_tasks: self.agent.completed_tasks().to_vec(),
            path_cost: self.agent.path_cost(),
            remaining_tasks: self.world.task_count(),
        }
    }
}
