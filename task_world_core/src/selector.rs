use tracing::debug;

use crate::{Position, TaskId, environment::GridWorld, search::SearchAlgorithm};

/// The task chosen by [`select_nearest_task`] and the route to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub task: Position,
    pub task_id: TaskId,
    /// Full route, starting at the agent's position and ending on the task.
    pub route: Vec<Position>,
}

impl Selection {
    /// Number of moves needed to reach the task.
    pub fn steps(&self) -> usize {
        self.route.len().saturating_sub(1)
    }
}

/// Plans to the nearest open task.
///
/// Runs `algorithm` from `from` to every open task and keeps the shortest
/// route. Tasks are tried in ascending position order and only a strictly
/// shorter route replaces the current best, so ties go to the lowest position.
/// Unreachable tasks are skipped. Returns `None` when no task is reachable.
pub fn select_nearest_task(
    world: &GridWorld,
    from: Position,
    algorithm: SearchAlgorithm,
) -> Option<Selection> {
    let mut best: Option<Selection> = None;

    for (&task, &task_id) in world.tasks() {
        let Some(route) = algorithm.find_path(world, from, task) else {
            debug!(%task, task_id, %algorithm, "Task unreachable, skipping");
            continue;
        };
        if best
            .as_ref()
            .is_none_or(|current| route.len() < current.route.len())
        {
            best = Some(Selection {
                task,
                task_id,
                route,
            });
        }
    }

    if let Some(selection) = &best {
        debug!(
            from = %from,
            task = %selection.task,
            task_id = selection.task_id,
            steps = selection.steps(),
            %algorithm,
            "Selected nearest task"
        );
    }
    best
}
