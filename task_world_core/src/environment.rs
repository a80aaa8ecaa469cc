use std::collections::BTreeMap;

use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Position, TaskId,
    config::WorldConfig,
    map::{Grid, GridError},
};

/// Represents the static type of a cell in the world grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    Floor,
    Barrier,
}

impl Default for CellType {
    fn default() -> Self {
        CellType::Floor
    }
}

/// Errors raised while building a world by hand, from a config or from a map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("Cannot place a barrier on task cell {0}")]
    BarrierOnTask(Position),
    #[error("Cannot place a task on barrier cell {0}")]
    TaskOnBarrier(Position),
    #[error("Cell {0} already holds a task")]
    TaskAlreadyPresent(Position),
    #[error("Task id {0} is already in use")]
    DuplicateTaskId(TaskId),
    #[error("Cannot number {0} tasks, ids stop at {max}", max = TaskId::MAX)]
    TooManyTasks(usize),
    #[error("World needs {required} free cells but only has {available}")]
    NotEnoughCells { required: usize, available: usize },
    #[error("Map string is empty")]
    EmptyMap,
    #[error("Map has zero width")]
    ZeroWidth,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    InconsistentWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Multiple start positions ('ST') found")]
    MultipleStarts,
    #[error("No start position ('ST') found in map")]
    MissingStart,
    #[error("Unknown map code '{token}' at position ({x}, {y})")]
    UnknownToken { token: String, x: usize, y: usize },
}

/// The grid the agent lives in: bounds, static barriers and the open tasks.
///
/// The world is the only owner of the task map. Search code reads terrain
/// through `&GridWorld` and never looks at tasks; only the agent's move step
/// removes them, through [`GridWorld::take_task`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridWorld {
    terrain: Grid<CellType>,
    tasks: BTreeMap<Position, TaskId>,
}

impl GridWorld {
    /// Creates an empty world with no barriers and no tasks.
    pub fn new(columns: usize, rows: usize) -> Self {
        GridWorld {
            terrain: Grid::new(columns, rows),
            tasks: BTreeMap::new(),
        }
    }

    pub fn columns(&self) -> usize {
        self.terrain.width()
    }

    pub fn rows(&self) -> usize {
        self.terrain.height()
    }

    #[inline]
    pub fn is_within_bounds(&self, x: usize, y: usize) -> bool {
        self.terrain.is_valid(x, y)
    }

    /// True if `(x, y)` is a barrier. Cells outside the grid are not barriers.
    #[inline]
    pub fn is_barrier(&self, x: usize, y: usize) -> bool {
        self.is_within_bounds(x, y) && self.terrain[Position { x, y }] == CellType::Barrier
    }

    /// True if the agent may stand on `position`.
    #[inline]
    pub fn is_traversable(&self, position: Position) -> bool {
        self.is_within_bounds(position.x, position.y) && self.terrain[position] == CellType::Floor
    }

    /// Number of cells that are not barriers.
    pub fn traversable_cells(&self) -> usize {
        self.terrain
            .iter()
            .filter(|cell| **cell == CellType::Floor)
            .count()
    }

    /// Positions of every barrier, in row-major order.
    pub fn barriers(&self) -> impl Iterator<Item = Position> + '_ {
        self.terrain
            .enumerate()
            .filter(|(_, cell)| **cell == CellType::Barrier)
            .map(|(position, _)| position)
    }

    pub fn add_barrier(&mut self, position: Position) -> Result<(), WorldError> {
        if self.tasks.contains_key(&position) {
            return Err(WorldError::BarrierOnTask(position));
        }
        self.terrain
            .set(position.x, position.y, CellType::Barrier)
            .map_err(Into::into)
    }

    pub fn add_task(&mut self, position: Position, id: TaskId) -> Result<(), WorldError> {
        if !self.is_within_bounds(position.x, position.y) {
            return Err(GridError::OutOfBounds {
                x: position.x,
                y: position.y,
                width: self.columns(),
                height: self.rows(),
            }
            .into());
        }
        if self.is_barrier(position.x, position.y) {
            return Err(WorldError::TaskOnBarrier(position));
        }
        if self.tasks.contains_key(&position) {
            return Err(WorldError::TaskAlreadyPresent(position));
        }
        if self.tasks.values().any(|existing| *existing == id) {
            return Err(WorldError::DuplicateTaskId(id));
        }
        self.tasks.insert(position, id);
        Ok(())
    }

    /// Open tasks, ordered by position.
    pub fn tasks(&self) -> &BTreeMap<Position, TaskId> {
        &self.tasks
    }

    pub fn task_at(&self, position: Position) -> Option<TaskId> {
        self.tasks.get(&position).copied()
    }

    /// Removes and returns the task at `position`, if one is open there.
    pub fn take_task(&mut self, position: Position) -> Option<TaskId> {
        self.tasks.remove(&position)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn has_open_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Builds a random world from `config`.
    ///
    /// The agent starts at `(0, 0)`. Barriers and tasks are scattered over the
    /// remaining cells without overlapping each other; tasks are numbered from
    /// `1` in placement order. Returns the world and the start position.
    pub fn generate(config: &WorldConfig) -> Result<(GridWorld, Position), WorldError> {
        let start = Position::new(0, 0);
        if TaskId::try_from(config.num_tasks).is_err() {
            return Err(WorldError::TooManyTasks(config.num_tasks));
        }
        let available = config.columns.saturating_mul(config.rows);
        if available < config.required_cells() {
            return Err(WorldError::NotEnoughCells {
                required: config.required_cells(),
                available,
            });
        }

        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut rng = StdRng::seed_from_u64(seed);
        debug!(
            seed,
            columns = config.columns,
            rows = config.rows,
            tasks = config.num_tasks,
            barriers = config.num_barriers,
            "Generating world"
        );

        let mut world = GridWorld::new(config.columns, config.rows);
        let mut free: Vec<Position> = world
            .terrain
            .enumerate()
            .map(|(position, _)| position)
            .filter(|position| *position != start)
            .collect();
        free.shuffle(&mut rng);

        let mut cells = free.into_iter();
        for position in cells.by_ref().take(config.num_barriers) {
            world.add_barrier(position)?;
        }
        for (index, position) in cells.take(config.num_tasks).enumerate() {
            let id = TaskId::try_from(index + 1)
                .map_err(|_| WorldError::TooManyTasks(config.num_tasks))?;
            world.add_task(position, id)?;
        }

        Ok((world, start))
    }
}

/// Loads a world from a text map.
///
/// Each row is a line of whitespace-separated codes:
///
/// * `ST`: the agent's start cell (exactly one)
/// * `..` or `BL`: open floor
/// * `WL` or `BR`: barrier
/// * `T<n>`: task with id `n`, e.g. `T7`
pub fn load_world_from_string(map_string: &str) -> Result<(GridWorld, Position), WorldError> {
    let lines: Vec<&str> = map_string.trim().lines().collect();
    if lines.is_empty() {
        return Err(WorldError::EmptyMap);
    }

    let height = lines.len();
    let mut width = 0;
    let mut parsed_rows: Vec<Vec<&str>> = Vec::with_capacity(height);

    for (y, line) in lines.iter().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if y == 0 {
            width = tokens.len();
            if width == 0 {
                return Err(WorldError::ZeroWidth);
            }
        } else if tokens.len() != width {
            return Err(WorldError::InconsistentWidth {
                row: y,
                expected: width,
                found: tokens.len(),
            });
        }
        parsed_rows.push(tokens);
    }

    let mut start_position: Option<Position> = None;
    let mut tasks: Vec<(Position, TaskId)> = Vec::new();
    let mut barriers: Vec<Position> = Vec::new();

    for (y, row_tokens) in parsed_rows.iter().enumerate() {
        for (x, token) in row_tokens.iter().enumerate() {
            let pos = Position { x, y };
            match *token {
                "ST" => {
                    if start_position.is_some() {
                        return Err(WorldError::MultipleStarts);
                    }
                    start_position = Some(pos);
                }
                ".." | "BL" => {}
                "WL" | "BR" => barriers.push(pos),
                task if task.starts_with('T') => {
                    let id = task[1..]
                        .parse::<TaskId>()
                        .map_err(|_| WorldError::UnknownToken {
                            token: task.to_string(),
                            x,
                            y,
                        })?;
                    tasks.push((pos, id));
                }
                unknown => {
                    return Err(WorldError::UnknownToken {
                        token: unknown.to_string(),
                        x,
                        y,
                    });
                }
            }
        }
    }

    let start = start_position.ok_or(WorldError::MissingStart)?;

    let mut world = GridWorld::new(width, height);
    for position in barriers {
        world.add_barrier(position)?;
    }
    for (position, id) in tasks {
        world.add_task(position, id)?;
    }

    Ok((world, start))
}
