use serde::{Deserialize, Serialize};

/// Parameters for generating a random world.
///
/// The defaults match the classic layout: a 20x15 board, five tasks and
/// fifteen barriers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub columns: usize,
    pub rows: usize,
    pub num_tasks: usize,
    pub num_barriers: usize,
    /// Seed for barrier and task placement. `None` draws a fresh seed.
    pub seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            columns: 20,
            rows: 15,
            num_tasks: 5,
            num_barriers: 15,
            seed: None,
        }
    }
}

impl WorldConfig {
    /// Number of cells that must be free to place everything, counting the
    /// agent's start cell.
    pub fn required_cells(&self) -> usize {
        self.num_tasks
            .saturating_add(self.num_barriers)
            .saturating_add(1)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
