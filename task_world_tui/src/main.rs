use anyhow::{Context, Result};
use clap::Parser;
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    collections::HashSet,
    io::{self, Stdout},
    path::PathBuf,
    sync::Mutex,
    time::{Duration, Instant},
};
use task_world_core::{
    Position,
    config::WorldConfig,
    environment::load_world_from_string,
    search::SearchAlgorithm,
    simulation::{Simulation, TickOutcome},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Watch an agent collect tasks on a grid", long_about = None)]
struct Args {
    /// Map file to load instead of generating a random world
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Search algorithm used for planning (astar or idastar)
    #[arg(short, long, default_value = "idastar")]
    algorithm: SearchAlgorithm,

    /// Grid columns for a generated world
    #[arg(long, default_value_t = 20)]
    columns: usize,

    /// Grid rows for a generated world
    #[arg(long, default_value_t = 15)]
    rows: usize,

    /// Number of tasks for a generated world
    #[arg(long, default_value_t = 5)]
    tasks: usize,

    /// Number of barriers for a generated world
    #[arg(long, default_value_t = 15)]
    barriers: usize,

    /// Seed for a generated world
    #[arg(long)]
    seed: Option<u64>,

    /// Milliseconds between simulation steps
    #[arg(long, default_value_t = 200)]
    tick_ms: u64,

    /// Write logs to this file
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn world_config(&self) -> WorldConfig {
        WorldConfig {
            columns: self.columns,
            rows: self.rows,
            num_tasks: self.tasks,
            num_barriers: self.barriers,
            seed: self.seed,
        }
    }
}

struct App {
    /// The core simulation.
    simulation: Simulation,
    /// Set once the user starts the run.
    started: bool,
    /// Flag to control the main loop.
    should_quit: bool,
    /// Last thing that happened, shown in the status panel.
    last_event: Option<TickOutcome>,
}

impl App {
    fn new(args: &Args) -> Result<Self> {
        let simulation = match &args.map {
            Some(map_file) => {
                let file_string = std::fs::read_to_string(map_file)
                    .with_context(|| format!("Failed to read map file {}", map_file.display()))?;
                let (world, start) = load_world_from_string(&file_string)
                    .with_context(|| format!("Failed to load map {}", map_file.display()))?;
                Simulation::new(world, start, args.algorithm)
            }
            None => Simulation::from_config(&args.world_config(), args.algorithm)
                .context("Failed to generate world")?,
        };

        Ok(App {
            simulation,
            started: false,
            should_quit: false,
            last_event: None,
        })
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) {
        if !self.started {
            return;
        }
        let outcome = self.simulation.tick();
        if outcome != TickOutcome::Finished {
            self.last_event = Some(outcome);
        }
    }

    fn start(&mut self) {
        if !self.started {
            info!(algorithm = %self.simulation.agent().algorithm(), "Simulation started");
            self.started = true;
        }
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // The terminal belongs to the UI, so logs only go to a file
    if let Some(log_file) = &args.log_file {
        let file = std::fs::File::create(log_file)
            .with_context(|| format!("Failed to create log file {}", log_file.display()))?;
        tracing_subscriber::fmt()
            .with_writer(Mutex::new(file))
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("task_world_core=debug,task_world_tui=debug")
            }))
            .with_ansi(false)
            .init();
    }

    // Build the world before touching the terminal so errors print normally
    let mut app = App::new(&args)?;
    let tick_rate = Duration::from_millis(args.tick_ms);

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, tick_rate);
    restore_terminal(&mut terminal)?;
    result?;

    let report = app.simulation.report();
    println!(
        "{}: completed {:?} in {} steps, {} task(s) left",
        report.algorithm,
        report.completed_tasks,
        report.path_cost,
        report.remaining_tasks
    );
    Ok(())
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Char(' ') | KeyCode::Char('s') | KeyCode::Enter => app.start(),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(frame.area());
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(rows[0]);

    render_map(frame, columns[0], &app.simulation);
    render_status(frame, columns[1], app);

    let help = if app.started {
        "Press 'q' or 'Esc' to quit."
    } else {
        "Press 'space' to start, 'q' or 'Esc' to quit."
    };
    let help_text = Paragraph::new(help)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, rows[1]);
}

/// Renders the agent's progress next to the map.
fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let agent = app.simulation.agent();
    let world = app.simulation.world();
    let position = agent.position();

    let state = if !app.started {
        Span::styled("waiting", Style::default().fg(Color::DarkGray))
    } else if app.simulation.is_finished() && !agent.is_moving() {
        if world.has_open_tasks() {
            Span::styled("stuck", Style::default().fg(Color::Red).bold())
        } else {
            Span::styled("done", Style::default().fg(Color::Green).bold())
        }
    } else if agent.is_moving() {
        Span::styled("moving", Style::default().fg(Color::Cyan))
    } else {
        Span::styled("planning", Style::default().fg(Color::Yellow))
    };

    let mut lines = vec![
        Line::from(format!("Algorithm: {}", agent.algorithm())),
        Line::from(vec![Span::raw("State: "), state]),
        Line::from(format!("Tasks Completed: {}", agent.tasks_completed())),
        Line::from(format!("Tasks Remaining: {}", world.task_count())),
        Line::from(format!("Position: ({}, {})", position.x, position.y)),
        Line::from(format!("Completed Tasks: {:?}", agent.completed_tasks())),
        Line::from(format!("Path Cost: {}", agent.path_cost())),
        Line::from(format!("Ticks: {}", app.simulation.ticks())),
    ];
    if let Some(event) = app.last_event {
        lines.push(Line::from(""));
        lines.push(Line::from(describe(event)));
    }

    let status = Paragraph::new(lines)
        .block(Block::default().title("Status").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    frame.render_widget(status, area);
}

fn describe(event: TickOutcome) -> String {
    match event {
        TickOutcome::Planned { task, steps } => format!("Planned {} steps to {}", steps, task),
        TickOutcome::Stuck { remaining } => format!("{} task(s) unreachable", remaining),
        TickOutcome::Moved(position) => format!("Moved to {}", position),
        TickOutcome::CompletedTask { position, task_id } => {
            format!("Completed task {} at {}", task_id, position)
        }
        TickOutcome::Idle => "Looking for the next task".to_string(),
        TickOutcome::Finished => "Finished".to_string(),
    }
}

/// Renders the world grid onto the frame.
fn render_map(frame: &mut Frame, area: Rect, simulation: &Simulation) {
    let world = simulation.world();
    let agent = simulation.agent();
    let planned: HashSet<Position> = agent.remaining_path().iter().copied().collect();
    let explored: HashSet<Position> = agent.explored().iter().copied().collect();

    let mut lines: Vec<Line> = Vec::with_capacity(world.rows());

    for y in 0..world.rows() {
        let mut spans: Vec<Span> = Vec::with_capacity(world.columns());
        for x in 0..world.columns() {
            let pos = Position { x, y };
            let span = if pos == agent.position() {
                Span::styled(" @", Style::default().fg(Color::Blue).bold())
            } else if let Some(task_id) = world.task_at(pos) {
                Span::styled(
                    format!("{:>2}", task_id % 100),
                    Style::default().fg(Color::Red).bold(),
                )
            } else if world.is_barrier(x, y) {
                Span::styled("██", Style::default().fg(Color::DarkGray))
            } else if planned.contains(&pos) {
                Span::styled(" *", Style::default().fg(Color::Cyan))
            } else if explored.contains(&pos) {
                Span::styled(" ·", Style::default().fg(Color::Gray))
            } else {
                Span::raw(" .")
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let title = format!("Task World ({}x{})", world.columns(), world.rows());
    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title(title).borders(Borders::ALL))
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}
