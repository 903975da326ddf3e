//! `Tarefas`: terminal task list.
//!
//! Signs in against a hosted password provider and keeps a live view of the
//! user's tasks. Without credentials it talks to an unauthenticated REST
//! fallback; with `--offline` it runs against an in-memory demo store.
//!
//! ```bash
//! # Offline demo mode
//! cargo run --bin tarefas -- --offline
//!
//! # Against the local emulator
//! cargo run --bin tarefas-emulator &
//! cargo run --bin tarefas -- --api-key demo \
//!     --database-url http://127.0.0.1:9000/ \
//!     --auth-endpoint http://127.0.0.1:9000/identitytoolkit.googleapis.com
//!
//! # Or via environment variables
//! TAREFAS_API_KEY=demo TAREFAS_DATABASE_URL=http://127.0.0.1:9000/ cargo run
//! ```

use std::io;
use std::path::Path;
use std::time::Instant;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing_appender::non_blocking::WorkerGuard;

use tarefas::app::App;
use tarefas::backend::Backend;
use tarefas::config::{CliArgs, ClientConfig};
use tarefas::ui;

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // CLI args > env > config file > defaults.
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file; ratatui owns stdout.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("tarefas starting");

    let backend = match Backend::from_config(&config) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(mode = backend.describe(), "backend ready");

    // Set up terminal.
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let term_backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(term_backend)?;

    let result = run_app(&mut terminal, backend, &config);

    // Restore terminal.
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    tracing::info!("tarefas exiting");
    result
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("tarefas.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Main application loop.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    backend: Backend,
    config: &ClientConfig,
) -> io::Result<()> {
    let mut app = App::new(backend, config.status_timings());

    loop {
        // Step 1: Draw the UI frame.
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Step 2: Apply auth changes and store results (non-blocking).
        app.drain_events();

        // Step 3: Expire status messages.
        app.tick(Instant::now());

        // Step 4: Poll for terminal input events.
        if event::poll(config.poll_timeout)?
            && let Event::Key(key) = event::read()?
        {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            app.handle_key_event(key);
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
