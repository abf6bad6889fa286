use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use std::{io, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use tracing::info;

mod app;

use app::api::AppState;
use app::config::{Config, Settings};
use app::generator::DescriptionGenerator;
use app::service::TaskService;

/// Ordered todo list with an HTTP API and a terminal UI.
#[derive(Parser, Debug)]
#[command(name = "todo-manager", about = "Ordered todo list manager")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Listen address for the HTTP API.
    #[arg(long, env = "TODO_LISTEN", default_value = "127.0.0.1:5000")]
    listen: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Serve the JSON API (default).
    Serve,
    /// Browse and edit the list in the terminal.
    Tui,
}

fn init_tracing(command: Command) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env();
    // The terminal UI owns the screen; only log there when asked to
    if command == Command::Tui && filter.is_err() {
        return;
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter.unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();
}

// Clients are built here, before any async runtime exists, and injected from here on
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve);
    init_tracing(command);

    let config = Config::resolve(cli.settings, |key| std::env::var(key).ok());
    let store = config.backend.open()?;
    let service = Arc::new(TaskService::new(store));
    let generator = Arc::new(config.description_generator());
    info!(
        backend = %config.backend,
        remote_generator = generator.has_remote(),
        "configuration loaded"
    );

    match command {
        Command::Serve => serve(&cli.listen, AppState { service, generator }),
        Command::Tui => run_tui(&service, &generator),
    }
}

fn serve(listen: &str, state: AppState) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(listen).await?;
        info!("todo API listening on {}", listen);
        axum::serve(listener, app::api::router(state.clone()))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutting down");
            })
            .await?;
        anyhow::Ok(())
    })?;

    // Blocking HTTP clients inside `state` must be dropped outside the runtime
    drop(runtime);
    drop(state);
    Ok(())
}

// Start the terminal UI.
// Terminal setup and teardown follow
// https://github.com/ratatui-org/ratatui/blob/main/examples/list.rs
fn run_tui(service: &TaskService, generator: &DescriptionGenerator) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create an app with 250 ms tick
    let tick_rate = Duration::from_millis(250);
    let app = app::ui::App::new(service, generator);
    let res = app::ui::run_app(&mut terminal, app, tick_rate);

    // Restore previous terminal state after exit
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res?;
    Ok(())
}
