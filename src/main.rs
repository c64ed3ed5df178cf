use std::{
    fs::{self, File},
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use stock_explorer::app::{handle_input, handle_mouse, Action, App};
use stock_explorer::config::Config;
use stock_explorer::fetch::YahooSource;
use stock_explorer::ui;

const LOG_FILE: &str = "stock-explorer.log";

/// Logs go to a file; the terminal belongs to the UI
fn init_logging(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("creating log directory {}", config.log_dir.display()))?;
    let file = File::create(config.log_dir.join(LOG_FILE))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stock_explorer=info".into()),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let config = Config::from_env();
    init_logging(&config)?;
    tracing::info!(?config, "starting stock explorer");

    let source = YahooSource::new().context("building HTTP client")?;
    let mut app = App::new(&config, Arc::new(source));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!(error = ?err, "event loop failed");
        eprintln!("Error: {err:?}");
    }

    tracing::info!("bye");
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    let mut dirty = true;
    loop {
        // Apply results posted by the worker thread (non-blocking)
        dirty |= app.poll_jobs();
        dirty |= app.tick();

        if dirty {
            terminal.draw(|f| ui::ui(f, app))?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(100))? {
            // Any input, resizes included, can change what is on screen
            dirty = true;
            let action = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => handle_input(app, key.code),
                Event::Mouse(mouse) => handle_mouse(app, mouse.kind, mouse.column, mouse.row),
                _ => Action::None,
            };

            match action {
                Action::Quit => return Ok(()),
                Action::Explore => app.explore(),
                Action::ShowTable => app.show_table(),
                Action::Export => app.export(),
                Action::Clear => app.clear(),
                Action::Open(path) => app.open(path),
                Action::CloseView => app.close_view(),
                Action::None => {}
            }
        }
    }
}
