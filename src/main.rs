mod chart;
mod client;
mod config;
mod error;
mod estimator;
mod telemetry;
mod ui;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use eyre::Result;
use ratatui::{Terminal, backend::CrosstermBackend};
use std::{
    io::{Stdout, stdout},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{sync::mpsc, time};
use tracing::{error, info};

use client::{GasSource, NodeClient};
use config::{Config, UI_TICK};
use error::FetchError;
use estimator::{FetchTicket, GasPriceSample, Poller, QuerySelection, fetch_sample};
use ui::Dashboard;

type CrosstermTerminal = Terminal<CrosstermBackend<Stdout>>;
type FetchOutcome = (FetchTicket, Result<Option<GasPriceSample>, FetchError>);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::load()?;
    telemetry::init(&config)?;

    info!(
        rpc_url = %config.rpc_url,
        mode = ?config.mode,
        strategy = ?config.strategy,
        window = config.window,
        "starting gaswatch v{}",
        env!("CARGO_PKG_VERSION")
    );

    println!("Starting gas price dashboard...");
    println!("RPC URL: {}", config.rpc_url);
    println!("Press 'q' to quit");

    let client = NodeClient::new(config.rpc_url.clone(), config.http_timeout())?;
    let rpc_label = client.base_url().to_string();
    let source: Arc<dyn GasSource> = Arc::new(client);

    let mut terminal = setup_terminal()?;
    let outcome = run(&mut terminal, &config, rpc_label, source).await;
    cleanup_terminal(&mut terminal)?;

    if let Err(err) = &outcome {
        error!("dashboard stopped: {err:#}");
    }
    outcome?;

    info!("shutting down");
    println!("Goodbye!");
    Ok(())
}

async fn run(
    terminal: &mut CrosstermTerminal,
    config: &Config,
    rpc_label: String,
    source: Arc<dyn GasSource>,
) -> Result<()> {
    let mut poller = Poller::new(
        QuerySelection::new(config.strategy, config.window),
        config.refresh_interval(),
    );
    let mut dashboard = Dashboard::new(rpc_label);
    let (tx, mut rx) = mpsc::unbounded_channel::<FetchOutcome>();

    loop {
        if let Some(ticket) = poller.poll_due(Instant::now()) {
            let source = Arc::clone(&source);
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = fetch_sample(source.as_ref(), ticket.key).await;
                // receiver only goes away on shutdown
                let _ = tx.send((ticket, result));
            });
        }

        while let Ok((ticket, result)) = rx.try_recv() {
            if let Some(sample) = poller.complete(ticket, result) {
                dashboard.apply_sample(sample);
            }
        }

        terminal.draw(|frame| dashboard.render(frame, &poller))?;

        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    dashboard.handle_key(key.code, &mut poller);
                }
            }
        }

        if dashboard.should_quit {
            break;
        }

        time::sleep(UI_TICK).await;
    }

    Ok(())
}

fn setup_terminal() -> Result<CrosstermTerminal> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn cleanup_terminal(terminal: &mut CrosstermTerminal) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}
