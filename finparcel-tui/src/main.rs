//! Terminal dashboard that aggregates Posti and Matkahuolto shipments into one list.

mod app;
mod config;
mod input;
mod ui;

use std::{fs, io, sync::Arc, time::Duration as StdDuration};

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use finparcel_core::{
    AggregationPipeline, CarrierRegistry, ReqwestTransport, RunConfig, RunOutcome, Transport,
};
use finparcel_provider_matkahuolto as matkahuolto;
use finparcel_provider_posti as posti;
use ratatui::{Terminal, backend::CrosstermBackend};
use reqwest::Client;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::config::AppConfig;
use crate::input::Action;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    let _log_guard = init_logging(&config)?;
    config.log_origin();

    // HTTP + pipeline setup
    let client = Client::builder().user_agent("finparcel/0.1").build()?;
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(client));

    let plugins = vec![
        posti::plugin(Arc::clone(&transport)),
        matkahuolto::plugin(transport),
    ];
    let registry = Arc::new(CarrierRegistry::new(plugins));
    let pipeline = Arc::new(AggregationPipeline::new(registry));
    let run_config = Arc::new(config.run_config());

    let app = App::new(&config, pipeline.carriers());

    let (outcome_tx, outcome_rx) = unbounded_channel();
    let scheduler = Runner {
        pipeline,
        run_config,
        outcomes: outcome_tx,
    };
    let schedule = tokio::spawn(scheduler.clone().every(config.update_interval()));

    // Terminal init
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run event loop
    let res = run(&mut terminal, app, &scheduler, outcome_rx);

    schedule.abort();

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    info!("finparcel stopped");
    res
}

/// Log to a daily file; the terminal belongs to the dashboard.
fn init_logging(config: &AppConfig) -> Result<WorkerGuard> {
    fs::create_dir_all(&config.log_dir)?;
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("finparcel")
        .filename_suffix("log")
        .build(&config.log_dir)?;
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

#[derive(Clone)]
struct Runner {
    pipeline: Arc<AggregationPipeline>,
    run_config: Arc<RunConfig>,
    outcomes: UnboundedSender<RunOutcome>,
}

impl Runner {
    /// Start a run in the background; overlapping triggers are dropped by the pipeline.
    fn trigger(&self) {
        let runner = self.clone();
        tokio::spawn(async move {
            let outcome = runner.pipeline.run(&runner.run_config).await;
            if matches!(outcome, RunOutcome::Skipped) {
                return;
            }
            // Receiver is gone once the dashboard quits
            let _sent = runner.outcomes.send(outcome);
        });
    }

    async fn every(self, period: StdDuration) {
        // First tick fires immediately
        let mut ticker = tokio::time::interval(period);
        while !self.outcomes.is_closed() {
            ticker.tick().await;
            debug!("Scheduled refresh");
            self.trigger();
        }
    }
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut app: App,
    runner: &Runner,
    mut outcomes: UnboundedReceiver<RunOutcome>,
) -> Result<()> {
    loop {
        while let Ok(outcome) = outcomes.try_recv() {
            if !app.apply(outcome) {
                debug!("Parcel data unchanged");
            }
        }
        app.is_refreshing = runner.pipeline.is_running();

        // Draw current UI
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Poll for input (non-blocking, small timeout to keep CPU low)
        if event::poll(StdDuration::from_millis(100))?
            && let CEvent::Key(key) = event::read()?
        {
            match input::handle_key_event(key, &mut app) {
                Action::Quit => break,
                Action::Refresh => {
                    info!("Manual refresh requested");
                    runner.trigger();
                }
                Action::None => {}
            }
        }
    }

    Ok(())
}
