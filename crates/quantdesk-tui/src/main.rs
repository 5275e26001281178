mod app;
mod handler;
mod input;
mod logging;
mod tui;
mod ui;

use std::time::Duration;
use anyhow::Result;
use quantdesk_core::Config;
use tracing::{info, warn};
use app::App;
use tui::EventHandler;

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = logging::init(&Config::config_dir()?)?;

    let config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "could not read config, using defaults");
        Config::default()
    });
    info!(agent = %config.agent_url, market = %config.market_url, "starting quantdesk");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, config).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, config: Config) -> Result<()> {
    let mut app = App::new(config)?;
    app.start();

    let mut events = EventHandler::new(Duration::from_millis(300));

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(&mut app, event)?;
        app.poll_tasks().await;
    }

    Ok(())
}
