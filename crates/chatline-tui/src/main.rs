use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use chatline_core::{Config, ModeToggle};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod handler;
mod tui;
mod ui;
mod view;

use app::App;
use handler::handle_event;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "chatline")]
#[command(about = "Terminal chat client for a streaming chat backend")]
struct Cli {
    /// Chat backend base URL
    #[arg(long, env = "CHATLINE_ENDPOINT")]
    endpoint: Option<String>,

    /// Model to start with
    #[arg(short, long, env = "CHATLINE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Render markdown to HTML with copy buttons and exit
    Render {
        /// Markdown file; stdin when omitted
        path: Option<PathBuf>,
    },
}

/// Markdown rendered as a reply would be, with the highlight theme of the
/// configured mode.
fn render_html(config: &Config, source: &str) -> String {
    let mode = ModeToggle::new(config.mode());
    let pipeline = app::build_pipeline(&mode);
    app::render_static(&pipeline, source).to_html()
}

/// Log to a file under the config dir; stderr belongs to the terminal UI.
fn init_logging() -> Result<()> {
    let dir = Config::config_dir()?;
    std::fs::create_dir_all(&dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("chatline.log"))?;

    let filter = EnvFilter::try_from_env("CHATLINE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_logging() {
        eprintln!("chatline: logging disabled: {e}");
    }

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not load config, using defaults");
        Config::new()
    });
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = Some(endpoint);
    }

    if let Some(Command::Render { path }) = cli.command {
        let source = match path {
            Some(path) => std::fs::read_to_string(path)?,
            None => io::read_to_string(io::stdin())?,
        };
        print!("{}", render_html(&config, &source));
        return Ok(());
    }

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = EventHandler::new();
    let mut app = App::new(&config, cli.model, events.sender());
    app.check_health();
    tracing::info!(endpoint = app.endpoint(), model = app.selector.value(), "chatline started");

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::render(app, frame))?;

        let Some(event) = events.next().await else {
            break;
        };
        handle_event(app, event)?;

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_html_adds_copy_buttons() {
        let html = render_html(&Config::new(), "Run:\n\n```sh\nls\n```\n");
        assert!(html.starts_with("<p>Run:</p>\n"));
        assert!(html.contains("<code class=\"language-sh\">"));
        assert_eq!(html.matches("class=\"copy-btn\"").count(), 1);
    }

    #[test]
    fn test_render_subcommand_parses() {
        let cli = Cli::try_parse_from(["chatline", "render", "notes.md"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Render { path: Some(ref p) }) if p == &PathBuf::from("notes.md")
        ));
    }
}
