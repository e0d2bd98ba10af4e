use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod backend;
mod controller;
mod dispatcher;
mod domain;
mod inputter;
mod model;
mod query;
mod resolver;
mod sync;
mod table;
mod ui;
mod view_state;

use controller::Controller;
use domain::{DEFAULT_SERVER_URL, SheetConfig, SheetError};
use model::{Model, Status};
use ui::TableUI;

/// Browse a spreadsheet that lives on a server, one page at a time.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Base url of the spreadsheet server
    #[arg(short, long, default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// Spreadsheet to upload right after start
    #[arg(short, long)]
    upload: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Event poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll: u64,

    /// Number of concurrent requests
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Write logs to this file (the terminal belongs to the UI)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// More logging, repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn config(&self) -> SheetConfig {
        SheetConfig::default()
            .with_server_url(self.server.as_str())
            .with_request_timeout(Duration::from_secs(self.timeout))
            .with_event_poll_time(self.poll)
            .with_workers(self.workers)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(&args) {
        eprintln!("Error: could not open log file: {e}");
        return ExitCode::FAILURE;
    }

    let result = run(&args);
    ratatui::restore();
    match result {
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn init_logging(args: &Args) -> Result<(), SheetError> {
    let Some(path) = &args.log_file else {
        return Ok(());
    };
    let file = File::create(path)?;
    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sheetview={default_level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_thread_names(true),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(args: &Args) -> Result<(), SheetError> {
    let cfg = args.config();
    info!("Starting sheetview with {cfg:?}");

    let mut model = Model::init(&cfg)?;
    let mut ui = TableUI::new(&cfg);
    let controller = Controller::new(&cfg);

    if let Some(path) = &args.upload {
        model.upload_path(path)?;
    }

    let mut terminal = ratatui::init();

    while model.status != Status::QUITTING {
        model.poll();

        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }

    info!("Bye");
    Ok(())
}
