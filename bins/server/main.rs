//! # Sales Server
//!
//! TCP server for sales-event ingestion and windowed aggregation queries.
//!
//! ## Features
//! - Binary framed protocol with per-connection request multiplexing.
//! - Daily time series with a bounded memory window and disk-backed history.
//! - Admin console on stdin: `newday`, `stats`, `save`, `help`, `quit`.
//! - State is loaded from the data directory on start and saved on exit.
//!
//! ## Command-line Options
//! - `--addr` / `-a`: TCP listen address (default `127.0.0.1:12345`).
//! - `--data-dir` / `-d`: Directory for persisted state (default `data`).
//! - `--max-days` / `-D`: Historical days kept on disk.
//! - `--memory-days` / `-S`: Completed days kept in memory (also the
//!   aggregation cache bound). Must not exceed `--max-days`.
//! - `--workers` / `-w`: Worker thread count.
//! - `--log-level` / `-l`: Log level (`error`, `warn`, `info`, `debug`, `trace`).

use sales_server::aggregation::AggregationService;
use sales_server::auth::AuthStore;
use sales_server::errors::CliError;
use sales_server::persistence::Persistence;
use sales_server::tcp_server::{SalesServer, ServerState};
use sales_server::time_series::TimeSeries;
use sales_server::worker_pool::WorkerPool;

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use structopt::StructOpt;

/// Command-line options for the sales server
#[derive(Debug, StructOpt)]
#[structopt(name = "sales_server", about = "TCP server for sales events and aggregations")]
struct Opt {
    /// TCP listen address, e.g., 127.0.0.1:12345
    #[structopt(short, long, default_value = "127.0.0.1:12345")]
    addr: String,

    /// Directory for persisted state
    #[structopt(short, long, default_value = "data")]
    data_dir: String,

    /// Historical days retained on disk (D)
    #[structopt(short = "D", long, default_value = "30")]
    max_days: usize,

    /// Completed days kept in memory and cache entry bound (S)
    #[structopt(short = "S", long, default_value = "7")]
    memory_days: usize,

    /// Worker thread count
    #[structopt(short, long, default_value = "8")]
    workers: usize,

    /// Log level: error, warn, info, debug, trace
    #[structopt(short, long, default_value = "info")]
    log_level: String,
}

/// Initializes the logger using env_logger with the given level
fn init_logger(level: &str) -> Result<(), CliError> {
    let mut builder = env_logger::Builder::new();

    let log_level = match level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    builder.filter_level(log_level);
    builder.format_timestamp_micros();
    builder.format_module_path(false);
    builder.format_target(false);
    builder.init();

    Ok(())
}

fn main() -> Result<(), CliError> {
    let opt = Opt::from_args();
    init_logger(&opt.log_level)?;

    log::info!("Starting Sales Server");
    log::debug!("Command line options: {:?}", opt);

    // Load persisted state; corrupt files abort startup loudly.
    let persistence = Persistence::new(&opt.data_dir);
    let series = TimeSeries::load(opt.max_days, opt.memory_days, persistence.clone())
        .map_err(|e| CliError::General(format!("Failed to load time series: {}", e)))?;
    let series = Arc::new(series);

    let auth = Arc::new(AuthStore::new());
    let users = persistence.load_users()?;
    let user_count = users.len();
    for user in users {
        auth.register_prehashed(user);
    }
    log::info!(
        "Loaded {} users, current day {}, {} historical days",
        user_count,
        series.current_day_id(),
        series.historical_day_count()
    );

    let state = Arc::new(ServerState {
        auth,
        series: Arc::clone(&series),
        aggregation: Arc::new(AggregationService::new(
            Arc::clone(&series),
            opt.memory_days,
        )),
        pool: Arc::new(WorkerPool::new(opt.workers)),
        persistence,
    });

    let server = SalesServer::bind(&opt.addr, Arc::clone(&state))?;
    log::info!(
        "Listening on {} (D={}, S={}, workers={})",
        opt.addr,
        opt.max_days,
        opt.memory_days,
        opt.workers
    );

    // Accept loop runs in the background; this thread serves the console.
    std::thread::spawn(move || {
        if let Err(e) = server.start() {
            log::error!("Server loop terminated: {}", e);
        }
    });

    println!("Commands: newday | stats | save | help | quit");
    run_console(&state)?;

    log::info!("Shutting down");
    state.save_all()?;
    // Worker threads die with the process; joining them here could wait
    // forever on a client still parked in a blocking query.
    log::info!("Server shutdown complete");
    Ok(())
}

/// Reads admin commands from stdin until `quit`.
fn run_console(state: &Arc<ServerState>) -> Result<(), CliError> {
    let stdin = io::stdin();

    loop {
        print!("sales-server> ");
        io::stdout()
            .flush()
            .map_err(|e| CliError::General(e.to_string()))?;

        let mut line = String::new();
        let n = stdin
            .lock()
            .read_line(&mut line)
            .map_err(|e| CliError::General(e.to_string()))?;
        if n == 0 {
            // stdin closed; treat as quit.
            return Ok(());
        }

        match line.trim().to_lowercase().as_str() {
            "" => {}
            "newday" => match state.rotate_day() {
                Ok(new_id) => {
                    if let Err(e) = state.save_all() {
                        log::error!("Save after rotation failed: {}", e);
                    }
                    println!("New day started: {}", new_id);
                }
                Err(e) => println!("Day rotation failed: {}", e),
            },
            "stats" => print_stats(state),
            "save" => match state.save_all() {
                Ok(()) => println!("State saved."),
                Err(e) => println!("Save failed: {}", e),
            },
            "help" => print_help(),
            "quit" | "exit" => return Ok(()),
            other => println!("Unknown command '{}'. Type 'help'.", other),
        }
    }
}

fn print_stats(state: &ServerState) {
    println!("=== Server Statistics ===");
    println!("Registered users:  {}", state.auth.user_count());
    println!("Current day:       {}", state.series.current_day_id());
    println!("Events today:      {}", state.series.current_day_event_count());
    println!(
        "Historical days:   {}/{}",
        state.series.historical_day_count(),
        state.series.max_days()
    );
    println!(
        "Aggregation cache: {}/{}",
        state.aggregation.cache_len(),
        state.aggregation.cache_capacity()
    );
}

fn print_help() {
    println!("newday  - complete the current day and start the next one");
    println!("stats   - show server statistics");
    println!("save    - persist users and state now");
    println!("help    - show this help");
    println!("quit    - save and shut down");
}
