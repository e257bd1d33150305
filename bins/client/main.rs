//! # Sales Client
//!
//! Interactive TCP client for the sales server.
//!
//! ## Features
//!
//! - Register, login and logout.
//! - Record sales events and run windowed aggregation queries.
//! - Blocking queries (`simul`, `consec`) that wait on live activity.
//! - Logging via `log` with a configurable level.
//!
//! ## Command-line Options
//! - `--server-addr` / `-s`: server address (default `127.0.0.1:12345`).
//! - `--log-level` / `-l`: Log level (`error`, `warn`, `info`, `debug`, `trace`).

use sales_server::client::SalesClient;
use sales_server::errors::CliError;

use std::io::{self, BufRead, Write};
use structopt::StructOpt;

/// Command-line options for the client
#[derive(Debug, StructOpt)]
#[structopt(name = "sales_client", about = "Interactive client for the sales server")]
struct Opt {
    /// Server address, e.g., 127.0.0.1:12345
    #[structopt(short, long, default_value = "127.0.0.1:12345")]
    server_addr: String,

    /// Log level: error, warn, info, debug, trace
    #[structopt(short, long, default_value = "info")]
    log_level: String,
}

/// Initialize the logger with a given log level
fn init_logger(level: &str) -> Result<(), io::Error> {
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
    init_logger(&opt.log_level).map_err(|e| CliError::General(e.to_string()))?;

    log::info!("Starting Sales Client");
    let client = SalesClient::connect(opt.server_addr.as_str())?;
    println!("Connected to {}. Type 'help' for commands.", opt.server_addr);

    let stdin = io::stdin();
    loop {
        print!("sales-client> ");
        io::stdout()
            .flush()
            .map_err(|e| CliError::General(e.to_string()))?;

        let mut line = String::new();
        let n = stdin
            .lock()
            .read_line(&mut line)
            .map_err(|e| CliError::General(e.to_string()))?;
        if n == 0 {
            break;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let command = parts[0].to_lowercase();
        if command == "exit" || command == "quit" {
            break;
        }

        if let Err(e) = run_command(&client, &command, &parts[1..]) {
            println!("error: {}", e);
        }
    }

    client.close();
    println!("Bye.");
    Ok(())
}

fn run_command(client: &SalesClient, command: &str, args: &[&str]) -> Result<(), CliError> {
    match command {
        "help" => {
            print_help();
            Ok(())
        }
        "register" => {
            let (user, pass) = two_args(args, "register <user> <password>")?;
            client.register(user, pass)?;
            println!("registered");
            Ok(())
        }
        "login" => {
            let (user, pass) = two_args(args, "login <user> <password>")?;
            client.login(user, pass)?;
            println!("logged in as {}", user);
            Ok(())
        }
        "logout" => {
            client.logout()?;
            println!("logged out");
            Ok(())
        }
        "add" => {
            if args.len() != 3 {
                return usage("add <product> <quantity> <price>");
            }
            let quantity = parse_arg(args[1], "quantity")?;
            let price = parse_arg(args[2], "price")?;
            client.add_event(args[0], quantity, price)?;
            println!("event recorded");
            Ok(())
        }
        "qty" => {
            let (product, days) = product_days(args, "qty <product> <days>")?;
            println!("{}", client.quantity_sold(product, days)?);
            Ok(())
        }
        "volume" => {
            let (product, days) = product_days(args, "volume <product> <days>")?;
            println!("{:.2}", client.sales_volume(product, days)?);
            Ok(())
        }
        "avg" => {
            let (product, days) = product_days(args, "avg <product> <days>")?;
            println!("{:.4}", client.average_price(product, days)?);
            Ok(())
        }
        "max" => {
            let (product, days) = product_days(args, "max <product> <days>")?;
            println!("{:.2}", client.max_price(product, days)?);
            Ok(())
        }
        "filter" => {
            if args.is_empty() {
                return usage("filter <day-offset> [product...]");
            }
            let day_offset = parse_arg(args[0], "day offset")?;
            let products: Vec<String> = args[1..].iter().map(|s| s.to_string()).collect();
            let events = client.filter_events(&products, day_offset)?;
            for event in &events {
                println!(
                    "{} x{} @ {:.2} ({})",
                    event.product, event.quantity, event.price, event.timestamp
                );
            }
            println!("{} event(s)", events.len());
            Ok(())
        }
        "simul" => {
            let (p1, p2) = two_args(args, "simul <product1> <product2>")?;
            println!("waiting...");
            let result = client.simultaneous_sales(p1, p2)?;
            println!("{}", if result { "both sold" } else { "day ended first" });
            Ok(())
        }
        "consec" => {
            if args.len() != 1 {
                return usage("consec <n>");
            }
            let n = parse_arg(args[0], "n")?;
            println!("waiting...");
            match client.consecutive_sales(n)? {
                Some(product) => println!("{} sold {} times in a row", product, n),
                None => println!("day ended first"),
            }
            Ok(())
        }
        "newday" => {
            client.new_day()?;
            println!("day rotated");
            Ok(())
        }
        other => {
            println!("Unknown command '{}'. Type 'help'.", other);
            Ok(())
        }
    }
}

fn print_help() {
    println!("register <user> <password>   create an account");
    println!("login <user> <password>      authenticate");
    println!("logout                       drop authentication");
    println!("add <product> <qty> <price>  record a sale");
    println!("qty <product> <days>         quantity sold over last N days");
    println!("volume <product> <days>      revenue over last N days");
    println!("avg <product> <days>         average price over last N days");
    println!("max <product> <days>         max price over last N days");
    println!("filter <offset> [product...] list events of one day");
    println!("simul <p1> <p2>              wait until both products sell today");
    println!("consec <n>                   wait for N consecutive sales");
    println!("newday                       rotate the current day");
    println!("exit                         leave");
}

fn two_args<'a>(args: &[&'a str], usage_text: &str) -> Result<(&'a str, &'a str), CliError> {
    if args.len() != 2 {
        return Err(CliError::General(format!("usage: {}", usage_text)));
    }
    Ok((args[0], args[1]))
}

fn product_days<'a>(args: &[&'a str], usage_text: &str) -> Result<(&'a str, i32), CliError> {
    let (product, days) = two_args(args, usage_text)?;
    Ok((product, parse_arg(days, "days")?))
}

fn parse_arg<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, CliError> {
    value
        .parse()
        .map_err(|_| CliError::General(format!("invalid {}: '{}'", what, value)))
}

fn usage(text: &str) -> Result<(), CliError> {
    Err(CliError::General(format!("usage: {}", text)))
}
