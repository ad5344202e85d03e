use djapi::accessor::RecordAccessor;
use djapi::config::{ConnectionConfig, DEFAULT_CONFIG_PATH};
use djapi::core::Result;
use std::process::ExitCode;
use tracing::info;

const USAGE: &str = "usage: djapi [CONFIG_PATH] [SQL]";

fn main() -> ExitCode {
    // Initialize the logging system using tracing subscriber
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().skip(1).any(|a| a == "-h" || a == "--help") {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }
    if args.len() > 3 {
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    }

    let config_path = args.get(1).map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH);
    info!("Starting djapi with configuration {}", config_path);
    let config = ConnectionConfig::instance_from_file(config_path);

    let mut accessor = RecordAccessor::from_config(config);
    if !accessor.is_connected() {
        eprintln!(
            "Failed to connect to '{}' using driver '{}'",
            config.url(),
            config.driver()
        );
        return ExitCode::FAILURE;
    }
    println!("Connected to {}", config.url());

    if let Some(sql) = args.get(2) {
        match run_query(&mut accessor, sql) {
            Ok(count) => println!("({} rows)", count),
            Err(e) => {
                eprintln!("Query failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

/// Runs `sql` and prints the rows tab-separated, header first
fn run_query(accessor: &mut RecordAccessor, sql: &str) -> Result<usize> {
    accessor.try_prepare(sql)?;
    let mut count = 0;
    if accessor.try_execute_query()?.has_rows() {
        let columns = accessor.column_names();
        println!("{}", columns.join("\t"));
        loop {
            let row = columns
                .iter()
                .map(|c| accessor.column_value(c).map(|v| v.to_string()))
                .collect::<Result<Vec<_>>>()?;
            println!("{}", row.join("\t"));
            count += 1;
            if !accessor.try_advance_cursor()? {
                break;
            }
        }
    }
    accessor.release_all();
    Ok(count)
}
