//! meter-report - monthly energy consumption report from meter readings

use anyhow::{Context, Result};
use clap::{error::ErrorKind, CommandFactory, Parser};
use meter_report::{generate_report, ReportConfig};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "meter-report")]
#[command(
    version,
    about = "Builds a PDF report of monthly energy consumption from spreadsheet meter readings"
)]
struct Cli {
    /// Input spreadsheet with the meter readings (xlsx)
    #[arg(short, long, required_unless_present = "print_config_schema")]
    input: Option<PathBuf>,

    /// Output PDF file
    #[arg(short, long, default_value = "report.pdf")]
    output: PathBuf,

    /// Log every pipeline stage at debug level
    #[arg(short, long)]
    debug: bool,

    /// JSON configuration; fields it omits keep their built-in defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the JSON schema of the configuration file and exit
    #[arg(long)]
    print_config_schema: bool,
}

fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = Cli::command().print_help();
            println!();

            eprintln!("error: {}", argument_error_message(&e.to_string()));
            process::exit(2);
        }
    }
}

/// Clap's error text without its `error: ` prefix and the usage block that
/// follows it; the help is printed separately.
fn argument_error_message(rendered: &str) -> String {
    let lines: Vec<&str> = rendered
        .lines()
        .take_while(|line| !line.starts_with("Usage:"))
        .collect();

    lines
        .join("\n")
        .trim_start_matches("error: ")
        .trim_end()
        .to_string()
}

fn setup_logging(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = parse_args();

    if cli.print_config_schema {
        let schema = ReportConfig::schema_as_json().context("Failed to serialize config schema")?;
        println!("{}", schema);
        return Ok(());
    }

    setup_logging(cli.debug);

    let config = match &cli.config {
        Some(path) => ReportConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ReportConfig::default(),
    };

    let input = cli
        .input
        .as_deref()
        .context("--input is required")?;
    let today = chrono::Local::now().date_naive();

    generate_report(&config, input, &cli.output, today).with_context(|| {
        format!(
            "Failed to build report from {} into {}",
            input.display(),
            cli.output.display()
        )
    })?;

    tracing::info!("Done: {}", cli.output.display());
    Ok(())
}
