use std::path::PathBuf;
use std::process;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use serde::Serialize;
use smp_portal::report::{
    BatchSummary, ReportRow, parse_portal_date, portal_date, rows_for_date,
};
use smp_portal::types::{BatchResult, Commodity};
use smp_portal::{BatchOrchestrator, HttpTransport, PortalConfig};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "smp-portal")]
#[command(about = "School Meal Program portal data extraction", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(
        short = 'c',
        long = "config",
        default_value = "portal.toml",
        global = true,
        help = "Path to the run configuration"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, extract every configured entity and print today's rows (default)
    Run {
        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,

        #[arg(
            long,
            value_name = "DD-MM-YYYY",
            help = "Report rows dated this day instead of today",
            value_parser = parse_date,
        )]
        date: Option<NaiveDate>,

        #[arg(long, help = "Cancel the batch after this many seconds")]
        deadline_secs: Option<u64>,
    },
    /// Check that the configured credential can log in
    TestLogin,
    /// Log in and extract a single configured entity
    Entity {
        #[arg(help = "EMIS code of the entity, as listed in the config")]
        id: String,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    parse_portal_date(s).ok_or_else(|| format!("expected DD-MM-YYYY, got '{}'", s))
}

#[derive(Serialize)]
struct RunReport<'a> {
    date: String,
    milk: Vec<ReportRow<'a>>,
    biscuit: Vec<ReportRow<'a>>,
    summary: BatchSummary,
    entities: &'a BatchResult,
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn print_rows(commodity: Commodity, date: &str, rows: &[ReportRow<'_>]) {
    if rows.is_empty() {
        println!("{} data: skipped (no data for {})", commodity, date);
        return;
    }
    println!("{} data for {}:", commodity, date);
    println!(
        "  {:<40} {:>10} {:>12} {:>12} {:>12} {:>12}",
        "EMIS - School Name", "Date", "Received", "Stock", "Consumption", "Balance"
    );
    for row in rows {
        println!(
            "  {:<40} {:>10} {:>12} {:>12} {:>12} {:>12}",
            row.entity.to_string(),
            row.record.date,
            row.record.received_quantity,
            row.record.present_stock,
            row.record.consumption,
            row.record.remaining_balance
        );
    }
}

fn cancel_on_signal(cancel: CancellationToken, deadline: Option<Duration>) {
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping batch...");
            on_ctrl_c.cancel();
        }
    });

    if let Some(deadline) = deadline {
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            log::warn!("Deadline of {}s reached, stopping batch...", deadline.as_secs());
            cancel.cancel();
        });
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    let config = PortalConfig::load(&cli.config).unwrap_or_else(|e| {
        log::error!("Error loading config: {}", e);
        process::exit(1);
    });

    let session = config.portal.open_session().unwrap_or_else(|e| {
        log::error!("Error creating session: {}", e);
        process::exit(1);
    });
    let mut orchestrator: BatchOrchestrator<HttpTransport> =
        BatchOrchestrator::new(session, config.portal.batch_options());

    let command = cli.command.unwrap_or(Commands::Run {
        format: OutputFormat::default(),
        date: None,
        deadline_secs: None,
    });

    match command {
        Commands::Run {
            format,
            date,
            deadline_secs,
        } => {
            let cancel = CancellationToken::new();
            cancel_on_signal(cancel.clone(), deadline_secs.map(Duration::from_secs));

            log::info!("Logging in to {}...", config.portal.base_url);

            let batch = orchestrator
                .run_batch(&config.credential, &config.targets, &config.filter, &cancel)
                .await
                .unwrap_or_else(|e| {
                    log::error!("{}", e);
                    process::exit(1);
                });

            let date = portal_date(date.unwrap_or_else(|| Local::now().date_naive()));
            let milk = rows_for_date(&batch, Commodity::Milk, &date);
            let biscuit = rows_for_date(&batch, Commodity::Biscuit, &date);
            let summary = BatchSummary::from_batch(&batch);

            match format {
                OutputFormat::Json => serialize_json(&RunReport {
                    date,
                    milk,
                    biscuit,
                    summary,
                    entities: &batch,
                }),
                OutputFormat::Text => {
                    print_rows(Commodity::Milk, &date, &milk);
                    println!();
                    print_rows(Commodity::Biscuit, &date, &biscuit);
                    print!("{}", summary);
                }
            }

            if !summary.is_complete() {
                log::error!(
                    "Batch cancelled: {} of {} entities not attempted",
                    summary.not_attempted,
                    summary.total
                );
                process::exit(1);
            }
        }

        Commands::TestLogin => match orchestrator.authenticate(&config.credential).await {
            Ok(()) => println!("Login test passed!"),
            Err(e) => {
                log::error!("Login test failed: {}", e);
                process::exit(1);
            }
        },

        Commands::Entity { id } => {
            let Some(entity) = config.target(&id) else {
                log::error!("Entity {} not found in config", id);
                process::exit(1);
            };

            orchestrator
                .authenticate(&config.credential)
                .await
                .unwrap_or_else(|e| {
                    log::error!("Login failed: {}", e);
                    process::exit(1);
                });

            let result = orchestrator.extract_entity(entity, &config.filter).await;
            println!("{}", result);
        }
    }
}
