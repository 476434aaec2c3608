use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod charts;
mod config;
mod dates;
mod delivery;
mod error;
mod models;
mod pipeline;
mod publish;
mod report;
mod retention;
mod scheduler;
mod source;
mod store;
mod trends;

use config::Settings;
use delivery::TelegramConfig;
use source::SourceFormat;

#[derive(Parser)]
#[command(name = "donation-pulse")]
#[command(about = "Daily blood donation trends and donor retention reports", long_about = None)]
struct Cli {
    /// Donations dataset: http(s) URL or local path
    #[arg(long, global = true, default_value = config::DEFAULT_DONATIONS_URL)]
    donations: String,
    #[arg(long, global = true, value_enum)]
    donations_format: Option<SourceFormat>,
    /// Donor visit dataset: http(s) URL or local path
    #[arg(long, global = true, default_value = config::DEFAULT_VISITS_URL)]
    visits: String,
    #[arg(long, global = true, value_enum)]
    visits_format: Option<SourceFormat>,
    /// Regions of interest, comma separated
    #[arg(long, global = true, value_delimiter = ',')]
    regions: Vec<String>,
    #[arg(long, global = true, default_value = config::DEFAULT_OUT_DIR)]
    out_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, compute, write and deliver all reports once
    Run {
        /// Reference date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        as_of: Option<String>,
        /// Only write reports, never send them
        #[arg(long)]
        no_deliver: bool,
    },
    /// Run the pipeline every day at a fixed local time
    Schedule {
        #[arg(long, default_value = config::DEFAULT_SCHEDULE)]
        at: String,
    },
    /// Print trend reports for the selected regions
    Trends {
        #[arg(long)]
        as_of: Option<String>,
        /// Print JSON instead of Markdown
        #[arg(long)]
        json: bool,
    },
    /// Print the yearly donor retention report
    Retention {
        #[arg(long)]
        json: bool,
    },
}

fn reference_date(as_of: Option<&str>) -> anyhow::Result<NaiveDate> {
    match as_of {
        Some(raw) => Ok(dates::parse_reference_date(raw)?),
        None => Ok(Local::now().date_naive()),
    }
}

fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;
    Ok(())
}

/// Delivery credentials for commands that send reports. Missing credentials
/// only skip delivery; a half-configured pair is an error.
fn delivery_config() -> anyhow::Result<Option<TelegramConfig>> {
    let telegram = TelegramConfig::from_env()?;
    if telegram.is_none() {
        info!("Telegram credentials not set; reports will only be written");
    }
    Ok(telegram)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_logging()?;
    let cli = Cli::parse();

    let settings = Settings::new(
        &cli.donations,
        cli.donations_format,
        &cli.visits,
        cli.visits_format,
        cli.regions,
        cli.out_dir,
    )?;
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Run { as_of, no_deliver } => {
            let as_of = reference_date(as_of.as_deref())?;
            let telegram = if no_deliver { None } else { delivery_config()? };
            let written = pipeline::execute(&client, &settings, telegram.as_ref(), as_of).await?;
            println!(
                "Wrote {} files to {}.",
                written,
                settings.out_dir.display()
            );
        }
        Commands::Schedule { at } => {
            let at = config::parse_schedule_time(&at)?;
            let telegram = delivery_config()?;
            info!(%at, regions = settings.regions.len(), "starting daily schedule");
            let client = &client;
            let settings = &settings;
            let telegram = telegram.as_ref();
            scheduler::run_daily(at, move |as_of| async move {
                pipeline::execute(client, settings, telegram, as_of)
                    .await
                    .map(|_| ())
            })
            .await?;
        }
        Commands::Trends { as_of, json } => {
            let as_of = reference_date(as_of.as_deref())?;
            let output = pipeline::compute(&client, &settings, as_of).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output.trends)?);
            } else {
                for trends in &output.trends {
                    println!("{}", report::build_trend_report(trends));
                }
            }
        }
        Commands::Retention { json } => {
            let output = pipeline::compute(&client, &settings, Local::now().date_naive()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output.retention)?);
            } else {
                println!("{}", report::build_retention_report(&output.retention));
            }
            if !output.rejections.is_empty() {
                println!("{} rows rejected.", output.rejections.len());
            }
        }
    }

    Ok(())
}
