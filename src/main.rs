pub mod types;
pub mod config;
pub mod error;
pub mod week;
pub mod fetch;
pub mod parse;
pub mod data;
pub mod render;
pub mod pipeline;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the choropleth map for a report week and open it
    Generate {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Report date (YYYY-MM-DD); defaults to 16 days ago
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Leave out the COVID-19 map
        #[arg(long)]
        no_covid: bool,
        /// Leave out the influenza map
        #[arg(long)]
        no_flu: bool,
        /// Scale colours to each disease's own maximum instead of the fixed ceiling
        #[arg(long)]
        data_driven_scale: bool,
        /// Write the HTML file without launching a browser
        #[arg(long)]
        no_open: bool,
    },
    /// Print the parsed series for a report week as CSV
    Series {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
}

fn report_date(date: Option<NaiveDate>) -> NaiveDate {
    date.unwrap_or_else(|| week::default_report_date(Local::now().date_naive()))
}

async fn execute(command: Commands) -> anyhow::Result<String> {
    match command {
        Commands::Generate { config, date, no_covid, no_flu, data_driven_scale, no_open } => {
            let mut app_config = config::AppConfig::load(config.as_deref())?;
            if no_open {
                app_config.output.open_browser = false;
            }

            let request = types::MapRequest {
                date: report_date(date),
                include_covid: !no_covid,
                include_flu: !no_flu,
                fixed_scale_max: !data_driven_scale,
            };
            let outcome = pipeline::run(&request, &app_config).await?;
            Ok(outcome.message)
        }
        Commands::Series { config, date } => {
            let app_config = config::AppConfig::load(config.as_deref())?;
            let report = pipeline::fetch_report(report_date(date), &app_config).await?;

            println!("{}", report.period);
            pipeline::write_series_csv(&report, std::io::stdout().lock())?;
            if report.covid.is_none() {
                tracing::warn!("no COVID-19 data available");
            }
            Ok(String::new())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match execute(cli.command).await {
        Ok(message) => {
            if !message.is_empty() {
                println!("{}", message);
            }
        }
        Err(e) => {
            println!("{:#}", e);
            std::process::exit(1);
        }
    }
}
