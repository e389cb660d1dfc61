use std::env;
use std::path::PathBuf;

use agrimet_core::{FieldPipeline, PipelineConfig, SqlCsvSource, WeatherPipeline};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Field survey and weather station ETL", long_about = None)]
struct Cli {
    /// Path to the pipeline configuration file
    #[arg(long, default_value = "config/pipeline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest, correct and map the field survey records
    Field,
    /// Load and classify weather station messages
    Weather(WeatherArgs),
    /// Parse the configuration and compile the measurement patterns
    CheckConfig,
}

#[derive(Args, Debug, Default)]
struct WeatherArgs {
    /// Print per-station means instead of the classified messages
    #[arg(long)]
    means: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Ok(db_path) = env::var("AGRIMET_DB_PATH") {
        info!(db_path = db_path.as_str(), "Overriding field.db_path from environment");
        config.field.db_path = db_path;
    }

    match cli.command {
        Command::Field => run_field(config).await,
        Command::Weather(args) => run_weather(config, args).await,
        Command::CheckConfig => check_config(config),
    }
}

async fn run_field(config: PipelineConfig) -> Result<()> {
    let pipeline = FieldPipeline::new(config.field, SqlCsvSource::new());
    let df = pipeline.process().await.context("field pipeline failed")?;
    println!("{df}");
    Ok(())
}

async fn run_weather(config: PipelineConfig, args: WeatherArgs) -> Result<()> {
    let pipeline = WeatherPipeline::new(config.weather, SqlCsvSource::new())?;
    let processed = pipeline.process().await.context("weather pipeline failed")?;

    if args.means {
        let means = pipeline.calculate_means(&processed)?;
        println!("{means}");
    } else {
        println!("{processed}");
    }
    Ok(())
}

fn check_config(config: PipelineConfig) -> Result<()> {
    let log_filter = config.log_filter();
    let pipeline = WeatherPipeline::new(config.weather, SqlCsvSource::new())?;
    let labels: Vec<&str> = pipeline.matcher().labels().collect();

    if config.field.values_to_rename.is_empty() {
        warn!("field.values_to_rename is empty; categorical values will pass through unchanged");
    }

    println!("Field source:      {}", config.field.db_path);
    println!("Station mapping:   {}", config.field.weather_mapping_csv);
    println!(
        "Column swap:       {} <-> {}",
        config.field.columns_to_swap.first, config.field.columns_to_swap.second
    );
    println!("Value renames:     {}", config.field.values_to_rename.len());
    println!("Weather source:    {}", pipeline.config().weather_csv_path);
    println!("Patterns (ordered): {}", labels.join(", "));
    println!("Log filter:        {log_filter}");
    Ok(())
}
