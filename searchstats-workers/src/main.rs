use anyhow::Result;
use clap::{Parser, Subcommand};
use searchstats_workers::config::WorkerConfig;
use searchstats_workers::{collector, popular_hour, shutdown, top_queries};

#[derive(Parser)]
#[command(name = "searchstats", about = "Search telemetry aggregation pipeline")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect raw telemetry and publish framed batches to the log
    Collector,
    /// Consume the log and maintain the top queries per search category
    TopQueries,
    /// Consume the log and maintain the most popular search hour
    PopularHour,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = WorkerConfig::from_env()?;
    let shutdown = shutdown::install();

    match cli.command {
        Commands::Collector => collector::run(config, shutdown).await,
        Commands::TopQueries => top_queries::run(config, shutdown).await,
        Commands::PopularHour => popular_hour::run(config, shutdown).await,
    }
}
