//! LabelDB CLI
//!
//! Command-line interface to a label index directory:
//! - Label records and set their timestamps
//! - Remove labels or whole records
//! - Run queries
//! - Inspect labels and statistics

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use labeldb::config::{generate_default_config, Config, LoggingConfig};
use labeldb::human_time;
use labeldb::query::{resolve_date, MatchResults, Rounding};
use labeldb::LabelIndex;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "labeldb")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Embedded label index with a boolean/date query language")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Index directory (overrides the config file)
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    /// Config file (default: ~/.config/labeldb/config.toml or ./labeldb.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Label a record and set its timestamp
    Set {
        /// Record id
        id: u32,
        /// Timestamp (default: now). "now", a partial date like 2019.6.5-12:30, or a raw number
        #[arg(short, long)]
        time: Option<String>,
        /// Labels to add
        labels: Vec<String>,
    },

    /// Remove a label from records
    Remove {
        label: String,
        #[arg(required = true)]
        ids: Vec<u32>,
    },

    /// Forget records: all labels and the timestamp
    Clear {
        #[arg(required = true)]
        ids: Vec<u32>,
    },

    /// Run a query, e.g. `find "a, b <2019"`
    Find {
        /// Query text; several arguments are joined with spaces
        #[arg(required = true)]
        query: Vec<String>,
    },

    /// List known labels
    Labels,

    /// First record id without a timestamp
    NextId,

    /// Show index statistics
    Stats,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);

    if let Some(dir) = cli.dir {
        config.index.data_dir = dir;
    }
    let index = LabelIndex::open(config.index).await?;
    let result = run(&index, cli.command, cli.format).await;
    index.close().await?;
    result
}

async fn run(index: &LabelIndex, command: Commands, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        Commands::Set { id, time, labels } => {
            let timestamp = parse_time(time.as_deref())?;
            index.set(id, timestamp, labels.as_slice()).await?;
            println!("Set record {} at {}", id, format_time(timestamp));
        }
        Commands::Remove { label, ids } => {
            index.remove_labels(&label, &ids).await?;
            println!("Removed {:?} from {} records", label, ids.len());
        }
        Commands::Clear { ids } => {
            index.clear(&ids).await?;
            println!("Cleared {} records", ids.len());
        }
        Commands::Find { query } => {
            let query = query.join(" ");
            let results = index.find(&query).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
                OutputFormat::Table => print_results(index, &results).await,
            }
        }
        Commands::Labels => {
            let labels = index.labels().await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&labels)?),
                OutputFormat::Table => {
                    for label in labels {
                        println!("{}", label);
                    }
                }
            }
        }
        Commands::NextId => println!("{}", index.first_unused_index().await),
        Commands::Stats => {
            let stats = index.stats().await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Table => println!("{}", stats),
            }
        }
        Commands::Config { .. } => {}
    }
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("labeldb={}", logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so query output stays clean
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn parse_time(text: Option<&str>) -> anyhow::Result<i64> {
    match text {
        None | Some("now") => Ok(human_time::now()),
        Some(s) if s.len() > 8 && s.chars().all(|c| c.is_ascii_digit()) => {
            Ok(human_time::from_parts(human_time::parts_of(s.parse()?)))
        }
        Some(s) => match resolve_date(s, Rounding::Down) {
            Some(t) => Ok(t),
            None => bail!("Invalid timestamp: {}. Use e.g. 2019.6.5-12:30 or now", s),
        },
    }
}

fn format_time(t: i64) -> String {
    human_time::to_naive(t)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| t.to_string())
}

async fn print_results(index: &LabelIndex, results: &MatchResults) {
    if results.is_empty() {
        println!("No matches");
        return;
    }

    println!("{:<10} | {}", "Id", "Timestamp");
    println!("{}", "-".repeat(36));
    for &id in &results.ids {
        let time = index
            .timestamp(id)
            .await
            .map(format_time)
            .unwrap_or_else(|| "-".to_string());
        println!("{:<10} | {}", id, time);
    }

    println!();
    println!("{:<20} | {}", "Label", "Matches");
    println!("{}", "-".repeat(30));
    for (label, count) in &results.counts_per_label {
        println!("{:<20} | {}", label, count);
    }
    println!("\n{} matches", results.len());
}
