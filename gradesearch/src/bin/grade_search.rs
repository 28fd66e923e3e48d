//! Command-line front end for the grade search engine.
//!
//! Usage:
//!     grade-search --db grades.sqlite search "CS 1301"
//!     grade-search --db grades.sqlite autocomplete chem
//!     grade-search --db grades.sqlite rebuild-index

use anyhow::Context;
use clap::{Parser, Subcommand};
use gradesearch::api::{autocomplete_endpoint, search_endpoint, ApiResponse};
use gradesearch::database::Database;
use gradesearch::indexer::rebuild_search_index;
use gradesearch::{GradeStore, SearchConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "grade-search", about = "Search courses, professors and departments")]
struct Cli {
    /// Grade database path
    #[arg(long, env = "GRADE_SEARCH_DB")]
    db: PathBuf,

    /// JSON file overriding search settings
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a search and print the JSON response
    Search {
        /// Query text; omit to see the missing-parameter response
        query: Option<String>,
    },
    /// Run an autocomplete lookup and print the JSON response
    Autocomplete { query: Option<String> },
    /// Recreate the full-text index from primary storage
    RebuildIndex,
}

fn print_response(response: &ApiResponse) -> anyhow::Result<()> {
    let headers: serde_json::Map<String, serde_json::Value> = response
        .headers
        .iter()
        .map(|(name, value)| (name.to_string(), serde_json::Value::String(value.clone())))
        .collect();
    let printed = serde_json::json!({
        "status": response.status,
        "headers": headers,
        "body": response.body,
    });
    println!("{}", serde_json::to_string_pretty(&printed)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SearchConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SearchConfig::default(),
    };

    match cli.command {
        Command::RebuildIndex => {
            let db = Database::open(&cli.db)
                .with_context(|| format!("failed to open {}", cli.db.display()))?;
            let stats = rebuild_search_index(&db).context("failed to rebuild search index")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Search { query } => {
            let store = GradeStore::open(&cli.db, config)?;
            print_response(&search_endpoint(&store, query.as_deref()).await)?;
        }
        Command::Autocomplete { query } => {
            let store = GradeStore::open(&cli.db, config)?;
            print_response(&autocomplete_endpoint(&store, query.as_deref()).await)?;
        }
    }
    Ok(())
}
