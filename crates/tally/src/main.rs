//! Tally: live view of an item collection
//!
//! Main binary with subcommands:
//! - `watch`: Keep a sorted view of the store on screen
//! - `add`: Create an item and show the refreshed view
//! - `remove`: Destroy an item by id
//! - `query`: Filtered read, optionally comparing the fast and authoritative paths
//! - `demo`: Run the whole pipeline against an in-memory store

use clap::{Args, Parser, Subcommand};
use miette::Result;
use tally_store::{Direction, Field, OrderBy};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod demo;

/// Parse `field[:asc|desc]` into an ordering key.
fn parse_order(s: &str) -> Result<OrderBy, String> {
    let (field, direction) = s.split_once(':').unwrap_or((s, "asc"));
    let field: Field = field.parse()?;
    let direction = match direction.to_lowercase().as_str() {
        "asc" => Direction::Asc,
        "desc" => Direction::Desc,
        other => {
            return Err(format!(
                "invalid direction '{}', expected asc or desc",
                other
            ));
        }
    };
    Ok(OrderBy { field, direction })
}

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Live, sorted view of an item collection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the item store lives.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Base URL of the item store
    #[arg(long, env = "TALLY_STORE_URL")]
    pub store_url: String,

    /// Resource (collection) name
    #[arg(long, env = "TALLY_RESOURCE", default_value = "items")]
    pub resource: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the collection, printing every new snapshot
    Watch {
        #[command(flatten)]
        store: StoreArgs,

        /// Only track items of this function
        #[arg(long)]
        function: Option<String>,

        /// Refresh interval in seconds
        #[arg(long, default_value = "10")]
        interval: u64,

        /// Print snapshots as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create an item
    Add {
        #[command(flatten)]
        store: StoreArgs,

        /// Item name
        #[arg(long)]
        name: String,

        /// Item weight
        #[arg(long)]
        weight: f64,

        /// Function id
        #[arg(long)]
        function: String,

        /// Print the refreshed view as JSON
        #[arg(long)]
        json: bool,
    },

    /// Destroy an item
    Remove {
        #[command(flatten)]
        store: StoreArgs,

        /// Id of the item to destroy
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Run a filtered read
    Query {
        #[command(flatten)]
        store: StoreArgs,

        /// Only items of this function id
        #[arg(long)]
        function: Option<String>,

        /// Only items whose name contains this text (case-insensitive)
        #[arg(long)]
        name_contains: Option<String>,

        /// Ordering, as field[:asc|desc]; may be repeated
        #[arg(long, value_parser = parse_order)]
        order_by: Vec<OrderBy>,

        /// Skip this many items
        #[arg(long)]
        offset: Option<usize>,

        /// Return at most this many items
        #[arg(long)]
        limit: Option<usize>,

        /// Load the collection first and print both the fast and the
        /// authoritative answer
        #[arg(long)]
        compare: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Exercise the pipeline against an in-memory store
    Demo {
        /// Simulated store latency in milliseconds
        #[arg(long, default_value = "50")]
        latency_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tally=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            store,
            function,
            interval,
            json,
        } => commands::watch(&store, function, interval, json).await,

        Commands::Add {
            store,
            name,
            weight,
            function,
            json,
        } => commands::add(&store, name, weight, function, json).await,

        Commands::Remove { store, id } => commands::remove(&store, &id).await,

        Commands::Query {
            store,
            function,
            name_contains,
            order_by,
            offset,
            limit,
            compare,
            json,
        } => {
            let query = commands::build_query(function, name_contains, order_by, offset, limit);
            commands::query(&store, query, compare, json).await
        }

        Commands::Demo { latency_ms } => demo::run(latency_ms).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_order() {
        assert_eq!(
            parse_order("weight:desc"),
            Ok(OrderBy {
                field: Field::Weight,
                direction: Direction::Desc,
            })
        );
        assert_eq!(
            parse_order("name"),
            Ok(OrderBy {
                field: Field::Name,
                direction: Direction::Asc,
            })
        );
        assert!(parse_order("weight:sideways").is_err());
        assert!(parse_order("colour").is_err());
    }

    #[test]
    fn test_query_arguments() {
        let cli = Cli::try_parse_from([
            "tally",
            "query",
            "--store-url",
            "http://localhost:3000",
            "--function",
            "f1",
            "--order-by",
            "weight:desc",
            "--order-by",
            "name",
            "--limit",
            "5",
        ])
        .unwrap();

        match cli.command {
            Commands::Query {
                store,
                function,
                order_by,
                limit,
                ..
            } => {
                assert_eq!(store.resource, "items");
                assert_eq!(function.as_deref(), Some("f1"));
                assert_eq!(order_by.len(), 2);
                assert_eq!(limit, Some(5));
            }
            _ => panic!("expected query command"),
        }
    }
}
