//! PCS command-line driver
//!
//! Runs queries, metadata lookups and ingests through the external store
//! tools and prints the normalized JSON result to stdout.

use pcs_driver::config::{ComponentFactory, DriverConfig};
use pcs_driver::metadata::TableRef;
use pcs_driver::query::QuerySpec;
use pcs_driver::telemetry::Telemetry;
use pcs_driver::{Error, PcsDriver};

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::io::Read;
use tracing::info;

/// PCS Driver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level
    #[arg(long, global = true, default_value = "info", env = "PCS_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a JSON query spec
    Query {
        /// Table to query (defaults to PCS_DEFAULT_TABLE)
        #[arg(long)]
        table: Option<String>,

        /// Query spec file, or - for stdin
        #[arg(long, default_value = "-")]
        spec: String,

        /// Accepted and ignored
        #[arg(long)]
        unweight: bool,
    },

    /// List tables
    Tables,

    /// Show a table's columns
    Columns { table: String },

    /// Show a table's raw statistics
    Stats { table: String },

    /// Ingest newline-delimited JSON records into DATASET.SUBSET
    Ingest {
        #[arg(long)]
        dataset: String,

        #[arg(long)]
        subset: String,

        /// Records file, or - for stdin
        #[arg(default_value = "-")]
        input: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let _telemetry = Telemetry::init_for_component("pcs", &args.log_level)?;

    let driver = ComponentFactory::create_driver(DriverConfig::from_env()?);
    let result = execute(&driver, args.command).await;
    driver.shutdown().await;

    let output = result?;
    println!("{output}");
    Ok(())
}

async fn execute(driver: &PcsDriver, command: Command) -> pcs_driver::Result<String> {
    match command {
        Command::Query {
            table,
            spec,
            unweight,
        } => {
            let table = TableRef::from(table.unwrap_or_else(|| driver.default_table().to_string()));
            let spec: QuerySpec = serde_json::from_str(&read_input(&spec)?)?;
            let output = driver.run(&table, &spec, unweight).await?;
            info!(rows = output.len(), "Query complete");
            render(&output)
        }
        Command::Tables => render(&driver.get_tables().await?),
        Command::Columns { table } => {
            let columns = driver.get_columns(&TableRef::from(table)).await?;
            render(&columns[..])
        }
        Command::Stats { table } => render(&driver.get_stats(&TableRef::from(table)).await?),
        Command::Ingest {
            dataset,
            subset,
            input,
        } => {
            let records = parse_records(&read_input(&input)?)?;
            driver.add_samples(&dataset, &subset, &records).await?;
            render(&serde_json::json!({
                "table": format!("{dataset}.{subset}"),
                "records": records.len(),
            }))
        }
    }
}

fn read_input(source: &str) -> pcs_driver::Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(source)?)
    }
}

/// One JSON document per non-blank line.
fn parse_records(input: &str) -> pcs_driver::Result<Vec<Value>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .map_err(|e| Error::Parse(format!("record on line {}: {e}", n + 1)))
        })
        .collect()
}

fn render<T: Serialize + ?Sized>(value: &T) -> pcs_driver::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
