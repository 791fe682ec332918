use std::path::PathBuf;

use clap::{Parser, Subcommand};
use telemetry_ledger::{ledger::Aggregate, sensor::MeasurementKind};

#[derive(Debug, Parser)]
#[command(version, about = "Batches sensor telemetry and commits it to the ledger")]
pub struct Args {
    #[arg(long, env = "TELEMETRY_LEDGER_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(long, env = "TELEMETRY_LEDGER_LOG", default_value = "info")]
    pub log_level: String,

    /// Use an in-process ledger instead of the configured endpoint
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Accept sensor connections and submit batches (default)
    Serve,

    /// Register configured sensors that the ledger does not know yet
    Register,

    /// Ask the ledger for an aggregate over a sensor's measurements
    Query {
        #[arg(long)]
        sensor: String,

        #[arg(long)]
        kind: MeasurementKind,

        #[arg(long, default_value = "max")]
        aggregate: Aggregate,

        #[arg(long)]
        start: u64,

        #[arg(long)]
        end: u64,
    },
}
