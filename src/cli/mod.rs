use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "dws-test-driver")]
#[command(about = "Mock DWS driver that reports Workflow progress from #DW directives")]
#[command(long_about = "Mock DWS driver that watches Workflow resources and updates its own driver \
                       status entries according to the #DW directive each entry points at \
                       (action=complete, action=wait, action=error).")]
pub struct Cli {
    /// Configuration file (defaults to ./dws-test-driver.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured driver identity
    #[arg(long, global = true)]
    pub driver_id: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the controller until interrupted, against the cluster or a seeded in-memory store
    Run {
        /// JSON file holding an array of Workflows; runs offline against an in-memory store
        #[arg(long)]
        workflows: Option<PathBuf>,
    },
    /// Reconcile each Workflow in a file once and print the results as JSON
    Reconcile {
        /// JSON file holding an array of Workflows
        #[arg(long)]
        workflows: PathBuf,
    },
    /// Parse a single #DW directive and print its arguments as JSON
    Parse {
        /// Directive line, e.g. "#DW Proposal action=complete"
        directive: String,
    },
}
