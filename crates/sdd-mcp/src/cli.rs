use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sdd-mcp", version, about = "Spec-driven-development MCP companion server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the resolved data directory (for the observation database).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the stdio JSON-RPC loop for an MCP peer.
    Serve,
    /// Run read-only startup diagnostics.
    Doctor,
}
