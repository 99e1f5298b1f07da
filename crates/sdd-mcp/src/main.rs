mod catalog;
mod cli;
mod config;
mod dispatch;
mod doctor;
mod instructions;
mod rpc;

use clap::Parser;
use cli::{Cli, Commands};
use config::ProcessConfig;
use sdd_tools::ToolContext;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("fatal startup error: {e:#}");
            eprintln!("error: {e:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve => {
            let cfg = ProcessConfig::load()?;
            let db_path = cfg.resolved_db_path(cli.data_dir.as_deref());
            let cwd = std::env::current_dir()?;
            let ctx = ToolContext::open(&db_path, &cwd)?;
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            rpc::run(ctx, stdin.lock(), stdout.lock())?;
            Ok(())
        }
        Commands::Doctor => doctor::run_doctor(cli.data_dir.as_deref()),
    }
}
