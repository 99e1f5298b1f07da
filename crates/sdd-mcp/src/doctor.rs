//! Read-only startup diagnostics, run by the operator invoking `sdd-mcp
//! doctor` directly — never invoked by the MCP peer over the wire.

use crate::config::ProcessConfig;
use std::path::Path;

pub fn run_doctor(data_dir_override: Option<&Path>) -> anyhow::Result<()> {
    println!("=== Platform ===");
    print_platform_info();

    println!("\n=== Configuration ===");
    let cfg = ProcessConfig::load()?;
    let db_path = cfg.resolved_db_path(data_dir_override);
    println!("data directory: {}", db_path.parent().map(|p| p.display().to_string()).unwrap_or_default());
    println!("default mode:   {:?}", cfg.default_mode);

    println!("\n=== Database ===");
    match sdd_store::open(&db_path) {
        Ok(conn) => {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM observation WHERE deleted_at IS NULL", [], |r| r.get(0))
                .unwrap_or(0);
            println!("ok: {} ({count} active observation(s))", db_path.display());
        }
        Err(e) => println!("FAILED to open {}: {e}", db_path.display()),
    }

    println!("\n=== Project root ===");
    match sdd_config::find_project_root(&std::env::current_dir()?) {
        Ok(root) => println!("resolved: {}", root.display()),
        Err(_) => println!("not inside a project (no sdd/sdd.json found above the current directory)"),
    }

    Ok(())
}

fn print_platform_info() {
    println!("os:      {}", std::env::consts::OS);
    println!("arch:    {}", std::env::consts::ARCH);
    println!("version: {}", env!("CARGO_PKG_VERSION"));
}
