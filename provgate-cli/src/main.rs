//! provgate command-line tool
//!
//! Usage:
//!   provgate analyze app.py
//!   provgate check --manifest manifest.json package nginx
//!   provgate pull-binary --manifest manifest.json traefik /usr/local/bin/traefik

use anyhow::Result;
use clap::Parser;
use provgate_cli::{execute, Cli};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    // Logs go to stderr; stdout carries results only.
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let code = execute(cli, &mut std::io::stdout().lock(), &mut std::io::stderr().lock())?;
    std::process::exit(code);
}
