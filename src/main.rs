//! Notchladder CLI
//!
//! Command-line interface for the stepped-notch treatment renderer.

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::debug;

use notchladder::cli::{commands, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG still wins over the default filter
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    debug!("Notchladder v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Notchladder v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Process(args) => commands::process(&args),
        Commands::Treat(args) => commands::treat(&args),
        Commands::Params { lang, store } => commands::show_params(lang.as_deref(), &store),
    }
}
