//! Scriptura CLI
//!
//! Offline tooling over serialized book scripts: verse lookup, quote chain
//! inspection, and replay of user decisions between two parses of a book.

mod cli;
mod commands;
mod error;
mod logging;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;
    if cli.verbose {
        tracing::debug!("Verbose mode enabled");
    }

    match cli.command {
        Some(cmd) => execute_command(cmd, cli.json),
        None => {
            println!("{} Scriptura CLI", "scriptura".green().bold());
            println!();
            println!("Run {} for available commands.", "scriptura --help".cyan());
            Ok(())
        }
    }
}

fn execute_command(cmd: Commands, json: bool) -> Result<()> {
    match cmd {
        Commands::Verse {
            book,
            chapter,
            verse,
        } => commands::run_verse(&book, chapter, verse, json),
        Commands::Chains { book } => commands::run_chains(&book, json),
        Commands::Replay {
            source,
            target,
            out,
            config,
        } => commands::run_replay(&source, &target, out.as_deref(), config.as_deref(), json),
    }
}
