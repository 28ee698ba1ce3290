//! procstore CLI
//!
//! Runs the schema migration and data repair pass of the process engine's
//! persistence layer, or reports where each repository stands.

use clap::{Parser, Subcommand};
use procstore_core::logging_facility::{init, Profile};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "procstore")]
#[command(about = "procstore - store migrations and data repairs", long_about = None)]
struct Cli {
    /// Emit JSON logs instead of human-readable ones
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending migrations and run one-time repairs
    Migrate(commands::StoreArgs),
    /// List applied and pending migration units per repository
    Status(commands::StoreArgs),
}

fn main() {
    let cli = Cli::parse();
    init(if cli.json_logs {
        Profile::Production
    } else {
        Profile::Development
    });

    let result = match cli.command {
        Commands::Migrate(args) => commands::migrate::execute(args),
        Commands::Status(args) => commands::status::execute(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
