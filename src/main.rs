//! Terminal entry point for the circulation tracker.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use circulate::{
    ledger::Ledger,
    menu::Menu,
    model::Document,
    observers::{CirculationNotifier, EventLogger},
    store::DocumentStore,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "circulate", version, about = "Library catalog and circulation tracker")]
struct Args {
    /// Path of the catalog document
    #[arg(long, default_value = "library.json")]
    data_file: PathBuf,

    /// Directory for rotating backup snapshots
    #[arg(long, default_value = "backups")]
    backup_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let default_filter = if args.verbose { "circulate=debug" } else { "circulate=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = DocumentStore::new(args.data_file, args.backup_dir);
    let doc = match store.load() {
        Ok(Some(doc)) => doc,
        Ok(None) => {
            println!("No catalog at {} yet; starting fresh", store.data_path().display());
            Document::default()
        }
        Err(err) => {
            // Refusing to continue protects the on-disk document from
            // being clobbered by an empty session.
            eprintln!("{} {err}", "FATAL:".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let mut ledger = Ledger::new(doc);
    ledger.register_observer(Box::new(EventLogger));
    ledger.register_observer(Box::new(CirculationNotifier));

    let mut menu = Menu::new(ledger, store);
    match menu.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} terminal failure: {err}", "FATAL:".red().bold());
            ExitCode::FAILURE
        }
    }
}
