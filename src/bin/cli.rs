//! Durasave CLI
//!
//! Command-line front end for saving and loading records, plus the score
//! counter the game demo persists.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use durasave::config::{BackendKind, BackupScope, FrameFormat};
use durasave::{Config, Record, SaveGame, Store};
use tracing_subscriber::{fmt, EnvFilter};

/// Durasave CLI
#[derive(Parser, Debug)]
#[command(name = "durasave-cli")]
#[command(about = "Crash-tolerant save data store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./durasave_data")]
    data_dir: PathBuf,

    /// Storage backend
    #[arg(short, long, value_enum, default_value_t = Backend::Local)]
    backend: Backend,

    /// Store payloads without the checksummed frame
    #[arg(long)]
    raw: bool,

    /// Keep a single backup.dat shared by all slots
    #[arg(long)]
    shared_backup: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Backend {
    /// Plain files with staged, renamed commits
    Local,

    /// Mounted save container with platform backup
    Container,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Save a file's contents into a slot
    Save {
        /// Slot name
        slot: String,

        /// File whose bytes become the record
        file: PathBuf,
    },

    /// Load a slot and print (or write out) its bytes
    Load {
        /// Slot name
        slot: String,

        /// Write the record here instead of printing it
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show or change the saved score
    Score {
        #[command(subcommand)]
        action: ScoreAction,

        /// Slot holding the score
        #[arg(short, long, default_value = "save.dat")]
        slot: String,
    },

    /// Delete a slot
    Delete {
        /// Slot name
        slot: String,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ScoreAction {
    /// Print the saved score
    Show,

    /// Increase the saved score by one
    Inc,

    /// Decrease the saved score by one (not below zero)
    Dec,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,durasave=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("Durasave CLI v{}", durasave::VERSION);
    tracing::info!("Data directory: {}", args.data_dir.display());

    // Build config from args
    let mut builder = Config::builder().data_dir(&args.data_dir).backend(match args.backend {
        Backend::Local => BackendKind::LocalFile,
        Backend::Container => BackendKind::MountedContainer,
    });
    if args.raw {
        builder = builder.frame_format(FrameFormat::Raw);
    }
    if args.shared_backup {
        builder = builder.backup_scope(BackupScope::Shared);
    }

    let mut store = Store::new(builder.build());
    if !store.initialize() {
        tracing::error!("Failed to initialize store");
        process::exit(1);
    }

    let ok = run(&mut store, args.command);
    store.shutdown();

    if !ok {
        process::exit(1);
    }
}

fn run(store: &mut Store, command: Commands) -> bool {
    match command {
        Commands::Save { slot, file } => {
            let bytes = match fs::read(&file) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!("Cannot read {}: {}", file.display(), e);
                    return false;
                }
            };

            let outcome = store.save_with_outcome(&Record::new(bytes), &slot);
            println!("{:?}", outcome);
            outcome.is_success()
        }

        Commands::Load { slot, out } => {
            let (record, report) = store.load_with_report(&slot);
            if !record.is_valid() {
                eprintln!(
                    "Could not load '{}': {}",
                    slot,
                    report.failure.as_deref().unwrap_or("no data")
                );
                return false;
            }

            if report.restored_from_backup {
                eprintln!("Primary was damaged; loaded backup generation");
            }

            match out {
                Some(path) => match fs::write(&path, record.bytes()) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!("Cannot write {}: {}", path.display(), e);
                        false
                    }
                },
                None => {
                    println!("{}", String::from_utf8_lossy(record.bytes()));
                    true
                }
            }
        }

        Commands::Score { action, slot } => run_score(store, action, &slot),

        Commands::Delete { slot } => store.delete(&slot),
    }
}

fn run_score(store: &mut Store, action: ScoreAction, slot: &str) -> bool {
    let record = store.load(slot);
    let mut game = if record.is_valid() {
        match SaveGame::from_record(&record) {
            Ok(game) => game,
            Err(e) => {
                tracing::error!("Slot '{}' does not hold a score: {}", slot, e);
                return false;
            }
        }
    } else {
        SaveGame::default()
    };

    match action {
        ScoreAction::Show => {
            println!("score: {}", game.score);
            return true;
        }
        ScoreAction::Inc => game.increment(),
        ScoreAction::Dec => game.decrement(),
    }

    let record = match game.to_record() {
        Ok(record) => record,
        Err(e) => {
            tracing::error!("Failed to encode score: {}", e);
            return false;
        }
    };

    if store.save(&record, slot) {
        println!("score: {}", game.score);
        true
    } else {
        eprintln!("Failed to save score");
        false
    }
}
