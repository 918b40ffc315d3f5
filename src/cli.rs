use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// docflow: document approval workflow service
#[derive(Parser)]
#[command(name = "docflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind (overrides DOCFLOW_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Apply database migrations and exit
    Migrate,

    /// Work with organization seed files
    Seed {
        #[command(subcommand)]
        command: SeedCommands,
    },

    /// Print a document's audit history
    History {
        document_id: String,
        /// Skip this many entries
        #[arg(long, default_value = "0")]
        offset: i64,
    },
}

#[derive(Subcommand)]
pub enum SeedCommands {
    /// Validate a seed file without starting the server
    Check { file: PathBuf },
}
