use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "taskhub",
    version,
    about = "Task and user management REST API",
    after_help = "\
CONFIGURATION:
  Read from the environment (or a .env file), overridden by flags:
    HOST, PORT, DATABASE_PATH, CORS_ORIGIN (comma list), RUST_LOG

EXIT CODES:
  0  Success
  1  Error (configuration, database, bind failure)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and its tables
    Init {
        /// Database file (default: DATABASE_PATH or ./taskhub.db)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Run the HTTP server
    #[command(after_help = "\
ROUTES:
  /health, /api, /api/tasks[...], /api/users[...]
  Shuts down gracefully on SIGINT/SIGTERM.")]
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Database file
        #[arg(long)]
        db: Option<PathBuf>,
    },
}
