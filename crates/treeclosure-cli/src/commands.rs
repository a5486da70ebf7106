use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "treeclosure")]
#[command(about = "Resumable filesystem scanner with a closure-table index", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start (or restart) a scan job; defaults to the configured root_path
    Start { root: Option<PathBuf> },
    /// Process one chunk of the running scan if its continuation is due
    Chunk {
        /// Process a chunk even if the continuation is not due yet
        #[arg(long)]
        force: bool,
    },
    /// Start a scan and keep processing chunks until it completes
    Run { root: Option<PathBuf> },
    /// Show the scan status
    Status,
    /// Print a subtree of the last scan
    Tree {
        /// Subtree root; defaults to the scan root
        #[arg(long)]
        id: Option<i64>,
        /// Maximum depth below the subtree root
        #[arg(long)]
        depth: Option<u32>,
        /// Print nested JSON instead of an indented listing
        #[arg(long)]
        nested: bool,
    },
    /// Search persisted nodes by path (SQL LIKE wildcards allowed)
    Search {
        query: String,
        #[arg(long)]
        exact: bool,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Write a subtree as CSV
    Export {
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        id: Option<i64>,
    },
    /// Print configuration values
    PrintConfig,
    /// Truncate all database tables
    TruncateDb,
}
