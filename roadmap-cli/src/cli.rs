use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Track your progress through learning roadmaps")]
pub struct Cli {
    /// Path to the config file (defaults to ~/.roadmap-tracker.config)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Work on the local catalog only, without contacting the roadmap API
    #[clap(long, global = true)]
    pub local: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Write a default config file if none exists
    Init,
}

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Copy every stored key into another store file
    Migrate {
        /// Destination store (.yaml or .db)
        #[clap(long)]
        to: PathBuf,
    },

    /// Write every stored key to a JSON backup file
    Dump {
        /// Destination JSON file
        #[clap(long, short = 'o')]
        output: PathBuf,
    },

    /// Restore keys from a JSON backup file
    Restore {
        /// Backup file written by `db dump`
        file: PathBuf,
    },

    /// Remove locally stored data (edits to roadmap items by default)
    Clear {
        /// Clear the local catalog instead, restoring the starter items
        #[clap(long, conflicts_with = "all")]
        catalog: bool,

        /// Clear the item edits, the local catalog and the remembered roadmap
        #[clap(long)]
        all: bool,

        /// Skip confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the roadmaps offered by the API
    Roadmaps,

    /// Fetch a roadmap and merge it with local edits
    Sync {
        /// Roadmap ID to select (defaults to the remembered one)
        #[clap(long)]
        roadmap: Option<String>,
    },

    /// List items
    List {
        /// Only show items with this status (or "all")
        #[clap(long)]
        status: Option<String>,

        /// Case-insensitive search over title and description
        #[clap(long)]
        search: Option<String>,
    },

    /// Show progress statistics
    Stats,

    /// Set the status of an item
    Status {
        /// Item ID
        id: String,

        /// New status (e.g. in-progress)
        status: String,
    },

    /// Advance an item to its next status
    Cycle {
        /// Item ID
        id: String,
    },

    /// Replace the notes of an item
    Notes {
        /// Item ID
        id: String,

        /// Note text (may be empty)
        text: String,
    },

    /// Set the deadline or hour estimate of an item
    Schedule {
        /// Item ID
        id: String,

        /// Deadline as YYYY-MM-DD
        #[clap(long, conflicts_with = "clear_deadline")]
        deadline: Option<String>,

        /// Remove the deadline
        #[clap(long)]
        clear_deadline: bool,

        /// Estimated hours (1-1000)
        #[clap(long)]
        hours: Option<u32>,
    },

    /// Set one status on several items at once
    Bulk {
        /// Target status
        #[clap(long)]
        status: String,

        /// Item IDs
        #[clap(required = true)]
        ids: Vec<String>,
    },

    /// Mark every item completed
    CompleteAll {
        /// Skip confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// Reset every item to its initial status
    ResetAll {
        /// Skip confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// Start a random item that has not been started yet
    Random,

    /// Add a new item (prompts for anything missing)
    Add {
        #[clap(long)]
        title: Option<String>,

        #[clap(long)]
        description: Option<String>,

        /// low, medium or high
        #[clap(long)]
        priority: Option<String>,

        #[clap(long)]
        category: Option<String>,

        /// Estimated hours (1-1000)
        #[clap(long)]
        hours: Option<u32>,
    },

    /// Export items as a JSON array
    Export {
        /// Output file (defaults to roadmap-<date>.json)
        #[clap(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Replace all items with the contents of a JSON export
    Import {
        /// File to import
        file: PathBuf,

        /// Skip confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },

    /// Configuration management
    #[clap(subcommand)]
    Config(ConfigCommand),

    /// Store management
    #[clap(subcommand)]
    Db(DbCommand),
}
