use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// Strongbox: a document vault with expiring, access-limited share links.
#[derive(Debug, Parser)]
#[command(name = "strongbox", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "STRONGBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// More log output (repeatable)
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            (false, 2) => "debug",
            (false, _) => "trace",
        }
    }
}

#[derive(Debug, Args)]
pub struct Credentials {
    /// Account email address
    #[arg(long)]
    pub email: String,

    /// Account password
    #[arg(long, env = "STRONGBOX_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    /// Session token from `strongbox login`
    #[arg(long, env = "STRONGBOX_TOKEN", hide_env_values = true)]
    pub token: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an account
    Register {
        #[command(flatten)]
        credentials: Credentials,
        /// Display name
        #[arg(long)]
        full_name: String,
    },
    /// Sign in and print a session token
    Login {
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Print a fresh token for a still-valid session
    Refresh {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Show the account behind a session token
    Whoami {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Upload a file
    Upload {
        #[command(flatten)]
        session: SessionArgs,
        /// File to upload
        path: PathBuf,
        /// Stored filename (defaults to the file's own name)
        #[arg(long)]
        name: Option<String>,
        /// Media type, e.g. `application/pdf`
        #[arg(long)]
        mime_type: String,
    },
    /// List your documents, oldest first
    List {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Show one document's metadata
    Info {
        #[command(flatten)]
        session: SessionArgs,
        document: Uuid,
    },
    /// Write a document's contents to a file or stdout
    Download {
        #[command(flatten)]
        session: SessionArgs,
        document: Uuid,
        /// Destination file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a document and every share of it
    Delete {
        #[command(flatten)]
        session: SessionArgs,
        document: Uuid,
    },
    /// Share links
    Share {
        #[command(subcommand)]
        command: ShareCommand,
    },
    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Check that the store, cache and blob backend are reachable
    Health,
}

#[derive(Debug, Subcommand)]
pub enum ShareCommand {
    /// Create a share link for one of your documents
    Create {
        #[command(flatten)]
        session: SessionArgs,
        document: Uuid,
        /// Days until the link expires
        #[arg(long)]
        days: Option<i64>,
        /// Hours until the link expires (added to --days; 24 hours when both are omitted)
        #[arg(long)]
        hours: Option<i64>,
        /// Maximum number of accesses, -1 for unlimited
        #[arg(long, allow_negative_numbers = true)]
        max_access: Option<i64>,
        /// Require this password to open the link
        #[arg(long)]
        password: Option<String>,
    },
    /// Open a share link
    Access {
        token: String,
        /// Share password, if the link has one
        #[arg(long)]
        password: Option<String>,
        /// Destination file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Drop every cached share
    PurgeShares,
}
