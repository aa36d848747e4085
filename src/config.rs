use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reading tracker with catalog lookup and a shared leaderboard.
#[derive(Parser, Debug, Clone)]
#[command(name = "booktrack-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "BOOKTRACK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Search the catalog.
    Search {
        /// Free-text query.
        query: String,
    },

    /// Add a book to the library.
    Add {
        /// Where the book comes from.
        #[command(subcommand)]
        source: AddCommand,
    },

    /// List library books.
    List {
        /// Filter by status: want, reading or completed.
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by title/author substring.
        #[arg(long)]
        search: Option<String>,
    },

    /// Show one book in detail.
    Show {
        /// Book id or title fragment.
        book: String,
    },

    /// Record reading progress.
    Progress {
        /// Book id or title fragment.
        book: String,

        /// Set the current page.
        #[arg(short, long, conflicts_with = "advance")]
        page: Option<u32>,

        /// Advance by this many pages instead.
        #[arg(short, long)]
        advance: Option<u32>,
    },

    /// Edit book fields.
    Edit {
        /// Book id or title fragment.
        book: String,

        /// New title.
        #[arg(long)]
        title: Option<String>,

        /// Comma-separated author list.
        #[arg(long)]
        authors: Option<String>,

        /// New page count.
        #[arg(long)]
        pages: Option<u32>,

        /// New ISBN.
        #[arg(long)]
        isbn: Option<String>,
    },

    /// Remove a book and its progress.
    Remove {
        /// Book id or title fragment.
        book: String,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show aggregate reading statistics.
    Stats,

    /// Show or edit the profile.
    Profile {
        /// New display name.
        #[arg(long)]
        name: Option<String>,

        /// New email.
        #[arg(long)]
        email: Option<String>,
    },

    /// Show the shared leaderboard.
    Leaderboard {
        /// Keep watching for remote changes.
        #[arg(short, long)]
        watch: bool,
    },

    /// Export all data as JSON.
    Export {
        /// Output file (stdout if omitted).
        path: Option<PathBuf>,
    },

    /// Import a JSON backup.
    Import {
        /// Backup file to read.
        path: PathBuf,
    },

    /// Delete all local data.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Push current stats to the leaderboard now.
    Sync,

    /// Initialize store and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Where a new book comes from.
#[derive(Subcommand, Debug, Clone)]
pub enum AddCommand {
    /// Search the catalog and add one result.
    Search {
        /// Free-text query.
        query: String,

        /// 1-based result number to add.
        #[arg(short, long, default_value = "1")]
        pick: usize,
    },

    /// Look up a book by ISBN and add it.
    Isbn {
        /// ISBN-10 or ISBN-13, separators allowed.
        isbn: String,
    },

    /// Enter a book by hand.
    Manual {
        /// Book title.
        #[arg(long)]
        title: String,

        /// Author (repeat for multiple authors).
        #[arg(long)]
        author: Vec<String>,

        /// Page count (0 if unknown).
        #[arg(long, default_value = "0")]
        pages: u32,

        /// ISBN, separators allowed.
        #[arg(long, default_value = "")]
        isbn: String,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Store configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Catalog service configuration.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Leaderboard sync configuration.
    #[serde(default)]
    pub leaderboard: LeaderboardConfig,
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite store file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("booktrack").join("library.db"))
        .unwrap_or_else(|| PathBuf::from("data/library.db"))
}

/// Catalog service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the catalog service.
    #[serde(default = "default_catalog_url")]
    pub url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
        }
    }
}

fn default_catalog_url() -> String {
    "https://openlibrary.org".to_string()
}

/// Leaderboard sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaderboardConfig {
    /// Base URL of the shared store; unset runs local-only.
    #[serde(default)]
    pub url: Option<String>,
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("booktrack.toml"),
            dirs::config_dir()
                .map(|p| p.join("booktrack").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/booktrack/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# booktrack-rs configuration

[database]
# path = "/home/me/.local/share/booktrack/library.db"

[catalog]
# Book metadata service
url = "https://openlibrary.org"

[leaderboard]
# Shared leaderboard store (Firebase-style realtime database).
# Leave unset to keep everything local-only.
# url = "https://my-readers.firebaseio.com"
"#
        .to_string()
    }
}
