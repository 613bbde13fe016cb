//! # Cohort CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show repository identity, capabilities and metrics
//! - `init` - Initialize a new empty store
//! - `load` - Load an instance archive as reference copies
//! - `export` - Export non-deleted instances to an archive
//! - `show` - Print one entity or relationship
//! - `types` - List the loaded type definitions

mod commands;

use crate::config::{CohortConfig, StorageBackend};
use clap::{Parser, Subcommand};
use cohort_core::CohortError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Cohort - a federated metadata repository member
///
/// Holds a share of a cohort's instance graph: locally homed instances plus
/// reference copies of instances homed at peers.
#[derive(Parser, Debug)]
#[command(name = "cohort")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: ./cohort.toml when present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the instance store, overriding the configuration
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "memory", "file" (snapshot) or "redb" (ACID database)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<StorageBackend>,

    /// JSON type definitions, overriding the configuration
    #[arg(short = 'T', long, global = true)]
    pub types: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show repository status
    Status,

    /// Initialize a new empty store
    Init {
        /// Force initialization even if the store exists
        #[arg(short, long)]
        force: bool,
    },

    /// Load an instance archive as reference copies
    Load {
        /// Archive file (JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// Acting user recorded on the copies
        #[arg(short, long, default_value = "cohort-admin")]
        user: String,

        /// Expected BLAKE3 hash of the archive
        #[arg(long)]
        hash: Option<String>,
    },

    /// Export non-deleted instances to an archive
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Archive name
        #[arg(short, long, default_value = "cohort-export")]
        name: String,

        /// Archive description
        #[arg(long)]
        description: Option<String>,
    },

    /// Print one entity or relationship
    Show {
        /// Instance guid
        guid: String,

        /// Acting user
        #[arg(short, long, default_value = "cohort-admin")]
        user: String,
    },

    /// List the loaded type definitions
    Types,
}

impl Cli {
    /// Resolve the effective configuration: file, environment, then flags.
    pub fn resolve_config(&self) -> Result<CohortConfig, CohortError> {
        let mut config = CohortConfig::load(self.config.as_deref())?;
        config.apply_env()?;
        if let Some(path) = &self.database {
            config.storage.path = path.clone();
        }
        if let Some(backend) = self.backend {
            config.storage.backend = backend;
        }
        if let Some(types) = &self.types {
            config.types_file = Some(types.clone());
        }
        Ok(config)
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CohortError> {
    let mut config = cli.resolve_config()?;
    let json_mode = cli.json_mode;

    if cli.verbose {
        tracing::debug!(?config, "Effective configuration");
    }

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(&config).await
        }
        Some(Commands::Status) => cmd_status(&config, json_mode),
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Load { file, user, hash }) => {
            cmd_load(&config, json_mode, &file, &user, hash.as_deref())
        }
        Some(Commands::Export {
            output,
            name,
            description,
        }) => cmd_export(&config, &output, &name, description.as_deref()),
        Some(Commands::Show { guid, user }) => cmd_show(&config, &guid, &user),
        Some(Commands::Types) => cmd_types(&config, json_mode),
        None => {
            // No subcommand - show status by default
            cmd_status(&config, json_mode)
        }
    }
}
