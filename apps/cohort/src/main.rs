//! # Cohort - Metadata Repository Server
//!
//! The main binary for a Cohort repository member.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for repository administration
//! - Archive load and export
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      apps/cohort (THE BINARY)                   │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────┐     │
//! │  │   CLI       │    │   HTTP API  │    │  Config + Node   │     │
//! │  │  (clap)     │    │   (axum)    │    │  (toml, stores)  │     │
//! │  └──────┬──────┘    └──────┬──────┘    └────────┬─────────┘     │
//! │         │                  │                    │               │
//! │         └──────────────────┼────────────────────┘               │
//! │                            ▼                                    │
//! │                    ┌───────────────┐                            │
//! │                    │  cohort-core  │                            │
//! │                    │  (THE LOGIC)  │                            │
//! │                    └───────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! cohort -T demos/types.json server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! cohort status
//! cohort load -f demos/archive.json
//! cohort export -o backup.json
//! ```

use clap::Parser;
use cohort::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // COHORT_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("COHORT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cohort=info,cohort_core=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Cohort startup banner.
fn print_banner() {
    println!(
        r#"
   ██████╗ ██████╗ ██╗  ██╗ ██████╗ ██████╗ ████████╗
  ██╔════╝██╔═══██╗██║  ██║██╔═══██╗██╔══██╗╚══██╔══╝
  ██║     ██║   ██║███████║██║   ██║██████╔╝   ██║
  ██║     ██║   ██║██╔══██║██║   ██║██╔══██╗   ██║
  ╚██████╗╚██████╔╝██║  ██║╚██████╔╝██║  ██║   ██║
   ╚═════╝ ╚═════╝ ╚═╝  ╚═╝ ╚═════╝ ╚═╝  ╚═╝   ╚═╝

  Metadata Repository v{}

  Homed • Replicated • Audited
"#,
        env!("CARGO_PKG_VERSION")
    );
}
