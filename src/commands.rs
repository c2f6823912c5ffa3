//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use assessment_recommender::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Recommend { query, k, .. } => println!("{query} (k = {k:?})"),
//!     _ => {}
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Config file to use instead of `<config dir>/config.yaml`.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Gemini credential, used when the config sets no `embedding_api_key`.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Embed a scraped catalog and write the catalog/index pair.
    #[clap(name = "build", alias = "b")]
    Build {
        /// JSON array of scraped catalog records.
        #[arg(long)]
        catalog: PathBuf,
    },

    /// Recommend assessments for a job description or role title.
    #[clap(name = "recommend", alias = "r")]
    Recommend {
        /// The job description or role title.
        query: String,

        /// Number of recommendations; defaults to `default_k` from the config.
        #[arg(short = 'k', long)]
        k: Option<usize>,

        /// Ask the Gemini model for a summary, per-assessment notes and a
        /// suggested order. Needs a credential; falls back to plain results.
        #[arg(long)]
        enhance: bool,
    },

    /// Report whether the catalog/index pair loads.
    Health,

    /// Write a default config file into the config directory.
    Init,
}
