//! Main module for the assessment recommender CLI application (arec).
//!
//! This module provides the main function for the CLI application. It handles
//! command parsing, configuration loading, and initialization, and invokes the
//! appropriate functionality based on the provided command-line arguments.
//!
//! # Examples
//!
//! Building the catalog/index pair from a scraped catalog:
//!
//! ```sh
//! arec build --catalog scraped_assessments.json
//! ```
//!
//! Asking for recommendations:
//!
//! ```sh
//! arec recommend "Java developer who can collaborate with business teams" -k 5
//! ```

use assessment_recommender::{
    catalog::CatalogStore,
    commands::{Cli, Commands},
    config::{self, RecommenderConfig},
    config_dir,
    embedding::Embedder,
    enhance::GeminiEnhancer,
    recommend::RecommendationService,
    setup::{self, ArtifactPaths},
};
use clap::Parser;
use once_cell::sync::OnceCell;
use std::{error::Error, fs};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

/// Main asynchronous function of the arec CLI application.
///
/// Parses command-line arguments, loads configuration, and executes the
/// requested command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the catalog/index pair
/// cannot be built or loaded, or the request itself is invalid.
async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config_dir()?.join("config.yaml"),
    };
    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::load_config_or_default(&config_path)?,
    };
    config.fill_missing_credential(cli.api_key);
    debug!("Config loaded from {}: {:?}", config_path.display(), redacted(&config));

    let paths = ArtifactPaths::from_config(&config);

    match cli.command {
        Commands::Build { catalog } => {
            let store = CatalogStore::load(&catalog)?;
            info!("Loaded {} scraped assessments from {}", store.len(), catalog.display());
            let embedder = Embedder::from_config(&config);
            let report = setup::build_artifacts(&store, &embedder, &paths).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Recommend { query, k, enhance } => {
            let service = RecommendationService::from_config(&config);
            service.load(&paths)?;
            let k = k.unwrap_or(service.default_k());
            let mut response = service.respond(&query, k).await?;
            if enhance {
                if let Some(enhancer) = GeminiEnhancer::from_config(&config) {
                    response = enhancer.enhance(response, &query).await;
                }
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Health => {
            let service = RecommendationService::from_config(&config);
            if let Err(err) = service.load(&paths) {
                info!("Catalog/index pair not loaded: {err}");
            }
            println!("{}", serde_json::to_string_pretty(&service.health())?);
        }
        Commands::Init => init()?,
    }

    Ok(())
}

fn redacted(config: &RecommenderConfig) -> RecommenderConfig {
    RecommenderConfig {
        embedding_api_key: config.embedding_api_key.as_ref().map(|_| "<redacted>".into()),
        ..config.clone()
    }
}

/// Writes a default `config.yaml` into the application's config directory.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file written.
fn init() -> Result<(), Box<dyn Error>> {
    let config_dir = config_dir()?;
    info!("Creating config directory: {}", config_dir.display());
    fs::create_dir_all(&config_dir)?;

    let config_path = config_dir.join("config.yaml");
    info!("Creating config file: {}", config_path.display());
    let config_yaml = serde_yaml::to_string(&RecommenderConfig::default())?;
    fs::write(config_path, config_yaml)?;

    Ok(())
}
