//! ghgraph - source GitHub GraphQL data into an entity graph
//!
//! ## Commands
//!
//! - `source`: run every configured provider and write the resulting graph
//! - `check`: validate a configuration without touching the network

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ghgraph_core::telemetry::init_tracing;
use ghgraph_core::{
    Collaborators, Credential, GithubGraphqlClient, ProviderCatalog, ProviderOptions,
    QueryClient, RunHooks, RunReport, SourceConfig, SourceEngine, TypeRegistry, TypeTable,
};
use ghgraph_discussions::{DiscussionsOptions, DiscussionsProvider};
use graph_store::{EntityRecord, MemoryEntityStore, MemorySchemaDeclarator, StoreFileDeriver};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "ghgraph")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Aggregate GitHub GraphQL data into typed, linked entities", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sourcing pass and write the entity graph as JSON
    Source {
        /// Configuration file (.toml, or JSON for any other extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Default token, overriding the one in the configuration
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// GraphQL endpoint
        #[arg(long, env = "GHGRAPH_GRAPHQL_ENDPOINT", default_value = GithubGraphqlClient::DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Output path for the graph snapshot (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration and print the resolved type names
    Check {
        /// Configuration file (.toml, or JSON for any other extension)
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Everything a sourcing pass produced.
#[derive(Debug, Serialize)]
struct GraphSnapshot {
    report: RunReport,
    entities: Vec<EntityRecord>,
    declarations: Vec<String>,
}

/// Result of `check`.
#[derive(Debug, Serialize)]
struct CheckOutput {
    providers: Vec<String>,
    types: TypeTable,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Source {
            config,
            token,
            endpoint,
            output,
        } => cmd_source(&config, token, &endpoint, output.as_deref()).await,
        Commands::Check { config } => {
            let checked = cmd_check(&config)?;
            println!("{}", serde_json::to_string_pretty(&checked)?);
            Ok(())
        }
    }
}

fn catalog() -> ProviderCatalog {
    ProviderCatalog::new().with(Arc::new(DiscussionsProvider::new()))
}

fn load_config(path: &Path, token: Option<String>) -> Result<SourceConfig> {
    let mut config = SourceConfig::from_path(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        config.credential = Some(Credential::new(token));
    }
    Ok(config)
}

/// Run a sourcing pass
async fn cmd_source(
    config_path: &Path,
    token: Option<String>,
    endpoint: &str,
    output: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path, token)?;
    let client = GithubGraphqlClient::new(endpoint).context("Failed to build GraphQL client")?;
    info!(endpoint = client.endpoint(), providers = config.providers.len(), "sourcing");

    let snapshot = source_graph(&config, Arc::new(client)).await?;
    let rendered = serde_json::to_string_pretty(&snapshot)?;
    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Sourced {} entities ({} files) into {}",
                snapshot.report.entities_created,
                snapshot.report.derived_files,
                path.display()
            );
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

async fn source_graph(config: &SourceConfig, client: Arc<dyn QueryClient>) -> Result<GraphSnapshot> {
    let store = Arc::new(MemoryEntityStore::new());
    let declarator = Arc::new(MemorySchemaDeclarator::new());
    let collaborators = Collaborators {
        store: store.clone(),
        declarator: declarator.clone(),
        files: Arc::new(StoreFileDeriver::new(store.clone())),
        query_client: client,
    };

    let engine = SourceEngine::new(config, &catalog(), RunHooks::default(), collaborators)
        .context("Invalid configuration")?;
    let report = engine.run().await.context("Sourcing run failed")?;

    Ok(GraphSnapshot {
        report,
        entities: store.snapshot(),
        declarations: declarator.declarations(),
    })
}

/// Validate a configuration offline
fn cmd_check(config_path: &Path) -> Result<CheckOutput> {
    let config = load_config(config_path, None)?;
    let catalog = catalog();
    let providers = catalog
        .resolve(&config.providers)
        .context("Unknown provider in configuration")?;

    for provider in &providers {
        if provider.name() == ghgraph_discussions::PROVIDER_NAME {
            check_discussions(provider.options())
                .with_context(|| format!("Invalid options for provider '{}'", provider.name()))?;
        }
    }

    Ok(CheckOutput {
        providers: providers
            .iter()
            .map(|p| match p.key() {
                Some(key) => format!("{} ({key})", p.name()),
                None => p.name().to_string(),
            })
            .collect(),
        types: TypeRegistry::resolve(config.type_registry_override.as_ref()).as_table(),
    })
}

fn check_discussions(options: &ProviderOptions) -> Result<()> {
    let parsed: DiscussionsOptions = options.parse()?;
    parsed.validate()?;
    parsed.filter_set()?;
    Ok(())
}
