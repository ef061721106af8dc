use clap::{Parser, Subcommand};
use docmirror::index::river::{register_river, RiverConfig, RiverOptions};
use docmirror::index::{clear_type, ensure_index, recreate_index};
use docmirror::{IndexDescriptor, IndexEngine, MappingNode, MirrorConfig, MirrorError, Result};
use docmirror_http::HttpIndexEngine;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docmirror", about = "Manage the search index behind a mirrored model")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Model name; index and type names derive from it unless configured
    #[arg(long, env = "DOCMIRROR_MODEL")]
    model: String,
    /// Directory holding docmirror.json
    #[arg(long, env = "DOCMIRROR_CONFIG_DIR", default_value = ".")]
    config_dir: PathBuf,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    index: Option<String>,
    #[arg(long = "type")]
    type_name: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the index, or merge the mapping into an existing one
    EnsureIndex {
        /// JSON mapping file (`{"properties": {...}}`)
        #[arg(long)]
        mapping: PathBuf,
    },
    /// Delete the index and create it again from the mapping
    RecreateIndex {
        #[arg(long)]
        mapping: PathBuf,
    },
    /// Count documents of the model's type
    Count {
        /// Query clause as JSON, e.g. '{"term": {"name": "ann"}}'
        #[arg(long)]
        query: Option<String>,
    },
    /// Run a raw search body against the model's index
    Search {
        #[arg(long, default_value = r#"{"query": {"match_all": {}}}"#)]
        body: String,
    },
    /// Delete every document of the model's type
    Clear {
        #[arg(long)]
        refresh: bool,
    },
    /// Register the change-feed river for the model's collection
    River {
        #[arg(long, env = "DOCMIRROR_DATABASE")]
        database: String,
        #[arg(long)]
        gridfs: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<MirrorConfig> {
    let mut config = MirrorConfig::load_or_default(&cli.config_dir).with_env_overrides()?;
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.index.is_some() {
        config.index = cli.index.clone();
    }
    if cli.type_name.is_some() {
        config.type_name = cli.type_name.clone();
    }
    config.validate()?;
    Ok(config)
}

fn read_mapping(path: &Path) -> Result<MappingNode> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| MirrorError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let json: Value = serde_json::from_str(&content)?;
    let mapping = MappingNode::from_json(&json)?;
    if !mapping.is_object() {
        return Err(MirrorError::Validation(format!(
            "{} must declare properties",
            path.display()
        )));
    }
    Ok(mapping)
}

fn parse_json(what: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| MirrorError::Validation(format!("Invalid {}: {}", what, e)))
}

async fn run(cli: Cli) -> Result<Value> {
    let config = load_config(&cli)?;
    let descriptor: IndexDescriptor = config.target().resolve(&cli.model)?;
    let engine = HttpIndexEngine::from_config(&config)?;
    tracing::debug!(
        "[CLI] model {} -> {}/{} at {}",
        cli.model,
        descriptor.index,
        descriptor.type_name,
        engine.base_url()
    );

    match cli.command {
        Command::EnsureIndex { mapping } => {
            let mapping = read_mapping(&mapping)?;
            ensure_index(&engine, &descriptor, &mapping).await
        }
        Command::RecreateIndex { mapping } => {
            let mapping = read_mapping(&mapping)?;
            recreate_index(&engine, &descriptor, &mapping).await
        }
        Command::Count { query } => {
            let query = query.map(|q| parse_json("query", &q)).transpose()?;
            let count = engine
                .count(&descriptor.index, &descriptor.type_name, query.as_ref())
                .await?;
            Ok(serde_json::json!({ "count": count }))
        }
        Command::Search { body } => {
            let body = parse_json("search body", &body)?;
            let results = engine.search(&descriptor.index, &body).await?;
            Ok(serde_json::to_value(results)?)
        }
        Command::Clear { refresh } => {
            let response = clear_type(&engine, &descriptor, config.bulk_size, refresh).await?;
            response.check()?;
            Ok(serde_json::json!({ "deleted": response.items.len() }))
        }
        Command::River { database, gridfs } => {
            let configured = config.use_river.map_or(false, |o| o.gridfs);
            let options = RiverOptions {
                gridfs: gridfs || configured,
            };
            let river = RiverConfig::for_model(&database, &descriptor, &options)?;
            register_river(&engine, &river).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error [{}]: {}", e.code(), e);
            std::process::exit(1);
        }
    }
}
