use anyhow::Result;
use clap::Parser;
use simshard::api::routes::SearchDefaults;
use simshard::api::ApiServer;
use simshard::query::QueryProcessor;
use simshard::shard::ShardManager;
use simshard::vectorizer::create_vectorizer;
use simshard::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simshard-server")]
#[command(about = "simshard HTTP query server")]
struct Cli {
    /// Path to config file (default: ~/.simshard/config.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Data directory (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory of shard pairs to mount (overrides data_dir/shards)
    #[arg(long)]
    shard_dir: Option<PathBuf>,

    /// Server bind address (overrides config)
    #[arg(long)]
    bind_addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config
    let mut config = if let Some(config_path) = &cli.config {
        Config::load_or_create(config_path)?
    } else if let Some(data_dir) = &cli.data_dir {
        Config::load_from(data_dir)?
    } else {
        Config::load()?
    };

    // Apply CLI overrides
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(bind_addr) = cli.bind_addr {
        config.server.bind_addr = bind_addr;
    }
    let shard_dir = cli.shard_dir.unwrap_or_else(|| config.shard_dir());

    // Initialize logging
    let log_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if let Some(log_file) = &config.logging.file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)?;
        tracing_subscriber::fmt()
            .with_env_filter(log_filter)
            .with_writer(file)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_filter)
            .init();
    }

    config.ensure_dirs()?;

    tracing::info!("starting simshard server");
    tracing::info!("shard dir: {:?}", shard_dir);
    tracing::info!("bind address: {}", config.server.bind_addr);

    // Mount shards
    let manager = Arc::new(ShardManager::new(
        config.index.dimension,
        config.index.nprobe,
    ));
    let mounted = manager
        .mount_dir(&shard_dir, config.index.recursive)
        .await?;
    tracing::info!("mounted {mounted} shards");

    // Query pipeline
    let vectorizer = create_vectorizer(&config.vectorizer);
    let processor = Arc::new(QueryProcessor::new(
        manager,
        vectorizer,
        config.search.cache_size,
    ));

    let server = ApiServer::new(processor, SearchDefaults::from_config(&config.search));
    server.serve(&config.server.bind_addr).await?;

    Ok(())
}
