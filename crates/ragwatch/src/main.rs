//! # ragwatch CLI
//!
//! Watched-folder retrieval service: files dropped into a directory are
//! split, embedded and indexed; queries are answered from the indexed text.
//!
//! ## Commands
//!
//! - `ragwatch serve` - Scan and watch the configured directory, serve HTTP
//! - `ragwatch index <PATH>` - Ingest a directory once and save the index
//! - `ragwatch query <QUERY>` - Answer a query from the saved index
//! - `ragwatch status` - Show index statistics
//! - `ragwatch config show|init|path` - Inspect configuration
//!
//! ## Examples
//!
//! ```bash
//! ragwatch config init > ~/.config/ragwatch/config.toml
//! ragwatch serve --watch-dir ~/Documents/notes
//! ragwatch query "how is the cache invalidated?" -k 5 --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragwatch_chunker::WindowChunker;
use ragwatch_core::{Embedder, Generator, IndexStats};
use ragwatch_embed::{EmbedderPool, HashEmbedder, OpenAiEmbedder};
use ragwatch_extract::LoaderRegistry;
use ragwatch_index::{IndexUpdate, IngestPipeline, PathFilter, PipelineConfig};
use ragwatch_query::{OpenAiGenerator, PromptEchoGenerator, RetrievalCoordinator};
use ragwatch_store::Catalog;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod server;

use config::{Config, EmbeddingProvider, GenerationProvider};

#[derive(Parser)]
#[command(name = "ragwatch")]
#[command(about = "Retrieval over a watched folder of documents")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/ragwatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan and watch a directory and serve queries over HTTP
    Serve {
        /// Directory to watch (overrides index.watch_dir)
        #[arg(long)]
        watch_dir: Option<PathBuf>,

        /// Listen address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Ingest a directory once, then save the index
    Index {
        /// Directory to ingest
        path: PathBuf,
    },

    /// Answer a query from the saved index
    Query {
        /// Query text
        query: String,

        /// Number of chunks to retrieve
        #[arg(short)]
        k: Option<usize>,
    },

    /// Show index status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// Output structure for `index`.
#[derive(Serialize)]
struct IndexOutput {
    path: String,
    indexed: usize,
    skipped: usize,
    failed: usize,
    chunks: usize,
}

/// Output structure for `status`.
#[derive(Serialize)]
struct StatusOutput {
    state_path: String,
    #[serde(flatten)]
    stats: IndexStats,
}

/// Everything a command needs, wired to one shared catalog.
struct Components {
    catalog: Arc<Catalog>,
    pipeline: Arc<IngestPipeline>,
    coordinator: Arc<RetrievalCoordinator>,
    state_path: PathBuf,
}

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let cfg = &config.embedding;
    let embedder: Arc<dyn Embedder> = match cfg.provider {
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(cfg.dimension)),
        EmbeddingProvider::OpenAi => {
            let key = config::api_key(&cfg.api_key_env);
            if key.is_none() {
                warn!(
                    "{} is not set, calling {} without a key",
                    cfg.api_key_env, cfg.base_url
                );
            }
            Arc::new(
                OpenAiEmbedder::new(
                    key.as_deref(),
                    &cfg.base_url,
                    &cfg.model,
                    cfg.dimension,
                    Duration::from_secs(cfg.timeout_secs.max(1)),
                    cfg.max_retries,
                )
                .context("Failed to create embedding client")?,
            )
        }
    };
    Ok(embedder)
}

fn build_generator(config: &Config) -> Result<Arc<dyn Generator>> {
    let cfg = &config.generation;
    let generator: Arc<dyn Generator> = match cfg.provider {
        GenerationProvider::Echo => Arc::new(PromptEchoGenerator::new()),
        GenerationProvider::OpenAi => {
            let key = config::api_key(&cfg.api_key_env);
            Arc::new(
                OpenAiGenerator::new(
                    key.as_deref(),
                    &cfg.base_url,
                    &cfg.model,
                    Duration::from_secs(cfg.timeout_secs.max(1)),
                    cfg.max_retries,
                )
                .context("Failed to create generation client")?
                .with_temperature(cfg.temperature)
                .with_max_tokens(cfg.max_tokens),
            )
        }
    };
    Ok(generator)
}

/// Load the snapshot and create the standard component stack.
async fn create_components(config: &Config, watch_dir: PathBuf) -> Result<Components> {
    let state_path = config.state_path()?;
    let catalog = Arc::new(
        Catalog::open(&state_path, config.embedding.dimension, config.query.metric)
            .await
            .with_context(|| format!("Failed to open index at {}", state_path.display()))?,
    );

    let embedder = Arc::new(EmbedderPool::new(
        build_embedder(config)?,
        config.embedding.max_concurrent,
        Duration::from_secs(config.embedding.timeout_secs.max(1)),
    ));

    let pipeline_config = PipelineConfig {
        watch_dir,
        chunk: config.chunk_config()?,
        filter: PathFilter::new(&config.index.extensions, config.index.exclude.clone()),
        debounce: Duration::from_millis(config.index.debounce_ms),
        queue_capacity: config.index.queue_capacity,
        autosave: config.index.autosave.then(|| state_path.clone()),
    };
    let pipeline = Arc::new(IngestPipeline::new(
        Arc::clone(&catalog),
        Arc::new(LoaderRegistry::with_defaults()),
        Arc::new(WindowChunker::new()),
        Arc::clone(&embedder),
        pipeline_config,
    ));

    let coordinator = Arc::new(RetrievalCoordinator::new(
        Arc::clone(&catalog),
        embedder,
        build_generator(config)?,
        Duration::from_secs(config.generation.timeout_secs.max(1)),
    ));

    Ok(Components {
        catalog,
        pipeline,
        coordinator,
        state_path,
    })
}

fn init_logging(verbose: bool, config_level: &str) -> Result<()> {
    let level = if verbose { "debug" } else { config_level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid logging.level")?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(Some(path.clone()))
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };

    init_logging(cli.verbose, &config.logging.level)?;

    match cli.command {
        Commands::Serve { watch_dir, bind } => {
            let watch_dir =
                config::absolute(&watch_dir.unwrap_or_else(|| config.index.watch_dir.clone()))?;
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let addr: SocketAddr = bind
                .parse()
                .with_context(|| format!("Invalid bind address {bind}"))?;

            let components = create_components(&config, watch_dir.clone()).await?;
            let pipeline = Arc::clone(&components.pipeline);

            // Progress reporter
            let mut updates = pipeline.subscribe();
            let progress = tokio::spawn(async move {
                while let Ok(update) = updates.recv().await {
                    match update {
                        IndexUpdate::FileIndexed { path, chunk_count } => {
                            info!("Indexed: {:?} ({} chunks)", path, chunk_count);
                        }
                        IndexUpdate::FileRemoved { path, chunk_count } => {
                            info!("Removed: {:?} ({} chunks)", path, chunk_count);
                        }
                        IndexUpdate::StateChanged { .. } => {}
                    }
                }
            });

            pipeline
                .start()
                .await
                .context("Failed to start ingestion")?;
            info!("Watching {:?}", watch_dir);

            let app = server::router(server::AppState {
                pipeline: Arc::clone(&pipeline),
                coordinator: components.coordinator,
                default_k: config.query.default_k,
                manual_window: config.manual_chunk_config()?,
            });
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {addr}"))?;
            info!("Listening on http://{}", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to wait for Ctrl+C: {}", e);
                    }
                    info!("Shutting down");
                })
                .await
                .context("Server error")?;

            pipeline.stop().await.context("Failed to stop ingestion")?;
            components
                .catalog
                .save(&components.state_path)
                .await
                .context("Failed to save index")?;
            progress.abort();
        }

        Commands::Index { path } => {
            if !path.is_dir() {
                anyhow::bail!("Directory does not exist: {}", path.display());
            }
            let path = path.canonicalize()?;
            info!("Indexing {:?}", path);

            let components = create_components(&config, path.clone()).await?;
            let report = components
                .pipeline
                .ingest_directory(&path)
                .await
                .context("Indexing failed")?;
            components
                .catalog
                .save(&components.state_path)
                .await
                .context("Failed to save index")?;

            match cli.format {
                OutputFormat::Json => {
                    let output = IndexOutput {
                        path: path.to_string_lossy().to_string(),
                        indexed: report.indexed,
                        skipped: report.skipped,
                        failed: report.failed,
                        chunks: report.chunks,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    println!("Indexed {}", path.display());
                    println!(
                        "  Files:   {} indexed, {} unchanged, {} failed",
                        report.indexed, report.skipped, report.failed
                    );
                    println!("  Chunks:  {}", report.chunks);
                    println!("  Saved:   {}", components.state_path.display());
                }
            }
        }

        Commands::Query { query, k } => {
            let watch_dir = config::absolute(&config.index.watch_dir)?;
            let components = create_components(&config, watch_dir).await?;
            let k = k.unwrap_or(config.query.default_k);

            let answer = components
                .coordinator
                .answer(&query, k)
                .await
                .context("Query failed")?;

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&answer)?);
                }
                OutputFormat::Text => {
                    println!("Query: {}\n", answer.query_text);
                    if answer.retrieved_ids.is_empty() {
                        println!("No indexed chunks matched.\n");
                    } else {
                        let chunks = components.catalog.resolve(&answer.retrieved_ids).await;
                        for (i, chunk) in chunks.into_iter().flatten().enumerate() {
                            println!(
                                "{}. {} #{} (id {})",
                                i + 1,
                                chunk.source_path.display(),
                                chunk.sequence_index,
                                chunk.id
                            );
                            println!("   {}", truncate(&chunk.text, 100));
                        }
                        println!();
                    }
                    println!("{}", answer.answer);
                }
            }
        }

        Commands::Status => {
            let state_path = config.state_path()?;
            if !state_path.exists() {
                match cli.format {
                    OutputFormat::Json => {
                        println!(r#"{{"error": "Index not found"}}"#);
                    }
                    OutputFormat::Text => {
                        println!("No index at {}", state_path.display());
                        println!("Run 'ragwatch index <dir>' or 'ragwatch serve' to create it.");
                    }
                }
                return Ok(());
            }

            let catalog =
                Catalog::open(&state_path, config.embedding.dimension, config.query.metric)
                    .await
                    .with_context(|| format!("Failed to open index at {}", state_path.display()))?;
            let stats = catalog.stats().await;

            match cli.format {
                OutputFormat::Json => {
                    let output = StatusOutput {
                        state_path: state_path.to_string_lossy().to_string(),
                        stats,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    println!("Index Status for {}", state_path.display());
                    println!("  Files:      {}", stats.indexed_files);
                    println!("  Chunks:     {}", stats.live_chunks);
                    println!("  Tombstoned: {}", stats.tombstoned_chunks);
                    if let Some(last) = stats.last_update {
                        println!("  Updated:    {}", last.format("%Y-%m-%d %H:%M:%S"));
                    }
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&config)
                            .context("Failed to serialize config")?
                    );
                }
                OutputFormat::Text => {
                    println!(
                        "{}",
                        toml::to_string_pretty(&config).context("Failed to serialize config")?
                    );
                }
            },
            ConfigAction::Init => {
                println!("{}", Config::sample_toml());
            }
            ConfigAction::Path => {
                if let Some(path) = Config::config_path() {
                    println!("{}", path.display());
                } else {
                    println!("Could not determine config directory");
                }
            }
        },
    }

    Ok(())
}

/// Truncate to `max_chars` characters on one line, adding an ellipsis if cut.
fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.replace('\n', " ").replace('\r', "");
    if s.chars().count() <= max_chars {
        s
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 100), "line one line two");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("ééééé", 4), "é...");
    }

    #[test]
    fn test_cli_parses_query() {
        let cli = Cli::try_parse_from([
            "ragwatch", "query", "what is rust", "-k", "5", "--format", "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Query { query, k } => {
                assert_eq!(query, "what is rust");
                assert_eq!(k, Some(5));
            }
            _ => panic!("expected query command"),
        }
        assert!(matches!(cli.format, OutputFormat::Json));
    }

    #[test]
    fn test_cli_config_subcommands() {
        let cli = Cli::try_parse_from(["ragwatch", "config", "init"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init
            }
        ));
    }

    #[tokio::test]
    async fn test_create_components_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.index.state_path = Some(dir.path().join("index.json"));
        config.embedding.dimension = 16;

        let components = create_components(&config, dir.path().join("docs"))
            .await
            .unwrap();
        components
            .pipeline
            .ingest_text("hello components", "manual", None)
            .await
            .unwrap();
        let answer = components.coordinator.answer("hello", 1).await.unwrap();
        assert_eq!(answer.retrieved_ids, vec![0]);
    }

    #[tokio::test]
    async fn test_snapshot_dimension_change_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.index.state_path = Some(dir.path().join("index.json"));
        config.embedding.dimension = 16;

        let components = create_components(&config, dir.path().join("docs"))
            .await
            .unwrap();
        components
            .pipeline
            .ingest_text("persisted", "manual", None)
            .await
            .unwrap();
        components.catalog.save(&components.state_path).await.unwrap();

        config.embedding.dimension = 32;
        assert!(create_components(&config, dir.path().join("docs")).await.is_err());
    }
}
