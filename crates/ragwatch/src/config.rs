//! Configuration handling for ragwatch.
//!
//! Every field has a serde default, so a missing or partial
//! `config.toml` is valid.

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use ragwatch_core::{ChunkConfig, DistanceMetric};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Watched directory and persistence
    #[serde(default)]
    pub index: IndexConfig,

    /// Splitting windows
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding provider
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Generation provider
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Query defaults
    #[serde(default)]
    pub query: QueryConfig,

    /// HTTP surface
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Index-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory scanned and watched by `serve`
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    /// File extensions to ingest
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// File patterns to exclude
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Debounce duration for file watcher (ms)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Bound on queued file events
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Snapshot path (default: `<data_dir>/index.json`)
    #[serde(default)]
    pub state_path: Option<PathBuf>,

    /// Save the snapshot after each burst of changes
    #[serde(default = "default_true")]
    pub autosave: bool,
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from("documents")
}

fn default_extensions() -> Vec<String> {
    ["txt", "md", "markdown", "pdf"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_exclude() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/__pycache__/**".to_string(),
        "**/venv/**".to_string(),
    ]
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            extensions: default_extensions(),
            exclude: default_exclude(),
            debounce_ms: default_debounce_ms(),
            queue_capacity: default_queue_capacity(),
            state_path: None,
            autosave: true,
        }
    }
}

/// Chunking-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk for watched files
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks for watched files
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Window used by `/add_document` when the request omits one
    #[serde(default = "default_manual_chunk_size")]
    pub manual_chunk_size: usize,

    #[serde(default = "default_manual_chunk_overlap")]
    pub manual_chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_manual_chunk_size() -> usize {
    300
}

fn default_manual_chunk_overlap() -> usize {
    50
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            manual_chunk_size: default_manual_chunk_size(),
            manual_chunk_overlap: default_manual_chunk_overlap(),
        }
    }
}

/// Embedding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Offline blake3 feature hashing
    Hash,
    /// OpenAI-compatible `/embeddings`
    OpenAi,
}

/// Embedding-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProvider,

    /// Model name (ignored by `hash`)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector length; fixed for the lifetime of an index
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Max concurrent embedding calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_embedding_provider() -> EmbeddingProvider {
    EmbeddingProvider::Hash
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimension() -> usize {
    384
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_concurrent() -> usize {
    4
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            base_url: default_openai_base_url(),
            api_key_env: default_api_key_env(),
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_embedding_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Offline; answers with the assembled prompt
    Echo,
    /// OpenAI-compatible `/chat/completions`
    OpenAi,
}

/// Generation-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: GenerationProvider,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_generation_provider() -> GenerationProvider {
    GenerationProvider::Echo
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> Option<u32> {
    Some(512)
}

fn default_generation_timeout_secs() -> u64 {
    60
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            base_url: default_openai_base_url(),
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Query-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// `k` used when a request omits it
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Distance metric, fixed when the index is created
    #[serde(default)]
    pub metric: DistanceMetric,
}

fn default_k() -> usize {
    3
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            metric: DistanceMetric::default(),
        }
    }
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p, true),
            None => match Self::config_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };
        if !path.exists() {
            if required {
                bail!("Config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Parse and validate TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce a working index.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            bail!("embedding.dimension must be greater than zero");
        }
        self.chunk_config()?;
        self.manual_chunk_config()?;
        if self.query.default_k == 0 {
            bail!("query.default_k must be at least 1");
        }
        Ok(())
    }

    /// Window for watched files.
    pub fn chunk_config(&self) -> Result<ChunkConfig> {
        ChunkConfig::new(self.chunking.chunk_size, self.chunking.chunk_overlap)
            .context("Invalid [chunking] chunk_size/chunk_overlap")
    }

    /// Default window for manual ingestion.
    pub fn manual_chunk_config(&self) -> Result<ChunkConfig> {
        ChunkConfig::new(
            self.chunking.manual_chunk_size,
            self.chunking.manual_chunk_overlap,
        )
        .context("Invalid [chunking] manual_chunk_size/manual_chunk_overlap")
    }

    /// Snapshot location.
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.index.state_path {
            Some(p) => Ok(p.clone()),
            None => Ok(data_dir()
                .context("Failed to get data directory")?
                .join("index.json")),
        }
    }

    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|d| d.join("config.toml"))
    }

    /// Commented sample configuration.
    pub fn sample_toml() -> &'static str {
        SAMPLE_CONFIG
    }
}

const SAMPLE_CONFIG: &str = r#"# ragwatch configuration

[index]
watch_dir = "documents"
extensions = ["txt", "md", "markdown", "pdf"]
exclude = ["**/node_modules/**", "**/target/**"]
debounce_ms = 500
queue_capacity = 1024
# state_path = "/var/lib/ragwatch/index.json"
autosave = true

[chunking]
chunk_size = 1000
chunk_overlap = 200
manual_chunk_size = 300
manual_chunk_overlap = 50

[embedding]
# "hash" runs offline; "openai" calls an OpenAI-compatible /embeddings endpoint
provider = "hash"
model = "text-embedding-3-small"
dimension = 384
base_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
max_concurrent = 4
timeout_secs = 30
max_retries = 3

[generation]
# "echo" returns the assembled prompt; "openai" calls /chat/completions
provider = "echo"
model = "gpt-4o-mini"
base_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
temperature = 0.0
max_tokens = 512
timeout_secs = 60
max_retries = 3

[query]
default_k = 3
# l2, cosine or dot
metric = "l2"

[server]
bind = "127.0.0.1:5000"

[logging]
level = "info"
"#;

/// Get the data directory for ragwatch.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("RAGWATCH_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "ragwatch").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the config directory for ragwatch.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("RAGWATCH_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "ragwatch").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Read the API key named by `var`, if set and non-empty.
pub fn api_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}

/// Resolve `path` against the current directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()
        .context("Failed to get current directory")?
        .join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.chunking.manual_chunk_size, 300);
        assert_eq!(config.chunking.manual_chunk_overlap, 50);
        assert_eq!(config.query.default_k, 3);
        assert_eq!(config.query.metric, DistanceMetric::L2);
        assert_eq!(config.server.bind, "127.0.0.1:5000");
        assert_eq!(config.index.watch_dir, PathBuf::from("documents"));
        assert_eq!(config.embedding.provider, EmbeddingProvider::Hash);
        assert_eq!(config.generation.provider, GenerationProvider::Echo);
    }

    #[test]
    fn test_partial_section() {
        let config = Config::parse(
            r#"
            [embedding]
            provider = "openai"
            dimension = 1536

            [query]
            metric = "cosine"
            "#,
        )
        .unwrap();
        assert_eq!(config.embedding.provider, EmbeddingProvider::OpenAi);
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.embedding.max_concurrent, 4);
        assert_eq!(config.query.metric, DistanceMetric::Cosine);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = Config::parse("[embedding]\ndimension = 0\n").unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[test]
    fn test_bad_window_rejected() {
        assert!(Config::parse("[chunking]\nchunk_size = 10\nchunk_overlap = 10\n").is_err());
        assert!(Config::parse("[chunking]\nmanual_chunk_size = 0\n").is_err());
    }

    #[test]
    fn test_default_k_must_be_positive() {
        assert!(Config::parse("[query]\ndefault_k = 0\n").is_err());
        assert_eq!(
            Config::parse("[query]\ndefault_k = 500\n").unwrap().query.default_k,
            500
        );
    }

    #[test]
    fn test_sample_config_parses() {
        let config = Config::parse(Config::sample_toml()).unwrap();
        assert_eq!(config.embedding.dimension, 384);
        assert!(config.index.autosave);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = Config::parse(&text).unwrap();
        assert_eq!(parsed.query.default_k, config.query.default_k);
        assert_eq!(parsed.index.exclude, config.index.exclude);
    }

    #[test]
    fn test_explicit_state_path_wins() {
        let config = Config::parse("[index]\nstate_path = \"/tmp/x/index.json\"\n").unwrap();
        assert_eq!(
            config.state_path().unwrap(),
            PathBuf::from("/tmp/x/index.json")
        );
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(Some(dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nbind = \"0.0.0.0:8080\"\n").unwrap();
        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }
}
