//! The ingestion pipeline: load → split → embed → commit.

use ragwatch_core::{
    ChunkConfig, ChunkDraft, ChunkMetadata, ChunkOutput, Chunker, DocumentLoader, Error,
    FileEvent, IndexStats, IngestState, Result,
};
use ragwatch_embed::EmbedderPool;
use ragwatch_store::Catalog;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::filter::PathFilter;
use crate::watcher::FileWatcher;

/// Progress events emitted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexUpdate {
    /// A file moved to a new ingestion state
    StateChanged { path: PathBuf, state: IngestState },
    /// A file's chunks were committed
    FileIndexed { path: PathBuf, chunk_count: usize },
    /// A file's chunks were tombstoned
    FileRemoved { path: PathBuf, chunk_count: usize },
}

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory scanned and watched by [`IngestPipeline::start`]
    pub watch_dir: PathBuf,
    /// Window used for watched files
    pub chunk: ChunkConfig,
    /// Which paths are ingested
    pub filter: PathFilter,
    /// Watcher debounce
    pub debounce: Duration,
    /// Capacity of the bounded event queue
    pub queue_capacity: usize,
    /// Snapshot written whenever the queue drains after a change
    pub autosave: Option<PathBuf>,
}

impl PipelineConfig {
    /// Defaults for `watch_dir`.
    #[must_use]
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            chunk: ChunkConfig::default(),
            filter: PathFilter::default(),
            debounce: Duration::from_millis(500),
            queue_capacity: 1024,
            autosave: None,
        }
    }
}

/// Outcome of a one-shot directory ingest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub chunks: usize,
}

/// Collaborators and counters shared with the worker task.
struct Shared {
    catalog: Arc<Catalog>,
    loader: Arc<dyn DocumentLoader>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<EmbedderPool>,
    config: PipelineConfig,
    update_tx: broadcast::Sender<IndexUpdate>,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Background worker state while running.
struct Running {
    watcher: FileWatcher,
    shutdown_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

/// Watches a directory and commits every accepted file into the catalog.
///
/// Per-file failures are logged and counted; they never stop the worker.
pub struct IngestPipeline {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl IngestPipeline {
    /// Create a new pipeline. Nothing runs until [`start`](Self::start).
    pub fn new(
        catalog: Arc<Catalog>,
        loader: Arc<dyn DocumentLoader>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<EmbedderPool>,
        config: PipelineConfig,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(Shared {
                catalog,
                loader,
                chunker,
                embedder,
                config,
                update_tx,
                failed: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
            }),
            running: Mutex::new(None),
        }
    }

    /// Subscribe to index updates.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexUpdate> {
        self.shared.update_tx.subscribe()
    }

    /// The catalog this pipeline commits into.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.shared.catalog
    }

    /// Whether the worker is running.
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Start watching, then queue every existing file.
    ///
    /// Watching begins before the scan so that files created during the scan
    /// are not missed; a file seen by both is skipped by its content hash.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let root = self.shared.config.watch_dir.clone();
        tokio::fs::create_dir_all(&root).await?;
        info!("Starting ingestion for {:?}", root);

        let (event_tx, event_rx) = mpsc::channel(self.shared.config.queue_capacity.max(1));
        let mut watcher = FileWatcher::new(event_tx.clone(), self.shared.config.debounce)
            .map_err(|e| Error::Other(format!("watcher error: {e}")))?;
        watcher
            .watch(&root)
            .map_err(|e| Error::Other(format!("watch error: {e}")))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(run_worker(Arc::clone(&self.shared), event_rx, shutdown_rx));

        let filter = self.shared.config.filter.clone();
        let scan_root = root.clone();
        let files = tokio::task::spawn_blocking(move || filter.scan(&scan_root))
            .await
            .map_err(|e| Error::Other(format!("scan task failed: {e}")))?;
        info!("Initial scan of {:?} found {} files", root, files.len());
        for path in files {
            if event_tx.send(FileEvent::Created(path)).await.is_err() {
                warn!("Event queue closed during initial scan");
                break;
            }
        }

        *running = Some(Running {
            watcher,
            shutdown_tx,
            worker,
        });
        Ok(())
    }

    /// Stop watching, let the in-flight file finish, then save.
    ///
    /// Events still queued are dropped; they are picked up again by the next
    /// start's initial scan.
    pub async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };
        info!("Stopping ingestion");

        drop(running.watcher);
        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.worker.await {
            error!("Ingestion worker panicked: {}", e);
        }

        if let Some(path) = &self.shared.config.autosave {
            self.shared.catalog.save(path).await?;
        }
        Ok(())
    }

    /// Handle one file event as the worker would.
    pub async fn handle_event(&self, event: FileEvent) -> bool {
        handle_event(&self.shared, event).await
    }

    /// Ingest one file. Returns the chunk count, or `None` if the file is
    /// unchanged since its last commit or is not a regular file.
    pub async fn ingest_path(&self, path: &Path) -> Result<Option<usize>> {
        ingest_file(&self.shared, path).await
    }

    /// Ingest every accepted file under `dir`, isolating per-file failures.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<ScanReport> {
        let filter = self.shared.config.filter.clone();
        let root = dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || filter.scan(&root))
            .await
            .map_err(|e| Error::Other(format!("scan task failed: {e}")))?;

        let mut report = ScanReport::default();
        for path in files {
            match ingest_file(&self.shared, &path).await {
                Ok(Some(count)) => {
                    report.indexed += 1;
                    report.chunks += count;
                }
                Ok(None) => report.skipped += 1,
                Err(_) => report.failed += 1,
            }
        }
        info!(
            "Ingested {:?}: {} indexed, {} skipped, {} failed",
            dir, report.indexed, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Split, embed and commit raw text. Never deduplicated.
    ///
    /// `label` is recorded as the chunks' source path. `window` overrides the
    /// configured chunking window.
    pub async fn ingest_text(
        &self,
        text: &str,
        label: &str,
        window: Option<ChunkConfig>,
    ) -> Result<usize> {
        let shared = &self.shared;
        let config = window.unwrap_or(shared.config.chunk);
        let source = PathBuf::from(label);

        let outputs = shared.chunker.chunk(text, &config).await?;
        let (drafts, vectors) = embed_outputs(shared, &source, outputs).await?;
        let receipt = shared.catalog.commit(drafts, vectors).await?;
        info!("Indexed {} ({} chunks)", label, receipt.chunk_ids.len());
        Ok(receipt.chunk_ids.len())
    }

    /// Catalog statistics plus pipeline counters.
    pub async fn stats(&self) -> IndexStats {
        let mut stats = self.shared.catalog.stats().await;
        stats.failed_files = self.shared.failed.load(Ordering::Relaxed);
        stats.skipped_files = self.shared.skipped.load(Ordering::Relaxed);
        stats
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    mut events: mpsc::Receiver<FileEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut dirty = false;
    loop {
        // Shutdown is only observed between events, so a commit in progress
        // always completes.
        let event = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        debug!("Received file event: {:?}", event);
        dirty |= handle_event(&shared, event).await;

        if dirty && events.is_empty() {
            if let Some(path) = &shared.config.autosave {
                match shared.catalog.save(path).await {
                    Ok(()) => dirty = false,
                    Err(e) => error!("Autosave to {:?} failed: {}", path, e),
                }
            }
        }
    }

    let dropped = events.len();
    if dropped > 0 {
        info!("Ingestion worker stopped with {} queued events", dropped);
    } else {
        debug!("Ingestion worker stopped");
    }
}

/// Returns whether the catalog changed.
async fn handle_event(shared: &Shared, event: FileEvent) -> bool {
    match event {
        FileEvent::Created(path) | FileEvent::Modified(path) => {
            if path.is_dir() || !shared.config.filter.accepts(&path) {
                debug!("Ignoring {:?}", path);
                return false;
            }
            matches!(ingest_file(shared, &path).await, Ok(Some(_)))
        }
        FileEvent::Deleted(path) => retire(shared, &path).await,
        FileEvent::Renamed { from, to } => {
            let removed = retire(shared, &from).await;
            if to.is_dir() || !shared.config.filter.accepts(&to) {
                return removed;
            }
            matches!(ingest_file(shared, &to).await, Ok(Some(_))) || removed
        }
    }
}

async fn retire(shared: &Shared, path: &Path) -> bool {
    let chunk_count = shared.catalog.retire_path(path).await;
    if chunk_count == 0 {
        return false;
    }
    info!("Removed {:?} ({} chunks)", path, chunk_count);
    let _ = shared.update_tx.send(IndexUpdate::FileRemoved {
        path: path.to_path_buf(),
        chunk_count,
    });
    true
}

/// Run one file through the state machine, reporting its terminal state.
async fn ingest_file(shared: &Shared, path: &Path) -> Result<Option<usize>> {
    match process_file(shared, path).await {
        Ok(Some(count)) => {
            set_state(shared, path, IngestState::Indexed);
            info!("Indexed {:?} ({} chunks)", path, count);
            let _ = shared.update_tx.send(IndexUpdate::FileIndexed {
                path: path.to_path_buf(),
                chunk_count: count,
            });
            Ok(Some(count))
        }
        Ok(None) => Ok(None),
        Err(e) => {
            shared.failed.fetch_add(1, Ordering::Relaxed);
            match &e {
                Error::Store(_) => error!("Failed to index {:?}: {}", path, e),
                _ => warn!("Skipping {:?}: {}", path, e),
            }
            set_state(shared, path, IngestState::Failed(e.to_string()));
            Err(e)
        }
    }
}

async fn process_file(shared: &Shared, path: &Path) -> Result<Option<usize>> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Ok(None);
    }

    let bytes = tokio::fs::read(path).await?;
    let content_hash = blake3::hash(&bytes).to_hex().to_string();
    drop(bytes);
    if shared.catalog.is_current(path, &content_hash).await {
        debug!("File {:?} unchanged, skipping", path);
        shared.skipped.fetch_add(1, Ordering::Relaxed);
        return Ok(None);
    }

    set_state(shared, path, IngestState::Detected);
    set_state(shared, path, IngestState::Loading);
    let content = shared.loader.load(path).await?;

    set_state(shared, path, IngestState::Splitting);
    let outputs = shared
        .chunker
        .chunk(&content.text, &shared.config.chunk)
        .await?;

    set_state(shared, path, IngestState::Embedding);
    let (drafts, vectors) = embed_outputs(shared, path, outputs).await?;

    set_state(shared, path, IngestState::Committing);
    let receipt = shared
        .catalog
        .commit_file(path, content_hash, drafts, vectors)
        .await?;
    Ok(Some(receipt.chunk_ids.len()))
}

/// Embed all chunks of one document as a single batch.
async fn embed_outputs(
    shared: &Shared,
    source: &Path,
    outputs: Vec<ChunkOutput>,
) -> Result<(Vec<ChunkDraft>, Vec<Vec<f32>>)> {
    let texts: Vec<&str> = outputs.iter().map(|c| c.content.as_str()).collect();
    let vectors = shared.embedder.embed_batch(&texts).await?;

    let model = shared.embedder.model_name().to_string();
    let drafts = outputs
        .into_iter()
        .zip(0u32..)
        .map(|(output, sequence_index)| ChunkDraft {
            text: output.content,
            source_path: source.to_path_buf(),
            sequence_index,
            byte_range: output.byte_range,
            line_range: output.line_range,
            metadata: ChunkMetadata {
                embedding_model: Some(model.clone()),
                ..ChunkMetadata::default()
            },
        })
        .collect();
    Ok((drafts, vectors))
}

fn set_state(shared: &Shared, path: &Path, state: IngestState) {
    debug!("{:?} → {:?}", path, state);
    let _ = shared.update_tx.send(IndexUpdate::StateChanged {
        path: path.to_path_buf(),
        state,
    });
}
