//! Indexing orchestrator: scan → chunk → embed → store → commit cache.
//!
//! The hash cache is persisted only after the vector store accepted every
//! chunk of the job. Any earlier failure leaves the on-disk cache untouched
//! so the affected files are picked up again by the next run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use codeseek_embed::{EmbedError, EmbeddingProvider, embed_batch};
use codeseek_store::{
    CollectionSpec, DistanceMetric, VectorFilter, VectorPoint, VectorStore, VectorStoreError,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cache::{FileHashCache, hash_bytes};
use crate::chunk::{CodeChunk, KEYWORD_FIELDS};
use crate::chunker::Chunker;
use crate::error::{IndexError, Result};
use crate::job::{IndexJob, JobHandle, JobRegistry, JobStatus};
use crate::scanner::Scanner;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const PROGRESS_LOG_EVERY: usize = 50;

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Chunking worker threads.
    pub parallel_workers: usize,
    /// Chunks per embedding round.
    pub batch_size: usize,
    /// Skip files whose hash matches the cache.
    pub incremental: bool,
    /// Run jobs on a spawned task and return immediately.
    pub background: bool,
    pub collection: String,
    pub distance: DistanceMetric,
    /// In-flight embedding requests per round.
    pub max_concurrent_embeddings: usize,
    /// Points per upsert request.
    pub upsert_batch_size: usize,
    pub cache_dir: PathBuf,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            parallel_workers: std::thread::available_parallelism().map_or(4, usize::from),
            batch_size: 100,
            incremental: true,
            background: true,
            collection: "code_chunks".into(),
            distance: DistanceMetric::Cosine,
            max_concurrent_embeddings: 10,
            upsert_batch_size: 100,
            cache_dir: PathBuf::from(".codeseek/cache"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    Running,
    Completed,
    Failed,
    NotIndexed,
}

/// Index state of one repository as seen by the vector store and the cache.
#[derive(Debug, Clone, Serialize)]
pub struct RepoIndex {
    pub repo_path: String,
    pub status: RepoStatus,
    pub total_files: usize,
    pub total_chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_indexed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<IndexJob>,
}

/// Why a job failed. The display strings are what operators see.
#[derive(Debug, thiserror::Error)]
enum JobFailure {
    #[error("scan failed: {0}")]
    Scan(String),
    #[error(
        "embedding generation failed: {0}. Cache was NOT updated; files will be reprocessed on the next run"
    )]
    Embedding(#[source] EmbedError),
    #[error(
        "vector database storage failed: {0}. Cache was NOT updated; files will be reprocessed on the next run. Check that Qdrant is reachable at the configured URL"
    )]
    Storage(#[source] VectorStoreError),
    #[error(
        "cache save failed: {0}. Chunks are stored in the vector database but the cache is inconsistent; re-run with --force to repair"
    )]
    Cache(#[source] IndexError),
    #[error("worker pool failed: {0}")]
    Workers(String),
    #[error("indexing cancelled")]
    Cancelled,
}

/// Chunks produced for one reprocessed file.
struct FileChunks {
    path: String,
    chunks: Vec<CodeChunk>,
    /// The file had a cache entry before this run, so points may exist for it.
    had_entry: bool,
}

struct Inner<P> {
    provider: Arc<P>,
    store: Arc<dyn VectorStore>,
    chunker: Arc<Chunker>,
    scanner: Arc<Scanner>,
    registry: JobRegistry,
    config: IndexerConfig,
}

/// Orchestrates indexing jobs. Cloning is cheap and shares the job registry.
pub struct Indexer<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for Indexer<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: EmbeddingProvider + 'static> Indexer<P> {
    #[must_use]
    pub fn new(
        provider: Arc<P>,
        store: Arc<dyn VectorStore>,
        chunker: Chunker,
        scanner: Scanner,
        config: IndexerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                chunker: Arc::new(chunker),
                scanner: Arc::new(scanner),
                registry: JobRegistry::new(),
                config,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &IndexerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    /// Start a job for `repo`. In background mode the returned snapshot is
    /// still running; otherwise it is terminal.
    ///
    /// # Errors
    ///
    /// Job failures are reported through the job itself; this only fails if
    /// the job cannot be registered.
    pub async fn index(
        &self,
        repo: &Path,
        force: bool,
        cancel: CancellationToken,
    ) -> Result<IndexJob> {
        if self.inner.config.background {
            let job = self.inner.registry.create(&repo_key(repo)).await;
            let this = self.clone();
            let handle = Arc::clone(&job);
            let repo = repo.to_path_buf();
            tokio::spawn(async move { this.run(handle, repo, force, cancel).await });
            Ok(job.snapshot())
        } else {
            self.index_and_wait(repo, force, cancel).await
        }
    }

    /// Run a job inline regardless of the background setting.
    ///
    /// # Errors
    ///
    /// See [`Indexer::index`].
    pub async fn index_and_wait(
        &self,
        repo: &Path,
        force: bool,
        cancel: CancellationToken,
    ) -> Result<IndexJob> {
        let job = self.inner.registry.create(&repo_key(repo)).await;
        self.run(Arc::clone(&job), repo.to_path_buf(), force, cancel)
            .await;
        Ok(job.snapshot())
    }

    async fn run(&self, job: Arc<JobHandle>, repo: PathBuf, force: bool, cancel: CancellationToken) {
        let started = Instant::now();
        tracing::info!(job_id = job.id(), repo = %repo.display(), force, "indexing started");

        match self.execute(&job, &repo, force, &cancel).await {
            Ok(()) => {
                job.complete();
                let snap = job.snapshot();
                tracing::info!(
                    job_id = job.id(),
                    files = snap.total_files,
                    chunks = snap.total_chunks,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "indexing completed"
                );
            }
            Err(failure) => {
                tracing::error!(job_id = job.id(), error = %failure, "indexing failed");
                job.fail(failure.to_string());
            }
        }
    }

    async fn execute(
        &self,
        job: &Arc<JobHandle>,
        repo: &Path,
        force: bool,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), JobFailure> {
        let inner = &self.inner;
        let key = repo_key(repo);

        let cache = Arc::new(if force {
            FileHashCache::empty(&inner.config.cache_dir, &key)
        } else {
            FileHashCache::load(&inner.config.cache_dir, &key).unwrap_or_else(|e| {
                tracing::warn!(repo = %key, error = %e, "unreadable hash cache, reindexing everything");
                FileHashCache::empty(&inner.config.cache_dir, &key)
            })
        });

        let scanner = Arc::clone(&inner.scanner);
        let root = repo.to_path_buf();
        let scan = tokio::task::spawn_blocking(move || scanner.scan(&root))
            .await
            .map_err(|e| JobFailure::Workers(e.to_string()))?
            .map_err(|e| match e {
                IndexError::Scan(msg) => JobFailure::Scan(msg),
                other => JobFailure::Scan(other.to_string()),
            })?;
        job.set_total_files(scan.files.len());

        let scanned: HashSet<String> = scan
            .files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let removed: Vec<String> = if force {
            Vec::new()
        } else {
            cache
                .entries()
                .into_iter()
                .filter(|f| !scanned.contains(f))
                .collect()
        };

        let processed = self
            .chunk_files(job, repo, scan.files, Arc::clone(&cache), force, cancel)
            .await?;
        if cancel.is_cancelled() {
            return Err(JobFailure::Cancelled);
        }

        let reprocessed: Vec<String> = processed
            .iter()
            .filter(|f| f.had_entry)
            .map(|f| f.path.clone())
            .collect();
        let mut chunks: Vec<CodeChunk> = processed.into_iter().flat_map(|f| f.chunks).collect();

        if !chunks.is_empty() {
            self.embed_chunks(&mut chunks, cancel).await?;
        }

        self.store_chunks(&key, chunks, &reprocessed, &removed, force)
            .await
            .map_err(JobFailure::Storage)?;
        for file in &removed {
            cache.remove(file);
        }

        let saving = Arc::clone(&cache);
        tokio::task::spawn_blocking(move || saving.save())
            .await
            .map_err(|e| JobFailure::Workers(e.to_string()))?
            .map_err(JobFailure::Cache)?;
        Ok(())
    }

    /// Fan files out over blocking workers and collect their chunks.
    async fn chunk_files(
        &self,
        job: &Arc<JobHandle>,
        repo: &Path,
        files: Vec<PathBuf>,
        cache: Arc<FileHashCache>,
        force: bool,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<FileChunks>, JobFailure> {
        let workers = self.inner.config.parallel_workers.max(1);
        let incremental = self.inner.config.incremental && !force;
        let queue = Arc::new(Mutex::new(files.into_iter()));
        let (tx, mut rx) = mpsc::channel::<FileChunks>(workers * 2);

        let collector = tokio::spawn(async move {
            let mut collected = Vec::new();
            while let Some(file) = rx.recv().await {
                collected.push(file);
            }
            collected
        });

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let ctx = WorkerCtx {
                queue: Arc::clone(&queue),
                tx: tx.clone(),
                chunker: Arc::clone(&self.inner.chunker),
                cache: Arc::clone(&cache),
                job: Arc::clone(job),
                repo: repo.to_path_buf(),
                incremental,
                cancel: cancel.clone(),
            };
            pool.spawn_blocking(move || ctx.run());
        }
        drop(tx);

        let mut worker_error = None;
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                worker_error.get_or_insert_with(|| e.to_string());
            }
        }
        let collected = collector
            .await
            .map_err(|e| JobFailure::Workers(e.to_string()))?;
        if let Some(e) = worker_error {
            return Err(JobFailure::Workers(e));
        }
        Ok(collected)
    }

    async fn embed_chunks(
        &self,
        chunks: &mut [CodeChunk],
        cancel: &CancellationToken,
    ) -> std::result::Result<(), JobFailure> {
        let batch_size = self.inner.config.batch_size.max(1);
        let total_batches = chunks.len().div_ceil(batch_size);

        for (n, batch) in chunks.chunks_mut(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = tokio::select! {
                () = cancel.cancelled() => return Err(JobFailure::Cancelled),
                result = embed_batch(
                    Arc::clone(&self.inner.provider),
                    texts,
                    self.inner.config.max_concurrent_embeddings,
                ) => result.map_err(JobFailure::Embedding)?,
            };
            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                chunk.embedding = Some(vector);
            }
            tracing::info!(batch = n + 1, total_batches, chunks = batch.len(), "embedded batch");
        }
        Ok(())
    }

    /// Delete superseded points, then upsert the new ones in batches.
    /// `reprocessed` lists only files that had a cache entry before the run.
    async fn store_chunks(
        &self,
        repo: &str,
        chunks: Vec<CodeChunk>,
        reprocessed: &[String],
        removed: &[String],
        force: bool,
    ) -> std::result::Result<(), VectorStoreError> {
        let store = &self.inner.store;
        let collection = &self.inner.config.collection;

        if store.collection_exists(collection).await? {
            if force {
                store
                    .delete_by_filter(collection, VectorFilter::text_eq("repo_path", repo))
                    .await?;
            } else {
                for file in reprocessed.iter().chain(removed) {
                    store
                        .delete_by_filter(collection, file_filter(repo, file))
                        .await?;
                }
            }
        }

        if chunks.is_empty() {
            return Ok(());
        }

        store
            .ensure_collection(CollectionSpec {
                name: collection.clone(),
                vector_size: u64::try_from(self.inner.provider.dimensions()).unwrap_or(u64::MAX),
                distance: self.inner.config.distance,
                keyword_fields: KEYWORD_FIELDS.iter().map(|f| (*f).to_owned()).collect(),
            })
            .await?;

        let total = chunks.len();
        let points: Vec<VectorPoint> = chunks
            .into_iter()
            .filter_map(|chunk| {
                let payload = chunk.to_payload();
                chunk.embedding.map(|vector| VectorPoint {
                    id: chunk.id,
                    vector,
                    payload,
                })
            })
            .collect();
        for batch in points.chunks(self.inner.config.upsert_batch_size.max(1)) {
            store.upsert(collection, batch.to_vec()).await?;
        }
        tracing::info!(repo, points = total, "chunks stored");
        Ok(())
    }

    /// Current snapshot of a job.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::JobNotFound`] for unknown ids.
    pub async fn get_job(&self, id: &str) -> Result<IndexJob> {
        self.inner
            .registry
            .get(id)
            .await
            .map(|j| j.snapshot())
            .ok_or_else(|| IndexError::JobNotFound(id.to_owned()))
    }

    /// Index state of `repo`: live job progress while a job runs, otherwise
    /// the stored chunk count merged with cache metadata.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the vector store cannot be queried.
    pub async fn get_repo_index(&self, repo: &Path) -> Result<RepoIndex> {
        let key = repo_key(repo);
        if let Some(job) = self.inner.registry.running_for(&key).await {
            let snap = job.snapshot();
            return Ok(RepoIndex {
                repo_path: key,
                status: RepoStatus::Running,
                total_files: snap.total_files,
                total_chunks: snap.total_chunks,
                last_indexed: None,
                job: Some(snap),
            });
        }

        let collection = &self.inner.config.collection;
        let stored = if self.inner.store.collection_exists(collection).await? {
            self.inner
                .store
                .count(collection, Some(VectorFilter::text_eq("repo_path", key.as_str())))
                .await?
        } else {
            0
        };
        let total_chunks = usize::try_from(stored).unwrap_or(usize::MAX);

        let cache = FileHashCache::load(&self.inner.config.cache_dir, &key).unwrap_or_else(|e| {
            tracing::warn!(repo = %key, error = %e, "unreadable hash cache");
            FileHashCache::empty(&self.inner.config.cache_dir, &key)
        });
        let stats = (!cache.is_empty()).then(|| cache.stats());
        let latest = self
            .inner
            .registry
            .latest_for(&key)
            .await
            .map(|j| j.snapshot());

        let status = if total_chunks == 0 && stats.is_none() {
            RepoStatus::NotIndexed
        } else if latest.as_ref().is_some_and(|j| j.status == JobStatus::Failed) {
            RepoStatus::Failed
        } else {
            RepoStatus::Completed
        };

        Ok(RepoIndex {
            repo_path: key,
            status,
            total_files: stats.map_or(0, |s| s.total_files),
            total_chunks,
            last_indexed: stats.map(|s| s.updated_at),
            job: latest,
        })
    }

    /// Delete the hash cache of `repo`; the next run reprocesses every file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the cache file cannot be removed.
    pub fn clear_cache(&self, repo: &Path) -> Result<()> {
        let key = repo_key(repo);
        FileHashCache::empty(&self.inner.config.cache_dir, &key).clear()?;
        tracing::info!(repo = %key, "hash cache cleared");
        Ok(())
    }

    /// Poll until job `id` finishes or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::JobNotFound`] for unknown ids and
    /// [`IndexError::Cancelled`] when `cancel` fires first.
    pub async fn wait_for_job(&self, id: &str, cancel: &CancellationToken) -> Result<IndexJob> {
        loop {
            let snap = self.get_job(id).await?;
            if snap.status.is_terminal() {
                return Ok(snap);
            }
            tokio::select! {
                () = cancel.cancelled() => return Err(IndexError::Cancelled),
                () = tokio::time::sleep(WAIT_POLL_INTERVAL) => {}
            }
        }
    }
}

struct WorkerCtx {
    queue: Arc<Mutex<std::vec::IntoIter<PathBuf>>>,
    tx: mpsc::Sender<FileChunks>,
    chunker: Arc<Chunker>,
    cache: Arc<FileHashCache>,
    job: Arc<JobHandle>,
    repo: PathBuf,
    incremental: bool,
    cancel: CancellationToken,
}

impl WorkerCtx {
    fn next_file(&self) -> Option<PathBuf> {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .next()
    }

    fn run(self) {
        while !self.cancel.is_cancelled() {
            let Some(path) = self.next_file() else {
                break;
            };
            let produced = self.process(&path);
            let done = self.job.file_processed();
            if done % PROGRESS_LOG_EVERY == 0 {
                tracing::info!(job_id = self.job.id(), files_processed = done, "indexing progress");
            }
            if let Some(file) = produced
                && self.tx.blocking_send(file).is_err()
            {
                break;
            }
        }
    }

    fn process(&self, path: &Path) -> Option<FileChunks> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "read failed, skipping file");
                return None;
            }
        };
        let hash = hash_bytes(&bytes);
        if self.incremental && self.cache.is_current(path, &hash) {
            tracing::debug!(file = %path.display(), "unchanged, skipping");
            return None;
        }
        let had_entry = self.cache.get(&path.to_string_lossy()).is_some();

        let mut chunks = match self.chunker.chunk_bytes(&self.repo, path, &bytes) {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "chunking failed, skipping file");
                return None;
            }
        };

        let now = Utc::now();
        for chunk in &mut chunks {
            chunk.indexed_at = Some(now);
        }
        self.cache.record(path, hash, chunks.len());
        self.job.add_chunks(chunks.len());
        tracing::debug!(file = %path.display(), chunks = chunks.len(), "file chunked");

        Some(FileChunks {
            path: path.to_string_lossy().into_owned(),
            chunks,
            had_entry,
        })
    }
}

fn repo_key(repo: &Path) -> String {
    repo.to_string_lossy().into_owned()
}

fn file_filter(repo: &str, file: &str) -> VectorFilter {
    VectorFilter::text_eq("repo_path", repo).and_text_eq("file_path", file)
}
