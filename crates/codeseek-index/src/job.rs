//! Indexing job records and the registry that owns them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Point-in-time copy of a job.
#[derive(Debug, Clone, Serialize)]
pub struct IndexJob {
    pub id: String,
    pub repo_path: String,
    pub status: JobStatus,
    /// Fraction of files processed, `0.0..=1.0`.
    pub progress: f64,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub total_files: usize,
    pub files_processed: usize,
    pub total_chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
struct Outcome {
    status: JobStatus,
    end_time: Option<DateTime<Utc>>,
    error: Option<String>,
}

/// Live job shared between the orchestrator and its workers. Counters are
/// atomics so workers never contend on the outcome lock.
#[derive(Debug)]
pub struct JobHandle {
    id: String,
    repo_path: String,
    start_time: DateTime<Utc>,
    total_files: AtomicUsize,
    files_processed: AtomicUsize,
    total_chunks: AtomicUsize,
    outcome: std::sync::RwLock<Outcome>,
}

impl JobHandle {
    fn new(repo_path: &str) -> Self {
        Self {
            id: format!("job-{}", uuid::Uuid::new_v4()),
            repo_path: repo_path.to_owned(),
            start_time: Utc::now(),
            total_files: AtomicUsize::new(0),
            files_processed: AtomicUsize::new(0),
            total_chunks: AtomicUsize::new(0),
            outcome: std::sync::RwLock::new(Outcome {
                status: JobStatus::Running,
                end_time: None,
                error: None,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn repo_path(&self) -> &str {
        &self.repo_path
    }

    pub fn set_total_files(&self, n: usize) {
        self.total_files.store(n, Ordering::Relaxed);
    }

    pub fn file_processed(&self) -> usize {
        self.files_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn add_chunks(&self, n: usize) {
        self.total_chunks.fetch_add(n, Ordering::Relaxed);
    }

    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.outcome
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .status
    }

    /// Move to `completed`. No effect on a finished job.
    pub fn complete(&self) {
        self.finish(JobStatus::Completed, None);
    }

    /// Move to `failed` with `error`. No effect on a finished job.
    pub fn fail(&self, error: impl Into<String>) {
        self.finish(JobStatus::Failed, Some(error.into()));
    }

    fn finish(&self, status: JobStatus, error: Option<String>) {
        let mut outcome = self
            .outcome
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if outcome.status.is_terminal() {
            return;
        }
        outcome.status = status;
        outcome.end_time = Some(Utc::now());
        outcome.error = error;
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(&self) -> IndexJob {
        let total_files = self.total_files.load(Ordering::Relaxed);
        let files_processed = self.files_processed.load(Ordering::Relaxed);
        let outcome = self
            .outcome
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let progress = if total_files == 0 {
            if outcome.status == JobStatus::Completed { 1.0 } else { 0.0 }
        } else {
            (files_processed as f64 / total_files as f64).min(1.0)
        };
        IndexJob {
            id: self.id.clone(),
            repo_path: self.repo_path.clone(),
            status: outcome.status,
            progress,
            start_time: self.start_time,
            end_time: outcome.end_time,
            total_files,
            files_processed,
            total_chunks: self.total_chunks.load(Ordering::Relaxed),
            error: outcome.error.clone(),
        }
    }
}

/// In-memory map of job id to job, owned by the indexer.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<JobHandle>>>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new running job for `repo_path`.
    pub async fn create(&self, repo_path: &str) -> Arc<JobHandle> {
        let handle = Arc::new(JobHandle::new(repo_path));
        self.jobs
            .write()
            .await
            .insert(handle.id.clone(), Arc::clone(&handle));
        handle
    }

    pub async fn get(&self, id: &str) -> Option<Arc<JobHandle>> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Most recently started running job for `repo_path`.
    pub async fn running_for(&self, repo_path: &str) -> Option<Arc<JobHandle>> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|j| j.repo_path == repo_path && j.status() == JobStatus::Running)
            .max_by_key(|j| j.start_time)
            .cloned()
    }

    /// Most recently started job for `repo_path`, in any state.
    pub async fn latest_for(&self, repo_path: &str) -> Option<Arc<JobHandle>> {
        self.jobs
            .read()
            .await
            .values()
            .filter(|j| j.repo_path == repo_path)
            .max_by_key(|j| j.start_time)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn job_ids_are_prefixed_and_unique() {
        let registry = JobRegistry::new();
        let a = registry.create("/r").await;
        let b = registry.create("/r").await;
        assert!(a.id().starts_with("job-"));
        assert_ne!(a.id(), b.id());
        assert!(registry.get(a.id()).await.is_some());
        assert!(registry.get("job-missing").await.is_none());
    }

    #[tokio::test]
    async fn progress_tracks_processed_files() {
        let registry = JobRegistry::new();
        let job = registry.create("/r").await;
        job.set_total_files(4);
        job.file_processed();
        job.add_chunks(3);
        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Running);
        assert!((snap.progress - 0.25).abs() < f64::EPSILON);
        assert_eq!(snap.total_chunks, 3);
        assert!(snap.end_time.is_none());
    }

    #[tokio::test]
    async fn terminal_state_is_final() {
        let registry = JobRegistry::new();
        let job = registry.create("/r").await;
        job.fail("embedding generation failed: boom");
        job.complete();
        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Failed);
        assert!(snap.end_time.is_some());
        assert!(snap.error.unwrap().starts_with("embedding generation failed"));
    }

    #[tokio::test]
    async fn empty_completed_job_reports_full_progress() {
        let registry = JobRegistry::new();
        let job = registry.create("/r").await;
        job.complete();
        assert!((job.snapshot().progress - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn running_for_ignores_finished_jobs() {
        let registry = JobRegistry::new();
        let done = registry.create("/r").await;
        done.complete();
        assert!(registry.running_for("/r").await.is_none());
        let live = registry.create("/r").await;
        assert_eq!(registry.running_for("/r").await.unwrap().id(), live.id());
        assert!(registry.running_for("/other").await.is_none());
        assert!(registry.latest_for("/r").await.is_some());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
