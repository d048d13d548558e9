//! Bounded-concurrency fan-out over an [`EmbeddingProvider`].

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{EmbedError, Result};
use crate::provider::EmbeddingProvider;

/// Embed every text with at most `max_concurrent` requests in flight.
///
/// The output order matches `texts`. The first failure aborts the remaining
/// requests and is returned tagged with the index of the failing text.
///
/// # Errors
///
/// Returns [`EmbedError::Batch`] for a provider failure and
/// [`EmbedError::Join`] if a task panics.
pub async fn embed_batch<P>(
    provider: Arc<P>,
    texts: Vec<String>,
    max_concurrent: usize,
) -> Result<Vec<Vec<f32>>>
where
    P: EmbeddingProvider + 'static,
{
    let total = texts.len();
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = JoinSet::new();

    for (index, text) in texts.into_iter().enumerate() {
        let provider = Arc::clone(&provider);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| EmbedError::Other(e.to_string()))?;
            provider
                .embed(&text)
                .await
                .map(|vector| (index, vector))
                .map_err(|e| EmbedError::Batch {
                    index,
                    source: Box::new(e),
                })
        });
    }

    let mut vectors: Vec<Option<Vec<f32>>> = vec![None; total];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((index, vector))) => vectors[index] = Some(vector),
            Ok(Err(e)) => {
                tasks.abort_all();
                tracing::warn!(error = %e, "embedding batch aborted");
                return Err(e);
            }
            Err(e) => {
                tasks.abort_all();
                return Err(EmbedError::Join(e.to_string()));
            }
        }
    }

    vectors
        .into_iter()
        .enumerate()
        .map(|(index, v)| v.ok_or_else(|| EmbedError::Other(format!("missing embedding {index}"))))
        .collect()
}
