use std::future::Future;

use crate::error::Result;

/// A backend that turns text into a fixed-size vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single piece of text.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or returns an invalid vector.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;

    /// Length of the vectors returned by [`EmbeddingProvider::embed`].
    fn dimensions(&self) -> usize;

    fn name(&self) -> &'static str;
}
