use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use chunkdb_core::error::{Error, Result};
use chunkdb_core::traits::Embedder;

/// Bounded, batched embedding on blocking threads.
///
/// At most `max_workers` batches run at once; callers beyond that wait on the
/// semaphore instead of piling work onto the blocking pool. Query embedding
/// goes through [`embed_query`] and never waits for these permits.
#[derive(Clone)]
pub struct EmbedPool {
    embedder: Arc<dyn Embedder>,
    permits: Arc<Semaphore>,
    batch_size: usize,
}

impl EmbedPool {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize, max_workers: usize) -> Self {
        Self { embedder, permits: Arc::new(Semaphore::new(max_workers.max(1))), batch_size: batch_size.max(1) }
    }

    pub fn batch_size(&self) -> usize { self.batch_size }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    /// Embed one batch, returning one vector of the embedder's dimension per text.
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let _permit = self.permits.acquire().await.map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?;
        let started = Instant::now();
        let count = texts.len();
        let vectors = run_blocking(self.embedder.clone(), texts).await?;
        debug!(count, elapsed_ms = started.elapsed().as_millis() as u64, "embedded batch");
        Ok(vectors)
    }

    /// Embed every text, `batch_size` at a time, with bounded parallelism.
    /// Each batch succeeds or fails on its own; results keep input order.
    pub async fn embed_all(&self, texts: Vec<String>) -> Vec<Result<Vec<Vec<f32>>>> {
        let batches: Vec<Vec<String>> = texts.chunks(self.batch_size).map(|b| b.to_vec()).collect();
        let mut handles = Vec::with_capacity(batches.len());
        for batch in batches {
            let pool = self.clone();
            handles.push(tokio::spawn(async move { pool.embed_batch(batch).await }));
        }
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.await.unwrap_or_else(|e| Err(Error::EmbeddingUnavailable(e.to_string()))));
        }
        out
    }
}

/// Embed a single query string off the async executor, giving up after `timeout`.
pub async fn embed_query(embedder: Arc<dyn Embedder>, text: String, timeout: Duration) -> Result<Vec<f32>> {
    match tokio::time::timeout(timeout, run_blocking(embedder, vec![text])).await {
        Ok(Ok(mut vectors)) => vectors.pop().ok_or_else(|| Error::EmbeddingUnavailable("embedder returned no vector".into())),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "query embedding timed out");
            Err(Error::EmbeddingUnavailable(format!("timed out after {} ms", timeout.as_millis())))
        }
    }
}

async fn run_blocking(embedder: Arc<dyn Embedder>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    let expected = texts.len();
    let dim = embedder.dim();
    let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .map_err(|e| Error::EmbeddingUnavailable(format!("embedding worker failed: {e}")))?
        .map_err(|e| Error::EmbeddingUnavailable(format!("{e:#}")))?;
    if vectors.len() != expected {
        return Err(Error::EmbeddingUnavailable(format!("embedder returned {} vectors for {} texts", vectors.len(), expected)));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(Error::DimensionMismatch { expected: dim, actual: bad.len() });
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashEmbedder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder { inner: HashEmbedder, active: AtomicUsize, peak: AtomicUsize }

    impl Embedder for CountingEmbedder {
        fn model_id(&self) -> &str { self.inner.model_id() }
        fn dim(&self) -> usize { self.inner.dim() }
        fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.inner.embed_batch(texts)
        }
    }

    struct SlowEmbedder;

    impl Embedder for SlowEmbedder {
        fn model_id(&self) -> &str { "slow" }
        fn dim(&self) -> usize { 4 }
        fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn batches_are_bounded_and_ordered() {
        let embedder = Arc::new(CountingEmbedder { inner: HashEmbedder::new(8), active: AtomicUsize::new(0), peak: AtomicUsize::new(0) });
        let pool = EmbedPool::new(embedder.clone(), 2, 2);
        let texts: Vec<String> = (0..9).map(|i| format!("chunk number {i}")).collect();

        let results = pool.embed_all(texts.clone()).await;
        assert_eq!(results.len(), 5);
        let flat: Vec<Vec<f32>> = results.into_iter().flat_map(|r| r.unwrap()).collect();
        assert_eq!(flat.len(), 9);
        assert_eq!(flat[4], HashEmbedder::new(8).embed_text(&texts[4]));
        assert!(embedder.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn query_embedding_times_out() {
        let err = embed_query(Arc::new(SlowEmbedder), "anything".into(), Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        struct Short;
        impl Embedder for Short {
            fn model_id(&self) -> &str { "short" }
            fn dim(&self) -> usize { 4 }
            fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> { Ok(texts.iter().map(|_| vec![0.5; 3]).collect()) }
        }
        let pool = EmbedPool::new(Arc::new(Short), 4, 1);
        let err = pool.embed_batch(vec!["x".into()]).await.unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3 }));
    }
}
