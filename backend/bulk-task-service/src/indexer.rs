/// Cache-backed cyclic file index
use crate::cache::TrackingCache;
use crate::error::Result;
use std::sync::Arc;

#[derive(Clone)]
pub struct RoundRobinIndexer {
    cache: Arc<dyn TrackingCache>,
}

impl RoundRobinIndexer {
    pub fn new(cache: Arc<dyn TrackingCache>) -> Self {
        Self { cache }
    }

    /// Replace `pattern` in `path` with the next index in `1..=max_index`.
    ///
    /// The counter lives under `"{path}_indexedfile"` and is deleted once it
    /// hands out `max_index`. Increment and reset are separate round-trips, so
    /// concurrent callers near the wrap point can overshoot `max_index`.
    pub async fn next(&self, path: &str, pattern: &str, max_index: i64) -> Result<String> {
        let key = format!("{path}_indexedfile");
        let index = self.cache.incr(&key).await?;
        let indexed = path.replace(pattern, &index.to_string());
        if index == max_index {
            self.cache.delete(&key).await?;
        }
        Ok(indexed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[tokio::test]
    async fn test_cycles_through_indices_and_resets() {
        let cache = Arc::new(MemoryCache::new());
        let indexer = RoundRobinIndexer::new(cache.clone());

        let mut paths = Vec::new();
        for _ in 0..5 {
            paths.push(indexer.next("img/{n}.png", "{n}", 5).await.unwrap());
        }

        assert_eq!(
            paths,
            vec!["img/1.png", "img/2.png", "img/3.png", "img/4.png", "img/5.png"]
        );
        assert!(!cache.exists("img/{n}.png_indexedfile").await.unwrap());
        assert_eq!(indexer.next("img/{n}.png", "{n}", 5).await.unwrap(), "img/1.png");
    }

    #[tokio::test]
    async fn test_counters_are_per_path() {
        let indexer = RoundRobinIndexer::new(Arc::new(MemoryCache::new()));
        assert_eq!(indexer.next("a/#.jpg", "#", 3).await.unwrap(), "a/1.jpg");
        assert_eq!(indexer.next("b/#.jpg", "#", 3).await.unwrap(), "b/1.jpg");
        assert_eq!(indexer.next("a/#.jpg", "#", 3).await.unwrap(), "a/2.jpg");
    }
}
