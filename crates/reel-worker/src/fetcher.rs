//! Bounded-concurrency download of shot clips.

use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use tokio::sync::Semaphore;
use tracing::debug;

use reel_storage::BlobStore;

use crate::error::{WorkerError, WorkerResult};

/// Local file name for the shot at `index`.
pub fn shot_file_name(index: usize) -> String {
    format!("shot_{index:03}.mp4")
}

/// Download `keys` into `dest` with at most `limit` transfers in flight.
///
/// Paths come back in input order. The first failure fails the batch and
/// cancels the remaining downloads.
pub async fn fetch_all(
    store: &dyn BlobStore,
    keys: &[String],
    dest: &Path,
    limit: usize,
) -> WorkerResult<Vec<PathBuf>> {
    let semaphore = Semaphore::new(limit.max(1));

    let downloads = keys.iter().enumerate().map(|(index, key)| {
        let semaphore = &semaphore;
        async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| WorkerError::repository("download semaphore closed"))?;

            let path = dest.join(shot_file_name(index));
            store
                .download_to_path(key, &path)
                .await
                .map_err(|source| WorkerError::Fetch {
                    position: index + 1,
                    key: key.clone(),
                    source,
                })?;
            debug!("Fetched shot {} from {}", index + 1, key);
            Ok::<_, WorkerError>(path)
        }
    });

    try_join_all(downloads).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reel_storage::{MemoryBlobStore, StorageResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_paths_in_input_order() {
        let store = MemoryBlobStore::new();
        let keys: Vec<String> = (0..4).map(|i| format!("shots/{i}.mp4")).collect();
        for (i, key) in keys.iter().enumerate() {
            store.insert(key.clone(), vec![i as u8]).await;
        }
        let dir = TempDir::new().unwrap();

        let paths = fetch_all(&store, &keys, dir.path(), 2).await.unwrap();

        assert_eq!(paths.len(), 4);
        for (i, path) in paths.iter().enumerate() {
            assert_eq!(path.file_name().unwrap().to_str().unwrap(), shot_file_name(i));
            assert_eq!(std::fs::read(path).unwrap(), vec![i as u8]);
        }
    }

    #[tokio::test]
    async fn test_missing_key_fails_batch() {
        let store = MemoryBlobStore::new();
        store.insert("shots/0.mp4", b"a".to_vec()).await;
        let keys = vec!["shots/0.mp4".to_string(), "shots/missing.mp4".to_string()];
        let dir = TempDir::new().unwrap();

        let err = fetch_all(&store, &keys, dir.path(), 5).await.unwrap_err();
        match err {
            WorkerError::Fetch { position, key, source } => {
                assert_eq!(position, 2);
                assert_eq!(key, "shots/missing.mp4");
                assert!(source.is_not_found());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Records the highest number of downloads running at once.
    struct SlowStore {
        inner: MemoryBlobStore,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl BlobStore for SlowStore {
        async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
            self.inner.download(key).await
        }

        async fn download_to_path(&self, key: &str, path: &Path) -> StorageResult<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let result = self.inner.download_to_path(key, path).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn upload_bytes(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<()> {
            self.inner.upload_bytes(data, key, content_type).await
        }

        async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
            self.inner.upload_file(path, key, content_type).await
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let inner = MemoryBlobStore::new();
        let keys: Vec<String> = (0..8).map(|i| format!("k{i}")).collect();
        for key in &keys {
            inner.insert(key.clone(), b"x".to_vec()).await;
        }
        let store = SlowStore {
            inner,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let dir = TempDir::new().unwrap();

        fetch_all(&store, &keys, dir.path(), 3).await.unwrap();
        let peak = store.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {peak}");
        assert!(peak >= 2);
    }
}
