use std::collections::HashMap;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parts_threadpool::{MultithreadedRuntimeError, ThreadPool};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{Id as TaskId, JoinSet};
use tracing::{Instrument, error, info, info_span};

use crate::chunk_name::ChunkFileName;
use crate::errors::{FilePartsError, Result};

/// A chunk file that was written completely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkRecord {
    pub index: u64,
    pub path: PathBuf,
    pub len: u64,
}

/// A chunk whose write failed.  Sibling chunks are unaffected.
#[derive(Debug)]
pub struct ChunkWriteFailure {
    pub index: u64,
    pub path: PathBuf,
    pub error: FilePartsError,
}

type ChunkWriteOutcome = std::io::Result<u64>;

/// Helper to parallelize chunk file writes during a split.
///
/// Every chunk needs a permit from [`ParallelChunkWriter::acquire_permit`] before its buffer is
/// filled; the permit travels with the write and is released when the write finishes.  At most
/// `max_concurrent_writes` chunk buffers are alive at any time, counting the one being read.
///
/// [`ParallelChunkWriter::finalize`] waits for every write and must be called before the writer
/// is dropped; dropping it aborts the writes still running.
pub(crate) struct ParallelChunkWriter {
    output_dir: PathBuf,
    original: OsString,

    write_tasks: JoinSet<ChunkWriteOutcome>,

    // The chunk each running task writes.
    task_chunks: HashMap<TaskId, (u64, PathBuf)>,

    // Rate limiter
    write_limiter: Arc<Semaphore>,

    threadpool: Arc<ThreadPool>,
}

impl ParallelChunkWriter {
    pub fn new(
        output_dir: impl AsRef<Path>,
        original: impl Into<OsString>,
        threadpool: Arc<ThreadPool>,
        max_concurrent_writes: usize,
    ) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            original: original.into(),
            write_tasks: JoinSet::new(),
            task_chunks: HashMap::new(),
            write_limiter: Arc::new(Semaphore::new(max_concurrent_writes.max(1))),
            threadpool,
        }
    }

    /// Waits until fewer than `max_concurrent_writes` chunks are held.  The semaphore is fair, so
    /// chunks are started in index order.
    pub async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.write_limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| FilePartsError::InternalError(e.to_string()))
    }

    /// Schedules `payload` to be written as chunk `index`; `write_permit` is released once the
    /// write completes.
    pub fn write_chunk(&mut self, write_permit: OwnedSemaphorePermit, index: u64, payload: Vec<u8>) {
        let path = ChunkFileName::new(self.original.clone(), index).path_in(&self.output_dir);
        let task_path = path.clone();

        let write = async move {
            let len = payload.len() as u64;
            let result = tokio::fs::write(&task_path, &payload).await.map(|_| len);
            drop(payload);
            drop(write_permit);

            if result.is_ok() {
                info!("Created chunk: {}", task_path.display());
            }
            result
        };

        self.spawn_tracked(index, path, write);
    }

    fn spawn_tracked<F>(&mut self, index: u64, path: PathBuf, write: F)
    where
        F: Future<Output = ChunkWriteOutcome> + Send + 'static,
    {
        let span = info_span!("write_chunk", index);
        let abort_handle = self
            .write_tasks
            .spawn_on(write.instrument(span), &self.threadpool.handle());
        self.task_chunks.insert(abort_handle.id(), (index, path));
    }

    /// Waits for all scheduled writes and returns the written chunks and the failures, each ordered
    /// by index.
    pub async fn finalize(mut self) -> (Vec<ChunkRecord>, Vec<ChunkWriteFailure>) {
        let mut written = Vec::with_capacity(self.task_chunks.len());
        let mut failures = Vec::new();

        while let Some(joined) = self.write_tasks.join_next_with_id().await {
            let (task_id, outcome) = match joined {
                Ok((task_id, result)) => (task_id, result.map_err(FilePartsError::from)),
                Err(join_error) => (join_error.id(), Err(MultithreadedRuntimeError::from(join_error).into())),
            };

            let Some((index, path)) = self.task_chunks.remove(&task_id) else {
                error!("Finished write task {task_id} is not tracked");
                continue;
            };

            match outcome {
                Ok(len) => written.push(ChunkRecord { index, path, len }),
                Err(e) => {
                    error!("Failed to write chunk {index} to {}: {e}", path.display());
                    failures.push(ChunkWriteFailure { index, path, error: e });
                },
            }
        }

        written.sort_by_key(|c| c.index);
        failures.sort_by_key(|f| f.index);
        (written, failures)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;
    use tokio::runtime::Handle;
    use tokio::time::timeout;
    use tracing_test::traced_test;

    use super::*;

    fn writer_in(dir: &Path, max_concurrent_writes: usize) -> ParallelChunkWriter {
        ParallelChunkWriter::new(dir, "data.bin", ThreadPool::from_external(Handle::current()), max_concurrent_writes)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_writes_all_chunks() {
        let dir = tempdir().unwrap();
        let mut writer = writer_in(dir.path(), 2);

        for index in 0..6u64 {
            let permit = writer.acquire_permit().await.unwrap();
            writer.write_chunk(permit, index, vec![index as u8; 3]);
        }
        let (written, failures) = writer.finalize().await;

        assert!(failures.is_empty());
        assert_eq!(written.iter().map(|c| c.index).collect::<Vec<_>>(), (0..6).collect::<Vec<_>>());
        for chunk in &written {
            assert_eq!(chunk.len, 3);
            assert_eq!(std::fs::read(&chunk.path).unwrap(), vec![chunk.index as u8; 3]);
        }
    }

    #[tokio::test]
    async fn test_writes_in_flight_are_bounded() {
        let dir = tempdir().unwrap();
        let mut writer = writer_in(dir.path(), 2);

        let first = writer.acquire_permit().await.unwrap();
        let second = writer.acquire_permit().await.unwrap();

        // Both slots are taken, so the next chunk has to wait.
        assert!(timeout(Duration::from_millis(50), writer.acquire_permit()).await.is_err());

        // Finishing a write frees its slot.
        writer.write_chunk(first, 0, b"abc".to_vec());
        let third = timeout(Duration::from_secs(5), writer.acquire_permit()).await.unwrap().unwrap();

        assert!(timeout(Duration::from_millis(50), writer.acquire_permit()).await.is_err());
        drop(second);
        drop(third);
        assert!(timeout(Duration::from_secs(5), writer.acquire_permit()).await.is_ok());

        let (written, failures) = writer.finalize().await;
        assert_eq!(written.len(), 1);
        assert!(failures.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_write_is_reported() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("data.bin._1")).unwrap();
        let mut writer = writer_in(dir.path(), 0);

        for index in 0..3u64 {
            let permit = writer.acquire_permit().await.unwrap();
            writer.write_chunk(permit, index, b"xyz".to_vec());
        }
        let (written, failures) = writer.finalize().await;

        assert_eq!(written.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert!(matches!(failures[0].error, FilePartsError::IoError(_)));
        assert!(logs_contain("Failed to write chunk 1"));
    }

    fn task_should_panic() -> bool {
        true
    }

    #[tokio::test]
    #[traced_test]
    async fn test_panicked_write_keeps_its_chunk() {
        let dir = tempdir().unwrap();
        let mut writer = writer_in(dir.path(), 2);

        let permit = writer.acquire_permit().await.unwrap();
        writer.write_chunk(permit, 0, b"ok".to_vec());

        let path = dir.path().join("data.bin._1");
        writer.spawn_tracked(1, path.clone(), async {
            if task_should_panic() {
                panic!("write task blew up");
            }
            Ok(0)
        });

        let (written, failures) = writer.finalize().await;

        assert_eq!(written.len(), 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert_eq!(failures[0].path, path);
        assert!(matches!(
            failures[0].error,
            FilePartsError::RuntimeError(MultithreadedRuntimeError::TaskPanic(_))
        ));
        assert!(logs_contain("Failed to write chunk 1"));
    }
}
