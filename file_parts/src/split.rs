use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parts_threadpool::ThreadPool;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info};

use crate::chunk_name::{source_file_name, split_output_dir};
use crate::constants::{DEFAULT_MAX_CHUNK_SIZE, MAX_CONCURRENT_CHUNK_WRITES};
use crate::errors::{FilePartsError, Result};
use crate::parallel_chunk_writer::{ChunkRecord, ChunkWriteFailure, ParallelChunkWriter};

/// Settings for [`FileSplitter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitConfig {
    /// Every chunk but the last is exactly this many bytes.
    pub max_chunk_size: u64,

    /// Directory to create `<file name>_parts` in; the source's own directory if None.
    pub output_root: Option<PathBuf>,

    /// Upper bound on chunk writes in flight.
    pub max_concurrent_writes: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE.as_u64(),
            output_root: None,
            max_concurrent_writes: *MAX_CONCURRENT_CHUNK_WRITES,
        }
    }
}

impl SplitConfig {
    pub fn new(max_chunk_size: u64) -> Self {
        Self {
            max_chunk_size,
            ..Default::default()
        }
    }

    pub fn with_output_root(mut self, output_root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(output_root.into());
        self
    }

    pub fn with_max_concurrent_writes(mut self, max_concurrent_writes: usize) -> Self {
        self.max_concurrent_writes = max_concurrent_writes;
        self
    }
}

/// The outcome of splitting one file.
#[derive(Debug)]
pub struct SplitReport {
    pub source: PathBuf,
    pub output_dir: PathBuf,

    /// Number of chunks scheduled, whether or not their writes succeeded.
    pub chunk_count: u64,
    pub bytes_read: u64,

    pub written: Vec<ChunkRecord>,
    pub failures: Vec<ChunkWriteFailure>,
}

impl SplitReport {
    /// True if every scheduled chunk was written.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.written.len() as u64 == self.chunk_count
    }
}

impl fmt::Display for SplitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Split {} ({} bytes) into {} chunks in {}: {} written, {} failed",
            self.source.display(),
            self.bytes_read,
            self.chunk_count,
            self.output_dir.display(),
            self.written.len(),
            self.failures.len()
        )
    }
}

/// Splits files into fixed-size chunk files.
///
/// The source is read sequentially by the calling task, which also assigns chunk indices; only the
/// chunk writes run in parallel on the threadpool.
pub struct FileSplitter {
    config: SplitConfig,
    threadpool: Arc<ThreadPool>,
}

impl FileSplitter {
    pub fn new(config: SplitConfig, threadpool: Arc<ThreadPool>) -> Self {
        Self { config, threadpool }
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// Splits `source` into `<file name>._<index>` chunk files and returns once every scheduled
    /// write has finished.
    ///
    /// Argument errors are returned before anything is created.  A failed chunk write is logged and
    /// listed in the report without stopping the other chunks.  A failed read of the source stops
    /// scheduling; writes already in flight are waited for and the read error is returned.
    pub async fn split(&self, source: impl AsRef<Path>) -> Result<SplitReport> {
        let source = source.as_ref();
        let max_chunk_size = self.config.max_chunk_size;

        if max_chunk_size == 0 {
            return Err(FilePartsError::InvalidChunkSize(max_chunk_size));
        }

        let source_len = match tokio::fs::metadata(source).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => return Err(FilePartsError::NotAFile(source.to_path_buf())),
        };

        let original = source_file_name(source)?;
        let output_dir = split_output_dir(source, self.config.output_root.as_deref())?;

        tokio::fs::create_dir_all(&output_dir).await?;
        info!(
            "Splitting {} ({source_len} bytes) into chunks of at most {max_chunk_size} bytes in {}",
            source.display(),
            output_dir.display()
        );

        let mut file = tokio::fs::File::open(source).await?;
        let mut writer = ParallelChunkWriter::new(
            &output_dir,
            original,
            self.threadpool.clone(),
            self.config.max_concurrent_writes,
        );

        let mut chunk_count = 0u64;
        let mut bytes_read = 0u64;

        let read_result: Result<()> = loop {
            // Take the write slot before filling the buffer so held chunks stay within the limit.
            let write_permit = match writer.acquire_permit().await {
                Ok(permit) => permit,
                Err(e) => break Err(e),
            };

            let capacity = max_chunk_size.min(source_len.saturating_sub(bytes_read));
            let mut payload = Vec::with_capacity(usize::try_from(capacity).unwrap_or(0));

            match (&mut file).take(max_chunk_size).read_to_end(&mut payload).await {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    bytes_read += n as u64;
                    debug!("Read chunk {chunk_count} ({n} bytes)");

                    writer.write_chunk(write_permit, chunk_count, payload);
                    chunk_count += 1;
                },
                Err(e) => break Err(e.into()),
            }
        };

        let (written, failures) = writer.finalize().await;

        if let Err(e) = read_result {
            error!("Splitting {} stopped after {chunk_count} chunks: {e}", source.display());
            return Err(e);
        }

        let report = SplitReport {
            source: source.to_path_buf(),
            output_dir,
            chunk_count,
            bytes_read,
            written,
            failures,
        };
        info!("{report}");

        Ok(report)
    }
}

/// Blocking convenience wrapper: splits `source` next to itself with the default concurrency on a
/// fresh threadpool.  Must not be called from within a tokio runtime.
pub fn split_file(source: impl AsRef<Path>, max_chunk_size: u64) -> Result<SplitReport> {
    split_file_with_config(source, SplitConfig::new(max_chunk_size))
}

pub fn split_file_with_config(source: impl AsRef<Path>, config: SplitConfig) -> Result<SplitReport> {
    let threadpool = ThreadPool::new()?;
    let splitter = FileSplitter::new(config, threadpool.clone());
    let source = source.as_ref().to_path_buf();

    threadpool.external_run_async_task(async move { splitter.split(&source).await })?
}
