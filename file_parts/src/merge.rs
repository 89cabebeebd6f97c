use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use error_printer::ErrorPrinter;
use file_utils::SafeFileCreator;
use tracing::{debug, info};

use crate::chunk_name::ChunkFileName;
use crate::errors::{FilePartsError, Result};

/// The chunk files of one original file found in a folder, ordered by index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkGroup {
    pub original: OsString,
    pub chunks: Vec<(u64, PathBuf)>,
}

impl ChunkGroup {
    pub fn chunk_paths(&self) -> Vec<PathBuf> {
        self.chunks.iter().map(|(_, path)| path.clone()).collect()
    }

    /// Checks that the indices are exactly 0, 1, .., n - 1.
    fn check_contiguous(&self) -> Result<()> {
        let mut expected = 0u64;
        for (index, _) in &self.chunks {
            if *index < expected {
                return Err(FilePartsError::DuplicateChunk {
                    original: self.original.to_string_lossy().into_owned(),
                    index: *index,
                });
            }
            if *index > expected {
                return Err(FilePartsError::MissingChunk {
                    original: self.original.to_string_lossy().into_owned(),
                    index: expected,
                });
            }
            expected += 1;
        }
        Ok(())
    }
}

/// The result of scanning a folder for chunk files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkScan {
    /// Groups ordered by original file name.
    pub groups: Vec<ChunkGroup>,

    /// Regular files in the folder that are not chunk files.
    pub ignored_files: usize,
}

/// Lists the regular files directly inside `folder` and groups the chunk files among them.
pub fn scan_chunk_groups(folder: impl AsRef<Path>) -> Result<ChunkScan> {
    let folder = folder.as_ref();

    let mut names = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();

        // Follows symlinks, so a linked chunk counts like the file it points to.
        let Ok(metadata) = std::fs::metadata(&path).debug_error(format!("Skipping {}", path.display())) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        if let Some(name) = path.file_name() {
            names.push((name.to_os_string(), path));
        }
    }
    names.sort();

    let mut grouped = BTreeMap::<OsString, Vec<(u64, PathBuf)>>::new();
    let mut ignored_files = 0;

    for (name, path) in names {
        let Some(chunk_name) = ChunkFileName::try_parse(&name) else {
            if ChunkFileName::has_chunk_marker(&name) {
                debug!("Ignoring {} with a non-numeric chunk index", path.display());
            }
            ignored_files += 1;
            continue;
        };

        grouped.entry(chunk_name.original).or_default().push((chunk_name.index, path));
    }

    let groups = grouped
        .into_iter()
        .map(|(original, mut chunks)| {
            chunks.sort_by_key(|(index, _)| *index);
            ChunkGroup { original, chunks }
        })
        .collect();

    Ok(ChunkScan { groups, ignored_files })
}

/// A file rebuilt from its chunks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedFile {
    pub output: PathBuf,
    pub chunk_count: usize,
    pub bytes_written: u64,

    /// Chunk files that could not be deleted after the merge.
    pub undeleted: Vec<PathBuf>,
}

/// A group that could not be merged.  Its chunk files are left in place.
#[derive(Debug)]
pub struct GroupFailure {
    pub original: OsString,
    pub chunks: Vec<PathBuf>,
    pub error: FilePartsError,
}

/// The outcome of merging one folder.
#[derive(Debug, Default)]
pub struct MergeReport {
    pub folder: PathBuf,
    pub merged: Vec<MergedFile>,
    pub failures: Vec<GroupFailure>,
    pub ignored_files: usize,
}

impl MergeReport {
    pub fn merged_count(&self) -> usize {
        self.merged.len()
    }

    /// True if the folder held no chunk files at all.
    pub fn is_noop(&self) -> bool {
        self.merged.is_empty() && self.failures.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_noop() {
            return write!(f, "No chunk files found in {}", self.folder.display());
        }
        write!(
            f,
            "Merged {} files in {}: {} failed",
            self.merged.len(),
            self.folder.display(),
            self.failures.len()
        )
    }
}

/// Rebuilds every file whose chunks are found directly inside `folder`.
///
/// Each group is written to `<folder>/<original>` through a temporary file, so the output only
/// appears once all of its chunks were copied; the chunks are then deleted.  A group that fails
/// keeps its chunks and does not stop the remaining groups.
pub fn merge_folder(folder: impl AsRef<Path>) -> Result<MergeReport> {
    let folder = folder.as_ref();

    if !folder.is_dir() {
        return Err(FilePartsError::NotADirectory(folder.to_path_buf()));
    }

    let scan = scan_chunk_groups(folder)?;
    let mut report = MergeReport {
        folder: folder.to_path_buf(),
        ignored_files: scan.ignored_files,
        ..Default::default()
    };

    for group in scan.groups {
        match merge_group(folder, &group).log_error(format!("Failed to merge {}", group.original.to_string_lossy())) {
            Ok(merged) => report.merged.push(merged),
            Err(error) => report.failures.push(GroupFailure {
                chunks: group.chunk_paths(),
                original: group.original,
                error,
            }),
        }
    }

    info!("{report}");
    Ok(report)
}

fn merge_group(folder: &Path, group: &ChunkGroup) -> Result<MergedFile> {
    group.check_contiguous()?;

    let output = folder.join(&group.original);
    let mut writer = SafeFileCreator::new(&output)?;
    let mut bytes_written = 0;

    for (_, chunk_path) in &group.chunks {
        let mut chunk = File::open(chunk_path)?;
        bytes_written += std::io::copy(&mut chunk, &mut writer)?;
        info!("Added {} to {}", chunk_path.display(), output.display());
    }

    writer.close()?;
    info!("Merged {} chunks into {} ({bytes_written} bytes)", group.chunks.len(), output.display());

    let mut undeleted = Vec::new();
    for (_, chunk_path) in &group.chunks {
        match std::fs::remove_file(chunk_path).warn_error(format!("Failed to delete chunk {}", chunk_path.display())) {
            Ok(()) => info!("Deleted {}", chunk_path.display()),
            Err(_) => undeleted.push(chunk_path.clone()),
        }
    }

    Ok(MergedFile {
        output,
        chunk_count: group.chunks.len(),
        bytes_written,
        undeleted,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;
    use tracing_test::traced_test;

    use super::*;

    fn group(original: &str, indices: &[u64]) -> ChunkGroup {
        ChunkGroup {
            original: original.into(),
            chunks: indices.iter().map(|i| (*i, PathBuf::from(format!("{original}._{i}")))).collect(),
        }
    }

    #[test]
    fn test_contiguity() {
        assert!(group("a", &[0, 1, 2]).check_contiguous().is_ok());
        assert!(group("a", &[]).check_contiguous().is_ok());

        assert!(matches!(
            group("a", &[0, 2, 3]).check_contiguous(),
            Err(FilePartsError::MissingChunk { index: 1, .. })
        ));
        assert!(matches!(group("a", &[1, 2]).check_contiguous(), Err(FilePartsError::MissingChunk { index: 0, .. })));
        assert!(matches!(
            group("a", &[0, 1, 1, 2]).check_contiguous(),
            Err(FilePartsError::DuplicateChunk { index: 1, .. })
        ));
    }

    #[test]
    fn test_scan_groups_and_orders_numerically() {
        let dir = tempdir().unwrap();
        for i in [10, 2, 0, 1, 9, 3, 4, 5, 6, 7, 8] {
            fs::write(dir.path().join(format!("b.dat._{i}")), b"x").unwrap();
        }
        fs::write(dir.path().join("a.txt._0"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("a.txt._bak"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub._0")).unwrap();

        let scan = scan_chunk_groups(dir.path()).unwrap();

        assert_eq!(scan.ignored_files, 2);
        assert_eq!(scan.groups.len(), 2);
        assert_eq!(scan.groups[0].original, "a.txt");
        assert_eq!(scan.groups[1].original, "b.dat");
        let indices: Vec<u64> = scan.groups[1].chunks.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, (0..=10).collect::<Vec<_>>());
    }

    #[test]
    #[traced_test]
    fn test_merge_logs_progress() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f._0"), b"ab").unwrap();
        fs::write(dir.path().join("f._1"), b"cd").unwrap();

        let report = merge_folder(dir.path()).unwrap();

        assert_eq!(report.merged_count(), 1);
        assert_eq!(report.merged[0].bytes_written, 4);
        assert!(report.merged[0].undeleted.is_empty());
        assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"abcd");
        assert!(logs_contain("Added"));
        assert!(logs_contain("Deleted"));
    }

    #[test]
    #[traced_test]
    fn test_duplicate_index_keeps_chunks() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f._0"), b"ab").unwrap();
        fs::write(dir.path().join("f._1"), b"cd").unwrap();
        fs::write(dir.path().join("f._01"), b"cd").unwrap();

        let report = merge_folder(dir.path()).unwrap();

        assert_eq!(report.merged_count(), 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].chunks.len(), 3);
        assert!(matches!(report.failures[0].error, FilePartsError::DuplicateChunk { index: 1, .. }));
        assert!(!dir.path().join("f").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
        assert!(logs_contain("Failed to merge f"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_chunk_is_merged() {
        let dir = tempdir().unwrap();
        let elsewhere = tempdir().unwrap();
        fs::write(elsewhere.path().join("first"), b"ab").unwrap();
        std::os::unix::fs::symlink(elsewhere.path().join("first"), dir.path().join("f._0")).unwrap();
        fs::write(dir.path().join("f._1"), b"cd").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling._0")).unwrap();

        let report = merge_folder(dir.path()).unwrap();

        assert_eq!(report.merged_count(), 1);
        assert!(report.failures.is_empty());
        assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"abcd");
        assert!(fs::symlink_metadata(dir.path().join("f._0")).is_err());
        assert_eq!(fs::read(elsewhere.path().join("first")).unwrap(), b"ab");
    }

    #[test]
    fn test_empty_folder_is_noop() {
        let dir = tempdir().unwrap();
        let report = merge_folder(dir.path()).unwrap();
        assert!(report.is_noop());
        assert_eq!(report.to_string(), format!("No chunk files found in {}", dir.path().display()));
    }
}
