use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::distr::{Alphanumeric, SampleString};
use tracing::debug;

const TEMP_SUFFIX_LEN: usize = 10;

/// Writes a file under a temporary name next to its destination and moves it into place on
/// [`SafeFileCreator::close`].
///
/// Readers never observe a partially written destination: until `close` succeeds the destination
/// path is untouched (an existing file there keeps its old contents).  If the creator is dropped
/// without being closed, or `close` fails, the temporary file is removed.
pub struct SafeFileCreator {
    dest_path: PathBuf,
    temp_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl SafeFileCreator {
    /// Opens a new temporary file in the destination's directory.  The directory must exist.
    pub fn new(dest_path: impl AsRef<Path>) -> io::Result<Self> {
        let dest_path = dest_path.as_ref().to_path_buf();
        let temp_path = temp_path_for(&dest_path)?;

        let file = OpenOptions::new().write(true).create_new(true).open(&temp_path)?;

        Ok(Self {
            dest_path,
            temp_path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn dest_path(&self) -> &Path {
        &self.dest_path
    }

    /// Flushes all data to disk and renames the temporary file to the destination path,
    /// replacing any file already there.
    pub fn close(mut self) -> io::Result<()> {
        let Some(writer) = self.writer.take() else {
            return Err(io::Error::other("SafeFileCreator already closed"));
        };

        let result = finish(writer, &self.temp_path, &self.dest_path);

        if result.is_err() {
            let _ = std::fs::remove_file(&self.temp_path);
        }

        result
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("SafeFileCreator already closed"))
    }
}

fn finish(writer: BufWriter<File>, temp_path: &Path, dest_path: &Path) -> io::Result<()> {
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(temp_path, dest_path)
}

fn temp_path_for(dest_path: &Path) -> io::Result<PathBuf> {
    let Some(file_name) = dest_path.file_name() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("destination {dest_path:?} has no file name"),
        ));
    };

    let random = Alphanumeric.sample_string(&mut rand::rng(), TEMP_SUFFIX_LEN);
    let temp_name = format!(".{}.{random}.tmp", file_name.to_string_lossy());

    Ok(dest_path.with_file_name(temp_name))
}

impl Write for SafeFileCreator {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for SafeFileCreator {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            drop(writer);
            debug!("Discarding unfinished file {:?} (destination {:?})", self.temp_path, self.dest_path);
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_close_moves_into_place() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("out.bin");

        let mut fw = SafeFileCreator::new(&dest)?;
        fw.write_all(b"hello ")?;
        fw.write_all(b"world")?;
        assert!(!dest.exists());
        fw.close()?;

        assert_eq!(fs::read(&dest)?, b"hello world");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn test_replaces_existing_file() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("out.bin");
        fs::write(&dest, b"old contents that are longer")?;

        let mut fw = SafeFileCreator::new(&dest)?;
        fw.write_all(b"new")?;
        fw.close()?;

        assert_eq!(fs::read(&dest)?, b"new");
        Ok(())
    }

    #[test]
    fn test_drop_discards_temp_file() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("out.bin");
        fs::write(&dest, b"keep me")?;

        {
            let mut fw = SafeFileCreator::new(&dest)?;
            fw.write_all(b"partial")?;
        }

        assert_eq!(fs::read(&dest)?, b"keep me");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn test_failed_rename_cleans_up() -> Result<()> {
        let dir = tempdir()?;
        let dest = dir.path().join("taken");
        fs::create_dir(&dest)?;
        fs::write(dest.join("inner"), b"x")?;

        let mut fw = SafeFileCreator::new(&dest)?;
        fw.write_all(b"data")?;
        assert!(fw.close().is_err());

        assert!(dest.is_dir());
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }
}
