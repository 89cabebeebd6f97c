use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::constants::{CHUNK_INDEX_MARKER, OUTPUT_DIR_SUFFIX};
use crate::errors::{FilePartsError, Result};

/// The name of one chunk file: `<original>._<index>`.
///
/// `original` is the full file name of the source (stem and extension), so `movie.mkv` chunk 3 is
/// `movie.mkv._3`.  Indices are written in decimal without padding.  Names are kept as `OsString`
/// so sources whose names are not valid UTF-8 still round-trip.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkFileName {
    pub original: OsString,
    pub index: u64,
}

impl ChunkFileName {
    pub fn new(original: impl Into<OsString>, index: u64) -> Self {
        Self {
            original: original.into(),
            index,
        }
    }

    /// Parses a chunk file name, returning None for anything that is not one.
    ///
    /// The name is split at its last `.`; the tail must be `_` followed by a decimal index and the
    /// head must be non-empty.
    pub fn try_parse(file_name: &OsStr) -> Option<Self> {
        let (original, tail) = split_at_last_dot(file_name)?;
        let digits = tail.strip_prefix(b"_")?;

        if original.is_empty() || digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }

        let index = std::str::from_utf8(digits).ok()?.parse::<u64>().ok()?;

        // SAFETY: `original` is a prefix of `file_name` ending right before an ASCII '.', which is
        // a valid split point of the platform encoding.
        let original = unsafe { OsStr::from_encoded_bytes_unchecked(original) };
        Some(Self::new(original, index))
    }

    /// True if the name carries the chunk marker, whether or not the index parses.
    pub fn has_chunk_marker(file_name: &OsStr) -> bool {
        split_at_last_dot(file_name).is_some_and(|(_, tail)| tail.starts_with(b"_"))
    }

    pub fn file_name(&self) -> OsString {
        let mut name = self.original.clone();
        name.push(format!("{CHUNK_INDEX_MARKER}{}", self.index));
        name
    }

    pub fn path_in(&self, dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(self.file_name())
    }
}

fn split_at_last_dot(file_name: &OsStr) -> Option<(&[u8], &[u8])> {
    let bytes = file_name.as_encoded_bytes();
    let dot = bytes.iter().rposition(|b| *b == b'.')?;
    Some((&bytes[..dot], &bytes[dot + 1..]))
}

impl fmt::Display for ChunkFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{CHUNK_INDEX_MARKER}{}", self.original.to_string_lossy(), self.index)
    }
}

/// The file name of `source`, which chunk names are derived from.
pub fn source_file_name(source: &Path) -> Result<OsString> {
    source
        .file_name()
        .map(OsStr::to_os_string)
        .ok_or_else(|| FilePartsError::InvalidFileName(source.to_path_buf()))
}

/// The directory chunks of `source` are written to: `<root>/<file name>_parts`, where root defaults
/// to the directory containing the source.
pub fn split_output_dir(source: &Path, output_root: Option<&Path>) -> Result<PathBuf> {
    let mut dir_name = source_file_name(source)?;
    dir_name.push(OUTPUT_DIR_SUFFIX);

    let root = match output_root {
        Some(root) => root.to_path_buf(),
        None => source.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    Ok(root.join(dir_name))
}
