use std::path::PathBuf;

use parts_threadpool::MultithreadedRuntimeError;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FilePartsError {
    #[error("Not a regular file: {0:?}")]
    NotAFile(PathBuf),

    #[error("Not a directory: {0:?}")]
    NotADirectory(PathBuf),

    #[error("Invalid chunk size {0}; chunk size must be positive")]
    InvalidChunkSize(u64),

    #[error("Cannot derive chunk names from file name {0:?}")]
    InvalidFileName(PathBuf),

    #[error("Chunk {index} of {original} is missing")]
    MissingChunk { original: String, index: u64 },

    #[error("Chunk {index} of {original} is present more than once")]
    DuplicateChunk { original: String, index: u64 },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Runtime error: {0}")]
    RuntimeError(#[from] MultithreadedRuntimeError),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl FilePartsError {
    /// True for errors caused by the arguments of a call, raised before anything is written.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            FilePartsError::NotAFile(_)
                | FilePartsError::NotADirectory(_)
                | FilePartsError::InvalidChunkSize(_)
                | FilePartsError::InvalidFileName(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FilePartsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_classification() {
        assert!(FilePartsError::NotAFile(PathBuf::from("a")).is_input_error());
        assert!(FilePartsError::InvalidChunkSize(0).is_input_error());
        assert!(
            !FilePartsError::MissingChunk {
                original: "a".to_owned(),
                index: 1
            }
            .is_input_error()
        );
        assert!(!FilePartsError::from(std::io::Error::other("disk full")).is_input_error());
    }
}
