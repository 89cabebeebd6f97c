pub mod app;
mod chunk_name;
pub mod constants;
pub mod errors;
mod merge;
mod parallel_chunk_writer;
mod split;

pub use chunk_name::{ChunkFileName, split_output_dir};
pub use errors::{FilePartsError, Result};
pub use merge::{ChunkGroup, ChunkScan, GroupFailure, MergeReport, MergedFile, merge_folder, scan_chunk_groups};
pub use parallel_chunk_writer::{ChunkRecord, ChunkWriteFailure};
pub use split::{FileSplitter, SplitConfig, SplitReport, split_file, split_file_with_config};
