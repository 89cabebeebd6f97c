use utils::ByteSize;

utils::configurable_constants! {

    /// The chunk size used when the caller does not give one.
    /// Override with FILE_PARTS_DEFAULT_MAX_CHUNK_SIZE, e.g. "64mib".
    ref DEFAULT_MAX_CHUNK_SIZE: ByteSize = ByteSize::gib(1);

    /// The maximum number of chunk buffers a split holds at once, counting the one being read and
    /// those being written. Peak memory is about this many times the chunk size.
    ref MAX_CONCURRENT_CHUNK_WRITES: usize = 8;
}

/// Appended to a source file name to form its split output directory.
pub const OUTPUT_DIR_SUFFIX: &str = "_parts";

/// Separates the original file name from the chunk index in a chunk file name.
pub const CHUNK_INDEX_MARKER: &str = "._";
