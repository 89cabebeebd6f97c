use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use parts_logging::{LoggingConfig, LoggingMode, init_logging};
use parts_threadpool::ThreadPool;
use utils::ByteSize;

use crate::errors::Result;
use crate::merge::merge_folder;
use crate::split::{FileSplitter, SplitConfig};

#[derive(Subcommand, Debug)]
#[non_exhaustive]
enum Command {
    /// Split a file into fixed-size chunk files in "<file name>_parts".
    Split(SplitArg),

    /// Rebuild every file whose chunk files are in a folder, then delete the chunks.
    Merge(MergeArg),
}

#[derive(Args, Debug)]
struct SplitArg {
    /// The file to split.
    path: PathBuf,

    /// Maximum size of each chunk, e.g. "4", "64mb" or "1gib".  Defaults to FILE_PARTS_DEFAULT_MAX_CHUNK_SIZE.
    #[clap(long, short = 's')]
    chunk_size: Option<ByteSize>,

    /// Create the "<file name>_parts" directory here instead of next to the file.
    #[clap(long)]
    output_root: Option<PathBuf>,

    /// The number of chunk writes in flight.  Defaults to FILE_PARTS_MAX_CONCURRENT_CHUNK_WRITES.
    #[clap(long)]
    concurrency: Option<usize>,
}

#[derive(Args, Debug)]
struct MergeArg {
    /// The folder holding the chunk files.
    folder: PathBuf,
}

#[derive(Args, Debug)]
struct CliOverrides {
    /// Increase verbosity of output (-v, -vv, etc.)
    #[clap(long, short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// Write logs to this file, or to a new file in this directory.  Writes to stderr if not provided.
    #[clap(long, short)]
    pub log: Option<PathBuf>,
}

impl CliOverrides {
    fn logging_config(&self) -> LoggingConfig {
        let cfg = match &self.log {
            Some(path) => LoggingConfig::with_mode(LoggingMode::from_destination(&path.to_string_lossy())),
            None => LoggingConfig::from_env(),
        };

        let level = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        cfg.with_default_level(level)
    }
}

/// Splits large files into numbered chunk files and merges them back.
///
/// "split" writes "<name>._0", "<name>._1", .. into "<name>_parts"; "merge" concatenates every such
/// group found in a folder back into "<name>" and removes the chunk files.
#[derive(Parser, Debug)]
#[clap(name = "file-parts", version, propagate_version = true)]
pub struct FilePartsApp {
    #[clap(flatten)]
    overrides: CliOverrides,

    #[clap(subcommand)]
    command: Command,
}

impl FilePartsApp {
    /// Installs the global log subscriber.  Call at most once per process.
    pub fn init_logging(&self) {
        init_logging(self.overrides.logging_config());
    }

    /// Runs the command, printing its summary to stdout.  Returns false if any chunk or group
    /// failed.
    pub fn run(self) -> Result<bool> {
        self.command.run()
    }
}

impl Command {
    fn run(self) -> Result<bool> {
        match self {
            Command::Split(args) => split_command(args),
            Command::Merge(args) => merge_command(args),
        }
    }
}

fn split_command(args: SplitArg) -> Result<bool> {
    let mut config = SplitConfig::default();
    if let Some(chunk_size) = args.chunk_size {
        config.max_chunk_size = chunk_size.as_u64();
    }
    if let Some(concurrency) = args.concurrency {
        config = config.with_max_concurrent_writes(concurrency);
    }
    if let Some(output_root) = args.output_root {
        config = config.with_output_root(output_root);
    }

    let threadpool = ThreadPool::new()?;
    let splitter = FileSplitter::new(config, threadpool.clone());
    let path = args.path;

    let report = threadpool.external_run_async_task(async move { splitter.split(&path).await })??;

    println!("{report}");
    for failure in &report.failures {
        println!("  chunk {} ({}): {}", failure.index, failure.path.display(), failure.error);
    }
    Ok(report.is_complete())
}

fn merge_command(args: MergeArg) -> Result<bool> {
    let report = merge_folder(&args.folder)?;

    println!("{report}");
    for merged in &report.merged {
        println!("  {} ({} chunks, {} bytes)", merged.output.display(), merged.chunk_count, merged.bytes_written);
        for path in &merged.undeleted {
            println!("    not deleted: {}", path.display());
        }
    }
    for failure in &report.failures {
        println!("  {}: {}", failure.original.to_string_lossy(), failure.error);
    }
    Ok(report.is_complete())
}
