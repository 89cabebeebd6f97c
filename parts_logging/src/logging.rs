use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, Local};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

utils::configurable_constants! {

    /// The log destination.  By default, logs go to the console.
    ///
    /// If this path exists as a directory or the path ends with a /, then a new log file named
    /// `<LOG_PREFIX>_<timestamp>_<pid>.log` is created in that directory for each run.  Otherwise
    /// the path is used as the log file itself.
    ///
    /// If LOG_DEST is given but empty, then logs are dumped to the console.
    ref LOG_DEST : Option<String> = None;

    /// The format the logs are printed in. If "json", then logs are dumped as json blobs; otherwise they
    /// are treated as text.  By default logging to files is done in json and console logging is done with text.
    ref LOG_FORMAT : Option<String> = None;

    /// The base name for a log file when logging to a directory.
    ref LOG_PREFIX : String = "file-parts".to_owned();
}

/// Default log level when neither `RUST_LOG` nor the caller sets one.
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_FILE_NAME: &str = "file-parts.log";

#[derive(Clone, Debug, PartialEq)]
pub enum LoggingMode {
    Directory(PathBuf),
    File(PathBuf),
    Console,
}

impl LoggingMode {
    /// Interprets a user supplied destination the same way `FILE_PARTS_LOG_DEST` is interpreted.
    pub fn from_destination(log_dest: &str) -> Self {
        if log_dest.is_empty() {
            return LoggingMode::Console;
        }

        let path = PathBuf::from(log_dest);
        if log_dest.ends_with('/') || log_dest.ends_with('\\') || path.is_dir() {
            LoggingMode::Directory(path)
        } else {
            LoggingMode::File(path)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub logging_mode: LoggingMode,
    pub use_json: bool,

    /// Filter directive used when `RUST_LOG` is not set, e.g. "info" or "debug".
    pub default_level: String,
}

impl LoggingConfig {
    /// Builds the configuration from the `FILE_PARTS_LOG_*` environment settings.
    pub fn from_env() -> Self {
        let logging_mode = match &*LOG_DEST {
            Some(log_dest) => LoggingMode::from_destination(log_dest),
            None => LoggingMode::Console,
        };
        Self::with_mode(logging_mode)
    }

    pub fn with_mode(logging_mode: LoggingMode) -> Self {
        let use_json = match &*LOG_FORMAT {
            Some(format) => format.to_ascii_lowercase().trim() == "json",
            None => logging_mode != LoggingMode::Console,
        };

        Self {
            logging_mode,
            use_json,
            default_level: DEFAULT_LOG_LEVEL.to_owned(),
        }
    }

    pub fn with_default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.default_level))
            .unwrap_or_default()
    }
}

/// The main entry point to set up logging.  Should only be called once per process.
pub fn init_logging(cfg: LoggingConfig) {
    let maybe_log_file = match &cfg.logging_mode {
        LoggingMode::Directory(log_dir) => Some(log_file_in_dir(log_dir)),
        LoggingMode::File(path) => Some(path.clone()),
        LoggingMode::Console => None,
    };

    if let Some(log_file) = maybe_log_file {
        // Attempt logging to a file, but fallback to console logging on error.
        if let Err(e) = init_logging_to_file(&log_file, &cfg) {
            init_logging_to_console(&cfg);
            error!("Error logging to file {log_file:?} ({e}); falling back to console logging.");
        }
    } else {
        init_logging_to_console(&cfg);
    }

    info!("file-parts {}", env!("CARGO_PKG_VERSION"));
}

fn init_logging_to_console(cfg: &LoggingConfig) {
    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);

    let registry = tracing_subscriber::registry();
    if cfg.use_json {
        registry.with(fmt_layer_base.json().with_filter(cfg.env_filter())).init();
    } else {
        registry.with(fmt_layer_base.compact().with_filter(cfg.env_filter())).init();
    }
}

fn init_logging_to_file(path: &Path, cfg: &LoggingConfig) -> io::Result<()> {
    use tracing_appender::{non_blocking, rolling};

    let (log_directory, file_name) = prepare_log_file(path)?;

    let file_appender = rolling::never(log_directory, file_name);
    let (writer, guard) = non_blocking(file_appender);

    // The worker guard must outlive the subscriber or buffered lines are lost.
    static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
    let _ = FILE_GUARD.set(guard);

    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer);

    let registry = tracing_subscriber::registry();
    if cfg.use_json {
        registry.with(fmt_layer_base.json().with_filter(cfg.env_filter())).init();
    } else {
        registry.with(fmt_layer_base.with_filter(cfg.env_filter())).init();
    }

    Ok(())
}

/// Splits `path` into the directory and file name used by the appender, creating the directory and
/// checking that the file can be opened.  Existing log contents are kept; the appender appends.
fn prepare_log_file(path: &Path) -> io::Result<(PathBuf, OsString)> {
    let (path, file_name) = match path.file_name() {
        Some(name) => (path.to_path_buf(), name.to_os_string()),
        None => (path.join(DEFAULT_LOG_FILE_NAME), OsString::from(DEFAULT_LOG_FILE_NAME)),
    };

    let log_directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            parent.to_path_buf()
        },
        _ => PathBuf::from("."),
    };

    // Fail here, before the subscriber is installed, if the location is not writeable.
    OpenOptions::new().create(true).append(true).open(&path)?;

    Ok((log_directory, file_name))
}

/// Build `<prefix>_<YYYYMMDD>T<HHMMSS><mmm><+/-HHMM>_<pid>.log` in `dir`.
pub fn log_file_in_dir(dir: impl AsRef<Path>) -> PathBuf {
    let now_local: DateTime<Local> = Local::now();
    let now_fixed: DateTime<FixedOffset> = now_local.with_timezone(now_local.offset());

    // ISO 8601 basic without colons, e.g. 20250915T083210123-0700
    let ts = now_fixed.format("%Y%m%dT%H%M%S%3f%z");

    let filename = format!("{}_{}_{}.log", LOG_PREFIX.as_str(), ts, std::process::id());
    dir.as_ref().join(filename)
}
