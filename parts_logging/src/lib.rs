mod logging;

pub use logging::{LOG_DEST, LOG_FORMAT, LOG_PREFIX, LoggingConfig, LoggingMode, init_logging, log_file_in_dir};
