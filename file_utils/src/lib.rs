mod safe_file_creator;

pub use safe_file_creator::SafeFileCreator;
