pub mod file_utils;

pub use file_utils::{collect_files, read_source_file};
