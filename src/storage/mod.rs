//! Storage layer for Family Budget
//!
//! Provides JSON file storage and whole-file replacement with atomic
//! writes and automatic directory creation.

pub mod file_io;

pub use file_io::{read_json, replace_file_atomic, write_json_atomic};
