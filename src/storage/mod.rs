//! Storage helpers
//!
//! Atomic file writes shared by the settings file, the restore marker, and
//! archive creation.

pub mod file_io;

pub use file_io::{read_json, write_atomic_with, write_json_atomic, write_text_atomic};
