//! File I/O elements.
//!
//! - [`FileSrc`]: reads a file in fixed-size chunks

mod file;

pub use file::FileSrc;
