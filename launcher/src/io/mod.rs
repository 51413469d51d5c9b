//! I/O adapters for launcher commands.

pub mod compose;
pub mod config;
pub mod process;
pub mod python;
