//! Deterministic, pure logic shared by the launcher.
//!
//! Core modules must be free of process and filesystem side effects. Where a
//! rule depends on the filesystem (runtime resolution), the check is injected.

pub mod compose;
pub mod gpu;
pub mod runtime;
pub mod types;
