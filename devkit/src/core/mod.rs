//! Deterministic, pure logic shared by the devkit.
//!
//! Core modules must be free of I/O side effects, except that path
//! resolution inspects (never modifies) the filesystem to resolve symlinks.

pub mod credentials;
pub mod path;
pub mod readiness;
pub mod retry;
pub mod types;
pub mod validation;
