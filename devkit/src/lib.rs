//! Local stand-in for the module platform API.
//!
//! The devkit registers module manifests, records mocked module runs and
//! reports the health of its downstream dependencies. State lives in two JSON
//! documents under one state directory.
//!
//! - **[`core`]**: Pure logic (record types, request validation, path
//!   containment, retry policy, readiness). No I/O.
//! - **[`io`]**: Locked JSON stores, the registry and run log built on them,
//!   health probes, configuration and the application context.

pub mod core;
pub mod error;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
