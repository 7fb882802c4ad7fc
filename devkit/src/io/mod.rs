//! Side-effecting parts of the devkit: state files, probes and configuration.

pub mod config;
pub mod context;
pub mod health;
pub mod json_store;
pub mod object_store;
pub mod postgres;
pub mod registry;
pub mod run_log;
