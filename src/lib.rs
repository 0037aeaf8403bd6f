// ABOUTME: Library root for deployctl - exposes the orchestrator for the binary and tests.
// ABOUTME: The main binary is in main.rs.

pub mod backup;
pub mod config;
pub mod context;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod exec;
pub mod files;
pub mod modules;
pub mod output;
pub mod runtime;
pub mod secrets;
pub mod state;
pub mod types;
pub mod validate;
