//! Runtime glue that wires configuration, the script engine boundary, fatal error
//! capture, telemetry, and runner orchestration.

pub mod config;
pub mod engine;
pub mod fatal;
pub(crate) mod hooks;
pub mod runner;
pub mod telemetry;
