//! Bulwark daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `bulwark-daemon` is used as a binary (main.rs).

pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
pub mod replay;
