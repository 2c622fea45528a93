//! LoginLab CLI
//!
//! Command-line client for the LoginLab control plane: browse scenarios,
//! submit runs and inspect, compare and clear results.

pub mod client;
pub mod commands;
pub mod output;
