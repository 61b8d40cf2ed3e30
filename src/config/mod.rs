//! Configuration module for the read-aloud service.
//!
//! Provides CLI argument parsing and configuration management.

#[allow(clippy::module_inception)]
mod config;

pub use config::{Cli, Command, ReadConfig, ServeConfig, SynthesisCommand};
