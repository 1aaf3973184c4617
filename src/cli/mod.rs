//! CLI module for healthcheck - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for listing the catalog,
//! running a diagnostic plan, and executing a single ad-hoc command.

pub mod commands;

pub use commands::Cli;
