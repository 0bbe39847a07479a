//! Command-line interface for frontdesk.
//!
//! This module provides the CLI structure for the `frontdesk` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AddCommand, ConfigCommand, EntryArgs, ListCommand, RunCommand, StatusCommand,
};

/// frontdesk - Patient and memo queue for a clinic front desk
///
/// Keeps a shared list of waiting and in-progress memos, synced through a
/// hosted database when one is configured and kept on this machine otherwise.
#[derive(Debug, Parser)]
#[command(name = "frontdesk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the interactive desk
    Run(RunCommand),

    /// Add a memo to the waiting list
    Add(AddCommand),

    /// Move a memo to 확인 중
    Start(EntryArgs),

    /// Move a memo back to waiting
    Wait(EntryArgs),

    /// Finish a memo (removes it)
    Done(EntryArgs),

    /// Delete a memo without finishing it
    #[command(alias = "del")]
    Delete(EntryArgs),

    /// Print the current queue
    List(ListCommand),

    /// Show connection and queue status
    Status(StatusCommand),

    /// View or modify configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
