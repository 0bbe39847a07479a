//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::views::ViewMode;

/// Add command arguments.
#[derive(Debug, Args)]
pub struct AddCommand {
    /// Free text such as "김진표 충격파"; parsed into a name and a memo
    #[arg(conflicts_with_all = ["name", "memo"], required_unless_present = "name")]
    pub text: Vec<String>,

    /// Patient name (skips text parsing)
    #[arg(short, long, requires = "memo")]
    pub name: Option<String>,

    /// Memo content, used with --name
    #[arg(short, long)]
    pub memo: Option<String>,
}

impl AddCommand {
    /// The free text joined back into one line.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.text.join(" ")
    }
}

/// Arguments naming one entry.
#[derive(Debug, Args)]
pub struct EntryArgs {
    /// Entry id or a unique prefix of it
    pub id: String,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Layout to print
    #[arg(long, value_enum, default_value_t = ViewMode::Desk)]
    pub view: ViewMode,

    /// Output as JSON (ignores --view)
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Run command arguments.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Layout to start with
    #[arg(long, value_enum, default_value_t = ViewMode::Desk)]
    pub view: ViewMode,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Change one setting (e.g. remote.url, notifications.system_enabled)
    Set {
        /// Dotted key
        key: String,

        /// New value
        value: String,
    },

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Print the SQL that creates the remote table
    Schema,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_joined_text() {
        let cmd = AddCommand {
            text: vec!["김진표".to_string(), "충격파".to_string()],
            name: None,
            memo: None,
        };
        assert_eq!(cmd.joined_text(), "김진표 충격파");
    }

    #[test]
    fn test_status_command_debug() {
        let cmd = StatusCommand { json: true };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("json"));
    }

    #[test]
    fn test_list_command_debug() {
        let cmd = ListCommand {
            view: ViewMode::Board,
            json: false,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Board"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Set {
            key: "remote.url".to_string(),
            value: "https://x".to_string(),
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Set"));
        assert!(debug_str.contains("remote.url"));
    }
}
