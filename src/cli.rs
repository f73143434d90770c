//! Command-line interface for Mooring
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::manifest::Sources;

/// Mooring - keeps containers running and attached to their networks
#[derive(Parser, Debug)]
#[command(name = "mooring")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Watch manifest path (written when derived from the compose file)
    #[arg(short, long, global = true, default_value = "config.yml")]
    pub config: PathBuf,

    /// Compose file used to derive the manifest
    #[arg(long, global = true, default_value = "docker-compose.yml")]
    pub compose: PathBuf,

    /// Variables file for compose interpolation
    #[arg(long, global = true, default_value = ".env")]
    pub env_file: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Watch containers and repair them (default)
    Watch,

    /// Load the manifest once and show what would be watched
    Check {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Derive the manifest from the compose file
    Derive {
        /// Print the manifest instead of writing it
        #[arg(long)]
        stdout: bool,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "mooring", &mut std::io::stdout());
    }

    /// The subcommand to run, `watch` when none was given
    pub fn subcommand(&self) -> &Commands {
        self.command.as_ref().unwrap_or(&Commands::Watch)
    }

    /// Manifest locations from the global flags
    pub fn sources(&self) -> Sources {
        Sources {
            manifest: self.config.clone(),
            compose: self.compose.clone(),
            env_file: self.env_file.clone(),
        }
    }
}
