//! Command-line interface module.
//!
//! This module defines the CLI structure using Clap, including
//! all commands, arguments, and options.
//!
//! # Commands
//!
//! - `convert`: Turn a Terraform root file into a diagram
//! - `deps`: Show the module tree reachable from a root file
//! - `resources`: List the resources that would become components
//! - `init`: Write an example mapping policy (or configuration)
//! - `validate`: Check a mapping policy document
//!
//! # Example Usage
//!
//! ```bash
//! # Convert with the default policy, JSON to stdout
//! tfdiagram convert ./infra/main.tf
//!
//! # Custom policy, Mermaid output to a file
//! tfdiagram convert ./infra/main.tf -m policy.yaml -f mermaid -o infra.mmd
//!
//! # Inspect module resolution
//! tfdiagram deps ./infra/main.tf
//!
//! # Start a policy from the defaults
//! tfdiagram init --output policy.yaml
//! ```

use crate::types::DiagramFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Default file name for `init`.
pub const DEFAULT_POLICY_FILE: &str = "tfdiagram-policy.yaml";

/// Default file name for `init --settings`.
pub const DEFAULT_CONFIG_FILE: &str = "tfdiagram.yaml";

/// tfdiagram - Terraform/OpenTofu to architecture diagram converter.
#[derive(Parser, Debug)]
#[command(
    name = "tfdiagram",
    author,
    version,
    about = "Terraform/OpenTofu to architecture diagram converter",
    long_about = "tfdiagram follows local module references from a root file, extracts \
                  resource declarations, maps them to diagram components through a policy, \
                  infers containment and connections, and lays the result out."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "TFDIAGRAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a root file and its local modules into a diagram
    #[command(visible_alias = "c")]
    Convert(ConvertArgs),

    /// Show the module tree reachable from a root file
    Deps(DepsArgs),

    /// List the resources the policy keeps
    Resources(ResourcesArgs),

    /// Write an example mapping policy or configuration file
    Init(InitArgs),

    /// Validate a mapping policy document
    Validate(ValidateArgs),
}

/// Arguments for the convert command.
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Root declaration file (or directory)
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Mapping policy document (built-in policy if not specified)
    #[arg(short = 'm', long = "mapping", value_name = "POLICY")]
    pub mapping: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "json", value_enum)]
    pub format: DiagramFormat,

    /// Output file path (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Diagram name (defaults to the root directory name)
    #[arg(long)]
    pub name: Option<String>,

    /// Patterns to exclude from resolution (glob patterns)
    #[arg(short, long = "exclude", value_name = "PATTERN")]
    pub exclude_patterns: Vec<String>,

    /// Fail when a file cannot be read instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Compact JSON output
    #[arg(long)]
    pub compact: bool,

    /// Print a conversion summary to stderr
    #[arg(long)]
    pub summary: bool,
}

/// Arguments for the deps command.
#[derive(Args, Debug)]
pub struct DepsArgs {
    /// Root declaration file (or directory)
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Print the module graph as JSON instead of a tree
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the resources command.
#[derive(Args, Debug)]
pub struct ResourcesArgs {
    /// Root declaration file (or directory)
    #[arg(value_name = "ROOT")]
    pub root: PathBuf,

    /// Mapping policy document (built-in policy if not specified)
    #[arg(short = 'm', long = "mapping", value_name = "POLICY")]
    pub mapping: Option<PathBuf>,
}

/// Arguments for the init command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// File to write
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write the tool configuration instead of a mapping policy
    #[arg(long)]
    pub settings: bool,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// The file `init` writes to.
    #[must_use]
    pub fn target(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            PathBuf::from(if self.settings {
                DEFAULT_CONFIG_FILE
            } else {
                DEFAULT_POLICY_FILE
            })
        })
    }
}

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the policy document to validate
    #[arg(value_name = "POLICY", default_value = DEFAULT_POLICY_FILE)]
    pub policy: PathBuf,
}
