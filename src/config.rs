//! Configuration module for tfdiagram.
//!
//! This module handles loading configuration from:
//! - YAML configuration files (`tfdiagram.yaml`)
//! - Environment variables (`${VAR}` / `$VAR` expansion)
//! - CLI arguments
//!
//! The resource mapping policy is a separate document, see
//! [`MappingConfig`](crate::mapping::MappingConfig).
//!
//! # Configuration File Format
//!
//! ```yaml
//! # tfdiagram.yaml
//!
//! scan:
//!   exclude_patterns:
//!     - "**/.terraform/**"
//!   entry_files:
//!     - main.tf
//!   max_concurrent_reads: 16
//!   continue_on_error: true
//!
//! layout:
//!   start_x: 50
//!   start_y: 50
//!   horizontal_spacing: 250
//!   vertical_spacing: 200
//!
//! output:
//!   colored: true
//!   pretty: true
//! ```

use crate::diagram::LayoutOptions;
use crate::error::{Result, ResultExt};
use crate::parser::TERRAFORM_EXTENSIONS;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

static BRACED_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("Invalid regex"));

static BARE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex"));

/// Scanning options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Patterns to exclude from module resolution (glob patterns).
    pub exclude_patterns: Vec<String>,

    /// Entry file names expanded first when a module directory is resolved.
    pub entry_files: Vec<String>,

    /// Declaration file extensions.
    pub extensions: Vec<String>,

    /// Upper bound on files read at the same time.
    pub max_concurrent_reads: usize,

    /// Skip unreadable files with a warning instead of failing.
    pub continue_on_error: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            exclude_patterns: vec![
                "**/.terraform/**".to_string(),
                "**/.terragrunt-cache/**".to_string(),
            ],
            entry_files: vec!["main.tf".to_string(), "main.tf.json".to_string()],
            extensions: TERRAFORM_EXTENSIONS.iter().map(ToString::to_string).collect(),
            max_concurrent_reads: default_max_concurrent_reads(),
            continue_on_error: true,
        }
    }
}

impl ScanOptions {
    /// Compile the exclude globs, dropping invalid ones with a warning.
    #[must_use]
    pub fn compiled_excludes(&self) -> Vec<glob::Pattern> {
        self.exclude_patterns
            .iter()
            .filter_map(|pattern| match glob::Pattern::new(pattern) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "Ignoring invalid exclude pattern");
                    None
                }
            })
            .collect()
    }

    /// Check whether a path carries one of the configured extensions.
    #[must_use]
    pub fn has_declaration_extension(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.extensions.iter().any(|ext| path_str.ends_with(ext.as_str()))
    }
}

/// Output options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Use colored output.
    pub colored: bool,

    /// Pretty-print JSON output.
    pub pretty: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            colored: true,
            pretty: true,
        }
    }
}

/// Main configuration structure with nested sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scanning options
    pub scan: ScanOptions,

    /// Layout geometry
    pub layout: LayoutOptions,

    /// Output options
    pub output: OutputOptions,
}

fn default_max_concurrent_reads() -> usize {
    16
}

impl Config {
    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn from_yaml(content: &str) -> Result<Self> {
        tracing::debug!("Parsing configuration from YAML");
        let expanded = expand_env_vars(content);

        let config: Config = serde_yaml::from_str(&expanded).map_err(|e| {
            crate::err!(ConfigParse {
                message: e.to_string(),
                source: Some(Box::new(e)),
            })
        })?;
        config.validate()?;

        tracing::debug!(
            exclude_patterns = config.scan.exclude_patterns.len(),
            max_concurrent_reads = config.scan.max_concurrent_reads,
            continue_on_error = config.scan.continue_on_error,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading configuration");
        let content = std::fs::read_to_string(path).with_path(path)?;
        Self::from_yaml(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.scan.max_concurrent_reads == 0 {
            return Err(crate::err!(ConfigValue {
                key: "scan.max_concurrent_reads".to_string(),
                message: "must be at least 1".to_string(),
            }));
        }
        if self.scan.extensions.is_empty() {
            return Err(crate::err!(ConfigValue {
                key: "scan.extensions".to_string(),
                message: "at least one extension is required".to_string(),
            }));
        }
        Ok(())
    }

    /// Generate an example YAML configuration.
    #[must_use]
    pub fn example_yaml() -> String {
        r#"# tfdiagram configuration file

# Module resolution options
scan:
  # Files matching these globs are never read
  exclude_patterns:
    - "**/.terraform/**"
    - "**/.terragrunt-cache/**"

  # Expanded first when a module directory is resolved
  entry_files:
    - main.tf
    - main.tf.json

  # Declaration file extensions
  extensions:
    - .tf
    - .tf.json

  # Files read at the same time
  max_concurrent_reads: 16

  # Skip unreadable files instead of failing
  continue_on_error: true

# Layered layout geometry
layout:
  start_x: 50
  start_y: 50
  horizontal_spacing: 250
  vertical_spacing: 200

# Output options
output:
  # Use colored output in terminal
  colored: true

  # Pretty-print JSON output
  pretty: true
"#
        .to_string()
    }

    /// Merge CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &crate::cli::ConvertArgs) {
        if !args.exclude_patterns.is_empty() {
            self.scan
                .exclude_patterns
                .extend(args.exclude_patterns.iter().cloned());
        }
        if args.strict {
            self.scan.continue_on_error = false;
        }
        if args.compact {
            self.output.pretty = false;
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. Unset variables are left as written.
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    for cap in BRACED_VAR.captures_iter(content) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }

    for cap in BARE_VAR.captures_iter(content) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
