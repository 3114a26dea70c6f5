//! Error types for tfdiagram.
//!
//! This module defines the error hierarchy using `thiserror`. Every
//! variant carries the source location where it was raised so that log
//! output points straight at the failing call site.
//!
//! # Error Categories
//!
//! - **IO errors**: missing root files, unreadable declaration files
//! - **Parse errors**: HCL / JSON parsing failures (recoverable, they
//!   trigger the regex fallback)
//! - **Config errors**: invalid configuration or policy documents
//! - **Document errors**: diagram documents that cannot be reconstructed
//! - **Export errors**: serialization failures
//!
//! # Example
//!
//! ```rust
//! use tfdiagram::error::{TfDiagramError, Result};
//!
//! fn read_root(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .map_err(|e| TfDiagramError::io(path, e, file!(), line!()))
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Macro to create errors with automatic source location tracking.
///
/// Usage:
/// ```ignore
/// return Err(err!(FileNotFound { path: root.to_path_buf() }));
/// ```
#[macro_export]
macro_rules! err {
    ($variant:ident { $($field:ident: $value:expr),* $(,)? }) => {
        $crate::error::TfDiagramError::$variant {
            $($field: $value,)*
            src_path: file!(),
            src_line: line!(),
        }
    };
}

/// A specialized Result type for tfdiagram operations.
pub type Result<T> = std::result::Result<T, TfDiagramError>;

/// The main error type for tfdiagram.
#[derive(Error, Debug)]
pub enum TfDiagramError {
    // =========================================================================
    // I/O and File System Errors
    // =========================================================================
    /// I/O error with path context.
    #[error("I/O error at '{path}' ({src_path}:{src_line}): {source}")]
    Io {
        /// The path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// File not found.
    #[error("File not found: {path} ({src_path}:{src_line})")]
    FileNotFound {
        /// The missing file path
        path: PathBuf,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Parsing Errors
    // =========================================================================
    /// HCL parsing error.
    #[error("Failed to parse HCL in '{file}' \n\t({src_path}:{src_line}): {message}")]
    HclParse {
        /// The file being parsed
        file: PathBuf,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// JSON declaration (`.tf.json`) parsing error.
    #[error("Failed to parse JSON declarations in '{file}' ({src_path}:{src_line}): {message}")]
    JsonParse {
        /// The file being parsed
        file: PathBuf,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration or policy document parsing error.
    #[error("Failed to parse configuration ({src_path}:{src_line}): {message}")]
    ConfigParse {
        /// Error message
        message: String,
        /// The underlying error (if any)
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}' ({src_path}:{src_line}): {message}")]
    ConfigValue {
        /// The configuration key
        key: String,
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    // =========================================================================
    // Diagram Errors
    // =========================================================================
    /// A serialized diagram document could not be turned back into a diagram.
    #[error("Invalid diagram document ({src_path}:{src_line}): {message}")]
    DocumentInvalid {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Diagram export error.
    #[error("Failed to export diagram ({src_path}:{src_line}): {message}")]
    Export {
        /// Error message
        message: String,
        /// Source file path
        src_path: &'static str,
        /// Source line number
        src_line: u32,
    },

    /// Multiple errors occurred.
    #[error("Multiple errors occurred ({count} total)")]
    Multiple {
        /// Number of errors
        count: usize,
        /// The individual errors
        errors: Vec<TfDiagramError>,
    },
}

impl TfDiagramError {
    /// Creates an `Io` error.
    #[must_use]
    pub fn io(
        path: impl Into<PathBuf>,
        source: std::io::Error,
        src_path: &'static str,
        src_line: u32,
    ) -> Self {
        Self::Io {
            path: path.into(),
            source,
            src_path,
            src_line,
        }
    }

    /// Determines if the error is recoverable, i.e. the conversion can skip
    /// the offending file and carry on with the rest.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io { .. } | Self::HclParse { .. } | Self::JsonParse { .. } => true,
            Self::FileNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigValue { .. }
            | Self::DocumentInvalid { .. }
            | Self::Export { .. }
            | Self::Multiple { .. } => false,
        }
    }

    /// Returns the appropriate exit code for the error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => 13,
            Self::FileNotFound { .. } => 14,
            Self::ConfigParse { .. } => 18,
            Self::ConfigValue { .. } => 19,
            Self::Multiple { .. } => 21,
            Self::DocumentInvalid { .. } => 23,
            _ => 1,
        }
    }

    /// Consolidates multiple errors into a single `TfDiagramError::Multiple` if there's more than one.
    /// Otherwise, returns the single error or `Ok(())` if no errors.
    pub fn collect(errors: Vec<Self>) -> Result<()> {
        let mut errors = errors;
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            count => Err(Self::Multiple { count, errors }),
        }
    }
}

/// Extension trait for `Result` to add context to errors.
pub trait ResultExt<T> {
    /// Adds a file path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| TfDiagramError::io(path, e, file!(), line!()))
    }
}

impl From<std::io::Error> for TfDiagramError {
    fn from(source: std::io::Error) -> Self {
        // Prefer TfDiagramError::io(path, ..) wherever the path is known
        Self::Io {
            path: PathBuf::new(),
            source,
            src_path: file!(),
            src_line: line!(),
        }
    }
}

impl From<serde_yaml::Error> for TfDiagramError {
    fn from(source: serde_yaml::Error) -> Self {
        Self::Export {
            message: format!("YAML serialization/deserialization error: {source}"),
            src_path: file!(),
            src_line: line!(),
        }
    }
}

/// A utility for collecting multiple errors during parsing or processing.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<TfDiagramError>,
}

impl ErrorCollector {
    /// Create a new error collector.
    #[must_use]
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Add an error to the collection.
    pub fn add(&mut self, error: TfDiagramError) {
        self.errors.push(error);
    }

    /// Convert to a Result, returning Multiple error if there are any errors.
    pub fn into_result(self) -> Result<()> {
        TfDiagramError::collect(self.errors)
    }
}
