//! Declaration parsing for Terraform/OpenTofu files.
//!
//! This module turns raw file text into typed [`SourceResource`] records
//! and module references. Parsing is two-tiered:
//!
//! 1. A structured parse (`hcl-rs` for `.tf`, `serde_json` for `.tf.json`)
//! 2. A best-effort regex fallback, used when the structured parse fails
//!    or finds nothing
//!
//! # Supported Constructs
//!
//! - `resource "kind" "name" { ... }` blocks
//! - kind-keyed blocks `kind "name" { ... }`
//! - `module` blocks with a `source` attribute
//!
//! # Example
//!
//! ```rust
//! use tfdiagram::parser::{KindSelection, ResourceExtractor};
//! use std::path::Path;
//!
//! let extractor = ResourceExtractor::new(KindSelection::All);
//! let resources = extractor.extract(
//!     r#"resource "aws_vpc" "main" { cidr_block = "10.0.0.0/16" }"#,
//!     Path::new("main.tf"),
//! );
//! assert_eq!(resources[0].id, "aws_vpc.main");
//! ```

mod extractor;
mod fallback;
mod hcl;
mod json;
mod source;

pub use extractor::ResourceExtractor;
pub use hcl::HclParser;
pub use json::JsonParser;
pub use source::{is_local_looking, parse_module_source};

use crate::error::Result;
use crate::types::{ModuleRef, ResourceId};
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::LazyLock;

/// File extensions to scan for Terraform/OpenTofu files.
pub const TERRAFORM_EXTENSIONS: &[&str] = &[".tf", ".tf.json"];

/// Files and directories to skip during scanning.
pub const SKIP_FILES: &[&str] = &[".terraform", ".terragrunt-cache", "terraform.tfstate"];

/// Top-level block types that are never resource kinds.
const RESERVED_BLOCKS: &[&str] = &[
    "resource",
    "data",
    "module",
    "variable",
    "output",
    "locals",
    "provider",
    "terraform",
    "moved",
    "import",
    "check",
    "removed",
];

// A reference names a declaration as `kind.name`. Kinds look like
// `provider_type`; anything preceded by `.` (var.x, data.a.b, module.m.o)
// is an attribute path, not a declaration.
static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9_.\-])([a-z][a-z0-9]*_[a-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_-]*)")
        .expect("Invalid regex")
});

/// Check if a file is a Terraform declaration file.
#[must_use]
pub fn is_declaration_file(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    TERRAFORM_EXTENSIONS
        .iter()
        .any(|ext| path_str.ends_with(ext))
}

/// Check if a file uses the JSON declaration syntax.
#[must_use]
pub fn is_json_file(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".tf.json")
}

/// Collect the distinct `kind.name` references appearing in `text`.
pub fn collect_references(text: &str, out: &mut BTreeSet<ResourceId>) {
    for caps in REFERENCE_PATTERN.captures_iter(text) {
        out.insert(format!("{}.{}", &caps[1], &caps[2]));
    }
}

/// Which resource kinds an extraction is interested in.
#[derive(Debug, Clone, Default)]
pub enum KindSelection {
    /// Every resource kind
    #[default]
    All,
    /// Only the listed kinds
    Only(HashSet<String>),
}

impl KindSelection {
    /// Build a selection from an iterator of kinds.
    pub fn only<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(kinds.into_iter().map(Into::into).collect())
    }

    /// Check whether a `resource "kind" ...` declaration is wanted.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(kinds) => kinds.contains(kind),
        }
    }

    /// Check whether a kind-keyed block `kind "name" { }` should be read as a
    /// resource declaration.
    #[must_use]
    pub fn accepts_kind_keyed(&self, kind: &str) -> bool {
        if RESERVED_BLOCKS.contains(&kind) {
            return false;
        }
        match self {
            Self::All => kind.contains('_'),
            Self::Only(kinds) => kinds.contains(kind),
        }
    }
}

/// A declaration found by a structured parse, before flattening.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDeclaration {
    /// Resource type
    pub kind: String,
    /// Resource name
    pub name: String,
    /// Nested attribute tree
    pub body: serde_json::Map<String, serde_json::Value>,
}

/// Trait for structured declaration parsers.
///
/// Implemented once per syntax (native HCL and JSON) so the extractor can
/// pick a parser by file extension.
pub trait DeclarationParser: Send + Sync {
    /// Parse the resource declarations of a single file.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid in this syntax.
    fn parse_declarations(
        &self,
        content: &str,
        file_path: &Path,
        selection: &KindSelection,
    ) -> Result<Vec<RawDeclaration>>;

    /// Parse the module references of a single file.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid in this syntax.
    fn parse_module_refs(&self, content: &str, file_path: &Path) -> Result<Vec<ModuleRef>>;
}

/// Pick the structured parser for a file.
#[must_use]
pub fn parser_for(path: &Path) -> &'static dyn DeclarationParser {
    static HCL: HclParser = HclParser;
    static JSON: JsonParser = JsonParser;
    if is_json_file(path) {
        &JSON
    } else {
        &HCL
    }
}

/// Extract module references from a file, structured first, regex second.
///
/// Never fails: content that neither path understands yields no references.
#[must_use]
pub fn extract_module_refs(content: &str, file_path: &Path) -> Vec<ModuleRef> {
    match parser_for(file_path).parse_module_refs(content, file_path) {
        Ok(refs) => refs,
        Err(e) => {
            tracing::debug!(
                file = %file_path.display(),
                error = %e,
                "Structured parse failed, scanning module blocks with regex"
            );
            fallback::module_refs(content, file_path)
        }
    }
}
