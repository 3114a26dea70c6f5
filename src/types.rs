//! Core data types used throughout tfdiagram.
//!
//! This module defines the fundamental data structures for representing:
//! - Terraform/OpenTofu resource declarations and their flattened attributes
//! - Module references and their classified sources
//! - Diagram output formats

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::path::PathBuf;

/// Identifier of a resource declaration, always `"{kind}.{name}"`.
pub type ResourceId = String;

/// Flattened attribute map of a resource.
///
/// Nested maps are flattened into dot-joined keys, so
///
/// ```hcl
/// tags = {
///   Name = "web"
/// }
/// ```
///
/// becomes the single entry `tags.Name = "web"`. Lists are kept as
/// [`AttributeValue::List`] and are never flattened further.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Build the canonical resource id for a kind and name.
#[must_use]
pub fn resource_id(kind: &str, name: &str) -> ResourceId {
    format!("{kind}.{name}")
}

/// A single flattened attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean literal
    Bool(bool),
    /// String value; numbers and non-literal expressions are rendered as strings
    String(String),
    /// List value, kept unflattened
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Returns the string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Collect every string contained in this value, descending into lists.
    pub fn collect_strings<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::String(s) => out.push(s),
            Self::Bool(_) => {}
            Self::List(items) => {
                for item in items {
                    item.collect_strings(out);
                }
            }
        }
    }

    /// Convert into a JSON value for component properties.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A resource declaration extracted from a declaration file.
///
/// # Example HCL
///
/// ```hcl
/// resource "aws_subnet" "public" {
///   vpc_id     = aws_vpc.main.id
///   cidr_block = "10.0.1.0/24"
/// }
/// ```
///
/// yields `kind = "aws_subnet"`, `name = "public"`, the attributes
/// `vpc_id` and `cidr_block`, and the dependency `aws_vpc.main`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceResource {
    /// Canonical id (`kind.name`)
    pub id: ResourceId,

    /// Resource type (e.g., "aws_vpc")
    pub kind: String,

    /// Resource name label (e.g., "main")
    pub name: String,

    /// Flattened attributes
    pub attributes: Attributes,

    /// Ids of other resources this one references
    pub dependencies: BTreeSet<ResourceId>,

    /// File where the resource is declared
    pub source_file: PathBuf,
}

impl SourceResource {
    /// Create a resource without attributes or dependencies.
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>, source_file: impl Into<PathBuf>) -> Self {
        let kind = kind.into();
        let name = name.into();
        Self {
            id: resource_id(&kind, &name),
            kind,
            name,
            attributes: Attributes::new(),
            dependencies: BTreeSet::new(),
            source_file: source_file.into(),
        }
    }

    /// Builder-style helper to attach an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builder-style helper to attach a dependency.
    #[must_use]
    pub fn with_dependency(mut self, id: impl Into<ResourceId>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    /// Look up a flattened attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

/// Represents a Terraform/OpenTofu module reference.
///
/// # Example HCL
///
/// ```hcl
/// module "network" {
///   source = "../modules/network"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRef {
    /// The name/label of the module block (e.g., "network")
    pub name: String,

    /// The classified source of the module
    pub source: ModuleSource,

    /// The source string exactly as written
    pub raw_source: String,

    /// File where this module is referenced
    pub file_path: PathBuf,
}

/// Represents the source of a Terraform module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ModuleSource {
    /// Terraform Registry module (e.g., "hashicorp/consul/aws")
    Registry {
        /// Registry hostname (default: registry.terraform.io)
        hostname: String,
        /// Namespace (e.g., "hashicorp")
        namespace: String,
        /// Module name (e.g., "consul")
        name: String,
        /// Provider (e.g., "aws")
        provider: String,
    },

    /// Git repository source
    Git {
        /// Repository URL
        url: String,
        /// Git ref (branch, tag, or commit)
        ref_: Option<String>,
    },

    /// Local file path, or a scheme-less string that may name one
    Local {
        /// Path to the module (relative or absolute)
        path: String,
    },

    /// HTTP/HTTPS URL
    Http {
        /// URL to the module archive
        url: String,
    },

    /// Object storage source (`s3::`, `s3://`, `gcs::`)
    Bucket {
        /// Storage scheme ("s3" or "gcs")
        scheme: String,
        /// Full location as written
        location: String,
    },

    /// Any other string carrying a URL scheme
    Unknown(String),
}

impl ModuleSource {
    /// Returns a canonical identifier for this source.
    #[must_use]
    pub fn canonical_id(&self) -> String {
        match self {
            Self::Registry {
                hostname,
                namespace,
                name,
                provider,
            } => format!("{hostname}/{namespace}/{name}/{provider}"),
            Self::Git { url, ref_ } => match ref_ {
                Some(r) => format!("git::{url}?ref={r}"),
                None => format!("git::{url}"),
            },
            Self::Local { path } => format!("local://{path}"),
            Self::Http { url } => url.clone(),
            Self::Bucket { location, .. } => location.clone(),
            Self::Unknown(s) => s.clone(),
        }
    }

    /// Returns true if this is a local module source.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }

    /// Returns true if the source can never be resolved on the local filesystem.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        !self.is_local()
    }
}

impl Display for ModuleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Registry { .. } => "registry",
            Self::Git { .. } => "git",
            Self::Local { .. } => "local",
            Self::Http { .. } => "http",
            Self::Bucket { .. } => "bucket",
            Self::Unknown(_) => "unknown",
        };
        write!(f, "{label}:{}", self.canonical_id())
    }
}

/// Diagram output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum DiagramFormat {
    /// JSON diagram document
    #[default]
    Json,
    /// YAML diagram document
    Yaml,
    /// DOT format (Graphviz)
    Dot,
    /// Mermaid flowchart
    Mermaid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_format() {
        let resource = SourceResource::new("aws_vpc", "main", "main.tf");
        assert_eq!(resource.id, "aws_vpc.main");
        assert_eq!(resource_id("aws_subnet", "a"), "aws_subnet.a");
    }

    #[test]
    fn test_collect_strings_descends_into_lists() {
        let value = AttributeValue::List(vec![
            AttributeValue::from("a"),
            AttributeValue::Bool(true),
            AttributeValue::List(vec![AttributeValue::from("b")]),
        ]);
        let mut out = Vec::new();
        value.collect_strings(&mut out);
        assert_eq!(out, vec!["a", "b"]);
    }

    #[test]
    fn test_attribute_value_untagged_serialization() {
        let json = serde_json::to_string(&AttributeValue::List(vec![
            AttributeValue::from("x"),
            AttributeValue::Bool(false),
        ]))
        .unwrap();
        assert_eq!(json, r#"["x",false]"#);
    }

    #[test]
    fn test_module_source_remote_classification() {
        let local = ModuleSource::Local {
            path: "./modules/vpc".to_string(),
        };
        let git = ModuleSource::Git {
            url: "https://example.com/repo.git".to_string(),
            ref_: Some("v1".to_string()),
        };
        assert!(local.is_local());
        assert!(!local.is_remote());
        assert!(git.is_remote());
        assert_eq!(git.canonical_id(), "git::https://example.com/repo.git?ref=v1");
    }
}
