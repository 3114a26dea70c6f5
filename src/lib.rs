//! # tfdiagram
//!
//! A Terraform/OpenTofu to architecture diagram converter.
//!
//! tfdiagram starts from a root declaration file, follows local module
//! references, extracts resource declarations, maps them to typed diagram
//! components through a policy, infers containment and connections, and
//! lays the result out in layers.
//!
//! ## Features
//!
//! - **Module resolution**: local module sources are followed transitively,
//!   remote sources end their branch, cycles terminate
//! - **Two-tier parsing**: structured HCL / JSON parsing with a regex
//!   fallback for files the structured parser rejects
//! - **Mapping policy**: a YAML/JSON document maps resource types to
//!   component kinds and renames attributes into properties
//! - **Containment-aware model**: every component sits under exactly one
//!   area (region, vpc, subnet, security group)
//! - **Multiple output formats**: JSON / YAML documents, Graphviz DOT and
//!   Mermaid
//!
//! ## Example
//!
//! ```rust,no_run
//! use tfdiagram::{Config, Converter, MappingConfig};
//! use tfdiagram::diagram::{export_diagram, ComponentRegistry};
//! use tfdiagram::types::DiagramFormat;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let converter = Converter::new(
//!         Config::default(),
//!         MappingConfig::default_policy().compile(),
//!         ComponentRegistry::shared(),
//!     );
//!
//!     let result = converter.convert_file("./infra/main.tf".as_ref()).await?;
//!     println!("{}", export_diagram(&result.diagram, DiagramFormat::Mermaid, true)?);
//!
//!     Ok(())
//! }
//! ```

#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod cli;
pub mod config;
pub mod converter;
pub mod diagram;
pub mod error;
pub mod mapping;
pub mod parser;
pub mod report;
pub mod resolver;
pub mod types;

// Re-export commonly used types at crate root
pub use config::Config;
pub use converter::{ConversionResult, Converter};
pub use error::{Result, TfDiagramError};
pub use mapping::{MappingConfig, MappingPolicy};
pub use resolver::{ModuleResolver, ResolvedFiles};
pub use types::{DiagramFormat, ModuleRef, ModuleSource, SourceResource};
