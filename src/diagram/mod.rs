//! Diagram Module
//!
//! This module holds the diagram side of the pipeline: typed components,
//! the per-kind capability table, the diagram model that keeps the
//! component tree and the relationship list consistent, the layered
//! layout and the document/export projections.
//!
//! # Structure
//!
//! ```text
//! ┌──────────────────────────── Region ─────────────────────────────┐
//! │  ┌──────────────── Vpc ────────────────┐   ┌──────────┐         │
//! │  │  ┌──── Subnet ────┐  ┌─── Sg ───┐   │   │ S3Bucket │         │
//! │  │  │  Ec2Instance   │  │          │   │   └──────────┘         │
//! │  │  └────────────────┘  └──────────┘   │        ▲               │
//! │  └─────────────────────────────────────┘        │ connects-to   │
//! │            Ec2Instance ─────────────────────────┘               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Area kinds (region, vpc, subnet, security group) hold children; every
//! other kind is a leaf. A component sits under exactly one area.
//!
//! # Example
//!
//! ```rust
//! use tfdiagram::diagram::{ComponentKind, ComponentRegistry, Diagram, RelationshipKind};
//!
//! let registry = ComponentRegistry::shared();
//! let mut diagram = Diagram::new("example", registry.clone());
//!
//! let vpc = diagram.add_component(registry.create(ComponentKind::Vpc, "main"));
//! let subnet = diagram.add_component(registry.create(ComponentKind::Subnet, "public"));
//! assert_eq!(diagram.parent_of(subnet), Some(vpc));
//!
//! diagram.add_relationship(vpc, subnet, RelationshipKind::Contains, None);
//! assert_eq!(diagram.relationships().len(), 1);
//! ```

pub mod component;
pub mod document;
pub mod export;
pub mod layout;
pub mod model;
pub mod registry;

pub use component::{
    AreaState, Component, ComponentId, ComponentKind, Position, Properties, Size, SourceStamp,
};
pub use document::{ComponentDocument, DiagramDocument};
pub use export::export_diagram;
pub use layout::{LayoutOptions, LAYERS};
pub use model::{Diagram, Relationship, RelationshipId, RelationshipKind, SourceMarker};
pub use registry::{ComponentRegistry, KindSpec};
