//! Diagram components.
//!
//! A component is a single tagged record: its [`ComponentKind`] decides
//! which capabilities it has (see [`super::registry`]), and area kinds
//! carry an [`AreaState`] holding their ordered children.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a component inside a diagram.
pub type ComponentId = Uuid;

/// Free-form component properties.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// The closed set of component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    /// Diagram root
    Region,
    /// Network boundary
    Vpc,
    /// Network subdivision
    Subnet,
    /// Security perimeter
    SecurityGroup,
    /// Compute instance
    Ec2Instance,
    /// Relational database instance
    RdsInstance,
    /// Object storage bucket
    S3Bucket,
    /// Key-value table
    #[serde(rename = "dynamodb-table")]
    DynamoDbTable,
    /// Serverless function
    LambdaFunction,
    /// Load balancer
    LoadBalancer,
    /// API gateway
    ApiGateway,
    /// Internet gateway
    InternetGateway,
    /// NAT gateway
    NatGateway,
}

impl ComponentKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::Region,
        Self::Vpc,
        Self::Subnet,
        Self::SecurityGroup,
        Self::Ec2Instance,
        Self::RdsInstance,
        Self::S3Bucket,
        Self::DynamoDbTable,
        Self::LambdaFunction,
        Self::LoadBalancer,
        Self::ApiGateway,
        Self::InternetGateway,
        Self::NatGateway,
    ];

    /// The serialized tag of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Vpc => "vpc",
            Self::Subnet => "subnet",
            Self::SecurityGroup => "security-group",
            Self::Ec2Instance => "ec2-instance",
            Self::RdsInstance => "rds-instance",
            Self::S3Bucket => "s3-bucket",
            Self::DynamoDbTable => "dynamodb-table",
            Self::LambdaFunction => "lambda-function",
            Self::LoadBalancer => "load-balancer",
            Self::ApiGateway => "api-gateway",
            Self::InternetGateway => "internet-gateway",
            Self::NatGateway => "nat-gateway",
        }
    }
}

impl Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown component kind '{s}'"))
    }
}

/// Position of a component's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal offset
    pub x: f64,
    /// Vertical offset
    pub y: f64,
}

/// Size of a component.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

/// Link from a component back to the resource that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStamp {
    /// Resource id (`kind.name`)
    pub resource_id: String,
    /// Resource type
    pub resource_kind: String,
    /// Declaring file
    pub file: PathBuf,
}

/// Containment state of an area component.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AreaState {
    /// Direct children, in attachment order
    pub children: Vec<ComponentId>,
    /// Kinds this area may directly contain
    pub allowed_child_kinds: BTreeSet<ComponentKind>,
}

impl AreaState {
    /// Create an empty area allowing the given kinds.
    #[must_use]
    pub fn new(allowed_child_kinds: BTreeSet<ComponentKind>) -> Self {
        Self {
            children: Vec::new(),
            allowed_child_kinds,
        }
    }

    /// Check whether `kind` may be a direct child.
    #[must_use]
    pub fn allows(&self, kind: ComponentKind) -> bool {
        self.allowed_child_kinds.contains(&kind)
    }

    pub(crate) fn attach(&mut self, child: ComponentId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn detach(&mut self, child: ComponentId) -> bool {
        let before = self.children.len();
        self.children.retain(|id| *id != child);
        self.children.len() != before
    }
}

/// A diagram component.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Unique id
    pub id: ComponentId,
    /// Display name
    pub name: String,
    /// Kind tag
    pub kind: ComponentKind,
    /// Top-left position
    pub position: Position,
    /// Size
    pub size: Size,
    /// Kind-specific properties
    pub properties: Properties,
    /// Originating resource, if any
    pub source: Option<SourceStamp>,
    /// Present for area kinds only
    pub area: Option<AreaState>,
}

impl Component {
    /// Returns true if this component can contain others.
    #[must_use]
    pub const fn is_area(&self) -> bool {
        self.area.is_some()
    }

    /// Direct children; empty for non-area components.
    #[must_use]
    pub fn children(&self) -> &[ComponentId] {
        self.area
            .as_ref()
            .map(|area| area.children.as_slice())
            .unwrap_or(&[])
    }

    /// Check whether this component may directly contain `kind`.
    #[must_use]
    pub fn allows(&self, kind: ComponentKind) -> bool {
        self.area.as_ref().is_some_and(|area| area.allows(kind))
    }

    /// Look up a string property.
    #[must_use]
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(serde_json::Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ComponentKind::Ec2Instance, "ec2-instance")]
    #[test_case(ComponentKind::DynamoDbTable, "dynamodb-table")]
    #[test_case(ComponentKind::SecurityGroup, "security-group")]
    #[test_case(ComponentKind::S3Bucket, "s3-bucket")]
    fn test_kind_serialization_matches_tag(kind: ComponentKind, tag: &str) {
        assert_eq!(kind.as_str(), tag);
        assert_eq!(serde_json::to_value(kind).unwrap(), serde_json::json!(tag));
        assert_eq!(tag.parse::<ComponentKind>().unwrap(), kind);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!("mainframe".parse::<ComponentKind>().is_err());
    }

    #[test]
    fn test_area_attach_is_idempotent() {
        let mut area = AreaState::new(BTreeSet::from([ComponentKind::Subnet]));
        let child = Uuid::new_v4();
        area.attach(child);
        area.attach(child);
        assert_eq!(area.children, vec![child]);
        assert!(area.detach(child));
        assert!(!area.detach(child));
    }
}
