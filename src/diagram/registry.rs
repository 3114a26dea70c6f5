//! Per-kind capability table.
//!
//! Everything the rest of the crate needs to know about a component kind
//! lives in one [`KindSpec`] row: whether it is an area, which kinds it
//! may contain, its default size and its default properties. Adding a
//! kind means adding a row here.

use crate::diagram::component::{
    AreaState, Component, ComponentKind, Position, Properties, Size,
};
use crate::diagram::document::ComponentDocument;
use crate::error::Result;

use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// Capabilities of one component kind.
#[derive(Debug, Clone)]
pub struct KindSpec {
    /// Whether components of this kind can contain others
    pub is_area: bool,
    /// Kinds a component of this kind may directly contain
    pub allowed_children: BTreeSet<ComponentKind>,
    /// Size given to freshly created components
    pub default_size: Size,
    /// Default property values
    pub defaults: fn() -> Properties,
}

/// Kind → capability lookup, built once and shared.
#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    specs: HashMap<ComponentKind, KindSpec>,
}

impl ComponentRegistry {
    /// The built-in table covering every [`ComponentKind`].
    #[must_use]
    pub fn builtin() -> Self {
        use ComponentKind::*;

        let mut specs = HashMap::new();
        let mut area = |kind: ComponentKind,
                        children: &[ComponentKind],
                        (width, height): (f64, f64),
                        defaults: fn() -> Properties| {
            specs.insert(
                kind,
                KindSpec {
                    is_area: true,
                    allowed_children: children.iter().copied().collect(),
                    default_size: Size { width, height },
                    defaults,
                },
            );
        };

        area(
            Region,
            &[Vpc, S3Bucket, DynamoDbTable, LambdaFunction, ApiGateway],
            (1200.0, 800.0),
            region_defaults,
        );
        area(
            Vpc,
            &[Subnet, SecurityGroup, InternetGateway, LoadBalancer],
            (800.0, 600.0),
            vpc_defaults,
        );
        area(
            Subnet,
            &[Ec2Instance, RdsInstance, NatGateway, LoadBalancer, LambdaFunction],
            (360.0, 240.0),
            subnet_defaults,
        );
        area(
            SecurityGroup,
            &[Ec2Instance, RdsInstance, LambdaFunction, LoadBalancer],
            (300.0, 200.0),
            security_group_defaults,
        );

        let leaves: [(ComponentKind, fn() -> Properties); 9] = [
            (Ec2Instance, ec2_defaults),
            (RdsInstance, rds_defaults),
            (S3Bucket, s3_defaults),
            (DynamoDbTable, dynamodb_defaults),
            (LambdaFunction, lambda_defaults),
            (LoadBalancer, load_balancer_defaults),
            (ApiGateway, api_gateway_defaults),
            (InternetGateway, Properties::new),
            (NatGateway, nat_gateway_defaults),
        ];
        for (kind, defaults) in leaves {
            specs.insert(
                kind,
                KindSpec {
                    is_area: false,
                    allowed_children: BTreeSet::new(),
                    default_size: Size {
                        width: 120.0,
                        height: 80.0,
                    },
                    defaults,
                },
            );
        }

        Self { specs }
    }

    /// The built-in table behind an `Arc`.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::builtin())
    }

    /// Replace the kinds an area kind may directly contain.
    ///
    /// Non-area kinds are left untouched.
    #[must_use]
    pub fn with_allowed_children(
        mut self,
        kind: ComponentKind,
        children: impl IntoIterator<Item = ComponentKind>,
    ) -> Self {
        match self.specs.get_mut(&kind) {
            Some(spec) if spec.is_area => spec.allowed_children = children.into_iter().collect(),
            _ => tracing::warn!(kind = %kind, "Not an area kind, allowed children unchanged"),
        }
        self
    }

    /// Capability row of a kind.
    #[must_use]
    pub fn spec(&self, kind: ComponentKind) -> Option<&KindSpec> {
        self.specs.get(&kind)
    }

    /// Check whether a kind is an area kind.
    #[must_use]
    pub fn is_area(&self, kind: ComponentKind) -> bool {
        self.spec(kind).is_some_and(|spec| spec.is_area)
    }

    /// Check whether `parent` may directly contain `child`.
    #[must_use]
    pub fn allows(&self, parent: ComponentKind, child: ComponentKind) -> bool {
        self.spec(parent)
            .is_some_and(|spec| spec.allowed_children.contains(&child))
    }

    /// Kinds `kind` may directly contain; empty for non-areas.
    #[must_use]
    pub fn allowed_children(&self, kind: ComponentKind) -> BTreeSet<ComponentKind> {
        self.spec(kind)
            .map(|spec| spec.allowed_children.clone())
            .unwrap_or_default()
    }

    /// Create a fresh component of `kind` carrying the kind defaults.
    #[must_use]
    pub fn create(&self, kind: ComponentKind, name: impl Into<String>) -> Component {
        let (size, properties, area) = match self.spec(kind) {
            Some(spec) => (
                spec.default_size,
                (spec.defaults)(),
                spec.is_area
                    .then(|| AreaState::new(spec.allowed_children.clone())),
            ),
            None => (Size::default(), Properties::new(), None),
        };

        Component {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            position: Position::default(),
            size,
            properties,
            source: None,
            area,
        }
    }

    /// Rebuild a single component from its serialized node.
    ///
    /// Children are not attached here; the caller walks the tree and
    /// attaches them once every node exists.
    ///
    /// # Errors
    ///
    /// Returns `DocumentInvalid` if the node's kind is unknown.
    pub fn from_document(&self, node: &ComponentDocument) -> Result<Component> {
        let kind: ComponentKind = node.kind.parse().map_err(|message| {
            crate::err!(DocumentInvalid {
                message: format!("component '{}': {message}", node.id),
            })
        })?;

        let area = if self.is_area(kind) {
            let allowed = node
                .allowed_child_kinds
                .clone()
                .unwrap_or_else(|| self.allowed_children(kind));
            Some(AreaState::new(allowed))
        } else {
            None
        };

        Ok(Component {
            id: node.id,
            name: node.name.clone(),
            kind,
            position: node.position,
            size: node.size,
            properties: node.properties.clone().unwrap_or_default(),
            source: node.source.clone(),
            area,
        })
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn props(value: serde_json::Value) -> Properties {
    match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => Properties::new(),
    }
}

fn region_defaults() -> Properties {
    props(json!({ "region": "us-east-1" }))
}

fn vpc_defaults() -> Properties {
    props(json!({ "cidrBlock": "10.0.0.0/16", "enableDnsHostnames": true }))
}

fn subnet_defaults() -> Properties {
    props(json!({ "cidrBlock": "10.0.1.0/24", "mapPublicIpOnLaunch": false }))
}

fn security_group_defaults() -> Properties {
    props(json!({ "description": "Managed security group" }))
}

fn ec2_defaults() -> Properties {
    props(json!({ "instanceType": "t2.micro" }))
}

fn rds_defaults() -> Properties {
    props(json!({ "engine": "mysql", "instanceClass": "db.t3.micro", "allocatedStorage": "20" }))
}

fn s3_defaults() -> Properties {
    props(json!({ "versioning": false }))
}

fn dynamodb_defaults() -> Properties {
    props(json!({ "billingMode": "PAY_PER_REQUEST", "hashKey": "id" }))
}

fn lambda_defaults() -> Properties {
    props(json!({ "runtime": "nodejs18.x", "handler": "index.handler", "memorySize": "128" }))
}

fn load_balancer_defaults() -> Properties {
    props(json!({ "loadBalancerType": "application", "internal": false }))
}

fn api_gateway_defaults() -> Properties {
    props(json!({ "protocolType": "REST" }))
}

fn nat_gateway_defaults() -> Properties {
    props(json!({ "connectivityType": "public" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_spec() {
        let registry = ComponentRegistry::builtin();
        for kind in ComponentKind::ALL {
            assert!(registry.spec(kind).is_some(), "missing spec for {kind}");
        }
    }

    #[test]
    fn test_area_classification() {
        let registry = ComponentRegistry::builtin();
        assert!(registry.is_area(ComponentKind::Region));
        assert!(registry.is_area(ComponentKind::Vpc));
        assert!(registry.is_area(ComponentKind::Subnet));
        assert!(registry.is_area(ComponentKind::SecurityGroup));
        assert!(!registry.is_area(ComponentKind::Ec2Instance));
        assert!(!registry.is_area(ComponentKind::NatGateway));
    }

    #[test]
    fn test_containment_table() {
        let registry = ComponentRegistry::builtin();
        assert!(registry.allows(ComponentKind::Vpc, ComponentKind::Subnet));
        assert!(registry.allows(ComponentKind::Subnet, ComponentKind::Ec2Instance));
        assert!(!registry.allows(ComponentKind::Subnet, ComponentKind::Vpc));
        assert!(!registry.allows(ComponentKind::Ec2Instance, ComponentKind::Ec2Instance));
        assert!(registry.allowed_children(ComponentKind::S3Bucket).is_empty());
    }

    #[test]
    fn test_with_allowed_children() {
        let registry = ComponentRegistry::builtin()
            .with_allowed_children(ComponentKind::Subnet, [ComponentKind::RdsInstance])
            .with_allowed_children(ComponentKind::S3Bucket, [ComponentKind::Vpc]);

        assert!(registry.allows(ComponentKind::Subnet, ComponentKind::RdsInstance));
        assert!(!registry.allows(ComponentKind::Subnet, ComponentKind::Ec2Instance));
        assert!(registry.allowed_children(ComponentKind::S3Bucket).is_empty());

        let subnet = registry.create(ComponentKind::Subnet, "private");
        assert!(!subnet.allows(ComponentKind::Ec2Instance));
    }

    #[test]
    fn test_create_applies_defaults() {
        let registry = ComponentRegistry::builtin();
        let vpc = registry.create(ComponentKind::Vpc, "main");
        assert!(vpc.is_area());
        assert_eq!(vpc.property_str("cidrBlock"), Some("10.0.0.0/16"));
        assert_eq!(vpc.size.width, 800.0);

        let ec2 = registry.create(ComponentKind::Ec2Instance, "web");
        assert!(!ec2.is_area());
        assert_eq!(ec2.property_str("instanceType"), Some("t2.micro"));
        assert_ne!(vpc.id, ec2.id);
    }
}
