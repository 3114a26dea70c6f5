//! Serializable diagram documents.
//!
//! A [`DiagramDocument`] is the tree-shaped projection of a [`Diagram`]:
//! the region root with its children nested recursively, followed by the
//! flat relationship list. Optional fields are left out rather than
//! written as `null`.

use crate::diagram::component::{
    Component, ComponentId, ComponentKind, Position, Properties, Size, SourceStamp,
};
use crate::diagram::model::{Diagram, Relationship, RelationshipKind, SourceMarker};
use crate::diagram::registry::ComponentRegistry;
use crate::error::Result;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Document form of a whole diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramDocument {
    /// Diagram id
    pub id: Uuid,
    /// Diagram name
    pub name: String,
    /// Region root with nested children
    pub region: ComponentDocument,
    /// All relationships
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    /// Input provenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_marker: Option<SourceMarker>,
}

/// Document form of one component and its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDocument {
    /// Component id
    pub id: ComponentId,
    /// Display name
    pub name: String,
    /// Kind tag, e.g. `vpc`
    pub kind: String,
    /// Position
    #[serde(default)]
    pub position: Position,
    /// Size
    #[serde(default)]
    pub size: Size,
    /// Properties, omitted when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    /// Originating resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceStamp>,
    /// Allowed child kinds, areas only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_child_kinds: Option<BTreeSet<ComponentKind>>,
    /// Nested children, areas only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ComponentDocument>>,
}

impl DiagramDocument {
    /// Parse a document from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid document.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| {
            crate::err!(DocumentInvalid {
                message: e.to_string(),
            })
        })
    }

    /// Parse a document from YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            crate::err!(DocumentInvalid {
                message: e.to_string(),
            })
        })
    }
}

impl Diagram {
    /// Project the diagram into its document form.
    #[must_use]
    pub fn to_document(&self) -> DiagramDocument {
        DiagramDocument {
            id: self.id,
            name: self.name.clone(),
            region: self.component_document(self.root),
            relationships: self.relationships.clone(),
            source_marker: self.source_marker.clone(),
        }
    }

    fn component_document(&self, id: ComponentId) -> ComponentDocument {
        let component = &self.components[&id];
        ComponentDocument {
            id: component.id,
            name: component.name.clone(),
            kind: component.kind.as_str().to_string(),
            position: component.position,
            size: component.size,
            properties: (!component.properties.is_empty()).then(|| component.properties.clone()),
            source: component.source.clone(),
            allowed_child_kinds: component
                .area
                .as_ref()
                .map(|area| area.allowed_child_kinds.clone()),
            children: component.area.as_ref().map(|area| {
                area.children
                    .iter()
                    .map(|child| self.component_document(*child))
                    .collect()
            }),
        }
    }

    /// Rebuild a diagram from its document form.
    ///
    /// Components come back with their ids, geometry, properties and tree
    /// position; relationships come back as recorded.
    ///
    /// # Errors
    ///
    /// Returns `DocumentInvalid` when a kind is unknown, the root is not a
    /// region, an id appears twice, a leaf has children, an area holds a
    /// kind it does not allow, or a relationship points at a missing
    /// component or disagrees with the tree. Repeated relationships are
    /// collapsed into the first one.
    pub fn from_document(document: &DiagramDocument, registry: Arc<ComponentRegistry>) -> Result<Self> {
        let root = registry.from_document(&document.region)?;
        if root.kind != ComponentKind::Region {
            return Err(crate::err!(DocumentInvalid {
                message: format!("root component has kind '{}', expected 'region'", root.kind),
            }));
        }

        let mut diagram = Self::with_root(document.id, document.name.clone(), registry, root);
        diagram.source_marker = document.source_marker.clone();
        diagram.restore_children(&document.region)?;

        for relationship in &document.relationships {
            for endpoint in [relationship.source_id, relationship.target_id] {
                if !diagram.components.contains_key(&endpoint) {
                    return Err(crate::err!(DocumentInvalid {
                        message: format!(
                            "relationship '{}' references unknown component '{endpoint}'",
                            relationship.id
                        ),
                    }));
                }
            }
            if diagram.relationships.iter().any(|r| {
                r.source_id == relationship.source_id
                    && r.target_id == relationship.target_id
                    && r.kind == relationship.kind
            }) {
                tracing::debug!(relationship = %relationship.id, "Dropping duplicate relationship");
                continue;
            }
            if relationship.kind == RelationshipKind::Contains {
                diagram.check_contains(relationship)?;
            }
            diagram.relationships.push(relationship.clone());
        }

        tracing::debug!(
            diagram = %diagram.name,
            components = diagram.len(),
            relationships = diagram.relationships.len(),
            "Restored diagram from document"
        );

        Ok(diagram)
    }

    fn check_contains(&self, relationship: &Relationship) -> Result<()> {
        if self.parent_of(relationship.target_id) != Some(relationship.source_id) {
            return Err(crate::err!(DocumentInvalid {
                message: format!(
                    "contains relationship '{}' disagrees with the component tree",
                    relationship.id
                ),
            }));
        }
        let allowed = self
            .components
            .get(&relationship.source_id)
            .zip(self.components.get(&relationship.target_id))
            .is_some_and(|(source, target)| source.allows(target.kind));
        if !allowed {
            return Err(crate::err!(DocumentInvalid {
                message: format!(
                    "contains relationship '{}' puts a kind its source does not allow",
                    relationship.id
                ),
            }));
        }
        Ok(())
    }

    fn restore_children(&mut self, node: &ComponentDocument) -> Result<()> {
        let Some(children) = &node.children else {
            return Ok(());
        };

        let parent_is_area = self
            .components
            .get(&node.id)
            .is_some_and(Component::is_area);
        if !parent_is_area && !children.is_empty() {
            return Err(crate::err!(DocumentInvalid {
                message: format!("component '{}' is not an area but has children", node.id),
            }));
        }

        for child in children {
            if self.components.contains_key(&child.id) {
                return Err(crate::err!(DocumentInvalid {
                    message: format!("component id '{}' appears more than once", child.id),
                }));
            }
            let component = self.registry.from_document(child)?;
            // The root takes anything no area allows
            let allowed = node.id == self.root
                || self
                    .components
                    .get(&node.id)
                    .is_some_and(|parent| parent.allows(component.kind));
            if !allowed {
                return Err(crate::err!(DocumentInvalid {
                    message: format!(
                        "component '{}' of kind '{}' is not allowed in '{}'",
                        child.id, component.kind, node.id
                    ),
                }));
            }
            self.components.insert(component.id, component);
            self.order.push(child.id);
            if let Some(area) = self
                .components
                .get_mut(&node.id)
                .and_then(|parent| parent.area.as_mut())
            {
                area.attach(child.id);
            }
            self.parents.insert(child.id, node.id);
            self.restore_children(child)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn sample() -> Diagram {
        let registry = ComponentRegistry::shared();
        let mut diagram = Diagram::new("sample", registry.clone());
        let vpc = diagram.add_component(registry.create(ComponentKind::Vpc, "main"));
        let subnet = diagram.add_component(registry.create(ComponentKind::Subnet, "public"));
        let mut web = registry.create(ComponentKind::Ec2Instance, "web");
        web.source = Some(SourceStamp {
            resource_id: "aws_instance.web".to_string(),
            resource_kind: "aws_instance".to_string(),
            file: PathBuf::from("main.tf"),
        });
        let web = diagram.add_component(web);
        let logs = diagram.add_component(registry.create(ComponentKind::S3Bucket, "logs"));
        diagram.add_relationship(vpc, subnet, RelationshipKind::Contains, None);
        diagram.add_relationship(web, logs, RelationshipKind::ConnectsTo, Some("writes".into()));
        diagram
    }

    #[test]
    fn test_document_round_trip() {
        let diagram = sample();
        let document = diagram.to_document();
        let json = serde_json::to_string_pretty(&document).unwrap();

        let parsed = DiagramDocument::from_json(&json).unwrap();
        let restored = Diagram::from_document(&parsed, ComponentRegistry::shared()).unwrap();

        assert_eq!(restored.to_document(), document);
        assert_eq!(restored.id(), diagram.id());
        assert_eq!(restored.len(), diagram.len());
        for component in diagram.components() {
            assert_eq!(restored.parent_of(component.id), diagram.parent_of(component.id));
        }
    }

    #[test]
    fn test_yaml_round_trip() {
        let document = sample().to_document();
        let yaml = serde_yaml::to_string(&document).unwrap();
        assert_eq!(DiagramDocument::from_yaml(&yaml).unwrap(), document);
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let document = sample().to_document();
        let value = serde_json::to_value(&document).unwrap();
        assert!(value.get("sourceMarker").is_none());

        let children = value["region"]["children"].as_array().unwrap();
        let logs = children.iter().find(|c| c["name"] == "logs").unwrap();
        assert!(logs.get("children").is_none());
        assert!(logs.get("allowedChildKinds").is_none());
        assert!(logs.get("source").is_none());
        assert_eq!(logs["kind"], "s3-bucket");

        let relationships = value["relationships"].as_array().unwrap();
        assert!(relationships[0].get("label").is_none());
        assert_eq!(relationships[1]["label"], "writes");
        assert_eq!(relationships[0]["kind"], "contains");
    }

    #[test]
    fn test_unknown_kind_is_invalid() {
        let mut document = sample().to_document();
        document.region.children.as_mut().unwrap()[0].kind = "mainframe".to_string();
        let error = Diagram::from_document(&document, ComponentRegistry::shared()).unwrap_err();
        assert!(error.to_string().contains("mainframe"));
    }

    #[test]
    fn test_duplicate_relationships_collapse() {
        let mut document = sample().to_document();
        let mut duplicate = document.relationships[1].clone();
        duplicate.id = Uuid::new_v4();
        document.relationships.push(duplicate);

        let restored = Diagram::from_document(&document, ComponentRegistry::shared()).unwrap();
        assert_eq!(restored.relationships().len(), 2);
        assert_eq!(restored.relationships()[1].id, document.relationships[1].id);
    }

    #[test]
    fn test_disallowed_child_kind_is_invalid() {
        let mut document = sample().to_document();
        let children = document.region.children.as_mut().unwrap();
        let logs = children.iter().position(|c| c.name == "logs").unwrap();
        let logs = children.remove(logs);
        let vpc = children.iter_mut().find(|c| c.name == "main").unwrap();
        vpc.children.get_or_insert_with(Vec::new).push(logs);
        document.relationships.retain(|r| r.kind == RelationshipKind::Contains);

        let error = Diagram::from_document(&document, ComponentRegistry::shared()).unwrap_err();
        assert!(error.to_string().contains("not allowed"));
    }

    #[test]
    fn test_contains_with_disallowed_kind_is_invalid() {
        let registry = ComponentRegistry::shared();
        let mut diagram = Diagram::new("orphan", registry.clone());
        // No vpc yet, so the subnet falls back to the root
        let subnet = diagram.add_component(registry.create(ComponentKind::Subnet, "a"));
        let mut document = diagram.to_document();
        assert!(Diagram::from_document(&document, registry.clone()).is_ok());

        document.relationships.push(Relationship {
            id: Uuid::new_v4(),
            source_id: diagram.root_id(),
            target_id: subnet,
            kind: RelationshipKind::Contains,
            label: None,
        });
        let error = Diagram::from_document(&document, registry).unwrap_err();
        assert!(error.to_string().contains("does not allow"));
    }

    #[test]
    fn test_dangling_relationship_is_invalid() {
        let mut document = sample().to_document();
        document.relationships[0].target_id = Uuid::new_v4();
        assert!(Diagram::from_document(&document, ComponentRegistry::shared()).is_err());
    }
}
