//! The diagram model: a component tree plus a relationship list.
//!
//! Containment is stored twice, once as area `children` lists and once as
//! [`RelationshipKind::Contains`] records. Every mutation here keeps the two
//! in step and keeps each component under at most one area.

use crate::diagram::component::{Component, ComponentId, ComponentKind};
use crate::diagram::registry::ComponentRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Identifier of a relationship.
pub type RelationshipId = Uuid;

/// Kind of a relationship between two components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipKind {
    /// Source area encloses target
    Contains,
    /// Traffic or calls flow from source to target
    ConnectsTo,
    /// Source needs target to exist
    DependsOn,
    /// Source mentions target
    References,
}

impl Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Contains => "contains",
            Self::ConnectsTo => "connects-to",
            Self::DependsOn => "depends-on",
            Self::References => "references",
        };
        f.write_str(label)
    }
}

/// A typed edge between two components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Unique id
    pub id: RelationshipId,
    /// Source component
    pub source_id: ComponentId,
    /// Target component
    pub target_id: ComponentId,
    /// Relationship kind
    pub kind: RelationshipKind,
    /// Optional label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Records which input produced a diagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMarker {
    /// Root declaration file of the conversion
    pub root_file: PathBuf,
    /// Every file that was parsed
    pub files: Vec<PathBuf>,
    /// Conversion time
    pub generated_at: DateTime<Utc>,
}

/// A diagram: a region-rooted component tree plus relationships.
#[derive(Debug, Clone)]
pub struct Diagram {
    pub(super) id: Uuid,
    pub(super) name: String,
    pub(super) registry: Arc<ComponentRegistry>,
    pub(super) root: ComponentId,
    pub(super) components: HashMap<ComponentId, Component>,
    /// Registration order, root first
    pub(super) order: Vec<ComponentId>,
    /// child → parent index mirroring the area children lists
    pub(super) parents: HashMap<ComponentId, ComponentId>,
    pub(super) relationships: Vec<Relationship>,
    pub(super) source_marker: Option<SourceMarker>,
}

impl Diagram {
    /// Create an empty diagram holding only its region root.
    #[must_use]
    pub fn new(name: impl Into<String>, registry: Arc<ComponentRegistry>) -> Self {
        let root = registry.create(ComponentKind::Region, "Region");
        Self::with_root(Uuid::new_v4(), name.into(), registry, root)
    }

    pub(super) fn with_root(
        id: Uuid,
        name: String,
        registry: Arc<ComponentRegistry>,
        root: Component,
    ) -> Self {
        let root_id = root.id;
        Self {
            id,
            name,
            registry,
            root: root_id,
            components: HashMap::from([(root_id, root)]),
            order: vec![root_id],
            parents: HashMap::new(),
            relationships: Vec::new(),
            source_marker: None,
        }
    }

    /// Diagram id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Diagram name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the diagram.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// The registry this diagram creates components with.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Id of the region root.
    #[must_use]
    pub const fn root_id(&self) -> ComponentId {
        self.root
    }

    /// The region root component.
    #[must_use]
    pub fn root(&self) -> &Component {
        &self.components[&self.root]
    }

    /// Input provenance, if recorded.
    #[must_use]
    pub fn source_marker(&self) -> Option<&SourceMarker> {
        self.source_marker.as_ref()
    }

    /// Record input provenance.
    pub fn set_source_marker(&mut self, marker: SourceMarker) {
        self.source_marker = Some(marker);
    }

    /// Look up a component.
    #[must_use]
    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    /// Look up a component for editing.
    ///
    /// Position, size, name and properties may be changed freely; the area
    /// state must only be changed through the diagram's own operations.
    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(&id)
    }

    /// Number of components, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true if only the root is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.len() <= 1
    }

    /// All components in registration order, root first.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.order.iter().filter_map(|id| self.components.get(id))
    }

    /// Parent area of a component; `None` for the root and unknown ids.
    #[must_use]
    pub fn parent_of(&self, id: ComponentId) -> Option<ComponentId> {
        self.parents.get(&id).copied()
    }

    /// Direct children of a component.
    #[must_use]
    pub fn children_of(&self, id: ComponentId) -> &[ComponentId] {
        self.components
            .get(&id)
            .map(Component::children)
            .unwrap_or(&[])
    }

    /// Area components in depth-first pre-order, root first.
    #[must_use]
    pub fn areas(&self) -> Vec<ComponentId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(component) = self.components.get(&id) else {
                continue;
            };
            if !component.is_area() {
                continue;
            }
            out.push(id);
            stack.extend(component.children().iter().rev().copied());
        }
        out
    }

    /// All relationships in insertion order.
    #[must_use]
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Relationships of one kind.
    pub fn relationships_of_kind(&self, kind: RelationshipKind) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(move |r| r.kind == kind)
    }

    /// Check whether `ancestor` encloses `id`, directly or transitively.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: ComponentId, id: ComponentId) -> bool {
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent_of(parent);
        }
        false
    }

    /// Add a component, placing it under the first eligible area.
    ///
    /// Areas are scanned depth-first from the root in the order they were
    /// attached; the first one whose allowed kinds include the component's
    /// kind becomes its parent. When none does, the component goes directly
    /// under the root. Placement is first-match, so registration order
    /// decides between several eligible areas.
    pub fn add_component(&mut self, mut component: Component) -> ComponentId {
        let id = component.id;
        if self.components.contains_key(&id) {
            tracing::warn!(component = %id, "Component already in diagram");
            return id;
        }

        if let Some(area) = component.area.as_mut() {
            area.children.clear();
        }

        let parent = self.first_area_allowing(component.kind);

        tracing::trace!(
            component = %id,
            kind = %component.kind,
            parent = %parent,
            "Placing component"
        );

        self.components.insert(id, component);
        self.order.push(id);
        self.attach(parent, id);
        id
    }

    /// Record a relationship.
    ///
    /// Returns the relationship id, or `None` when the request was
    /// rejected. An identical `(source, target, kind)` triple is recorded
    /// once; asking again returns the existing id.
    ///
    /// `Contains` requests also re-parent the target: its previous
    /// `Contains` record is dropped and it moves under `source`. They are
    /// rejected without any change when `source` is not an area, when the
    /// area does not allow the target's kind, or when the move would put a
    /// component inside itself.
    pub fn add_relationship(
        &mut self,
        source: ComponentId,
        target: ComponentId,
        kind: RelationshipKind,
        label: Option<String>,
    ) -> Option<RelationshipId> {
        let (Some(source_component), Some(target_component)) =
            (self.components.get(&source), self.components.get(&target))
        else {
            tracing::warn!(
                source = %source,
                target = %target,
                kind = %kind,
                "Relationship endpoint not found"
            );
            return None;
        };

        if let Some(existing) = self
            .relationships
            .iter()
            .find(|r| r.source_id == source && r.target_id == target && r.kind == kind)
        {
            return Some(existing.id);
        }

        if kind == RelationshipKind::Contains {
            let rejection = if !source_component.is_area() {
                Some("source is not an area")
            } else if source == target {
                Some("component cannot contain itself")
            } else if self.is_ancestor(target, source) {
                Some("target encloses source")
            } else if !source_component.allows(target_component.kind) {
                Some("target kind not allowed in source area")
            } else {
                None
            };

            if let Some(reason) = rejection {
                tracing::warn!(
                    source = %source_component.name,
                    source_kind = %source_component.kind,
                    target = %target_component.name,
                    target_kind = %target_component.kind,
                    reason,
                    "Containment rejected"
                );
                return None;
            }

            self.relationships
                .retain(|r| !(r.kind == RelationshipKind::Contains && r.target_id == target));
            if self.parent_of(target) != Some(source) {
                self.detach(target);
                self.attach(source, target);
            }
        }

        let id = Uuid::new_v4();
        self.relationships.push(Relationship {
            id,
            source_id: source,
            target_id: target,
            kind,
            label,
        });
        Some(id)
    }

    /// Remove a component and every relationship touching it.
    ///
    /// The root cannot be removed. Children of a removed area are placed
    /// again with the same first-match scan as [`Self::add_component`]; the
    /// root takes any child no area allows.
    pub fn remove_component(&mut self, id: ComponentId) -> Option<Component> {
        if id == self.root {
            tracing::debug!("Ignoring request to remove the region root");
            return None;
        }
        if !self.components.contains_key(&id) {
            return None;
        }

        self.detach(id);
        self.relationships
            .retain(|r| r.source_id != id && r.target_id != id);

        let children = self.children_of(id).to_vec();
        for child in &children {
            self.detach(*child);
        }
        self.order.retain(|existing| *existing != id);
        let removed = self.components.remove(&id);

        for child in children {
            let Some(kind) = self.components.get(&child).map(|c| c.kind) else {
                continue;
            };
            let parent = self.first_area_allowing(kind);
            tracing::trace!(component = %child, parent = %parent, "Re-placing orphaned component");
            self.attach(parent, child);
        }

        removed
    }

    /// First area, depth-first from the root, that allows `kind`; the root
    /// when none does.
    fn first_area_allowing(&self, kind: ComponentKind) -> ComponentId {
        self.areas()
            .into_iter()
            .find(|area| self.components.get(area).is_some_and(|a| a.allows(kind)))
            .unwrap_or(self.root)
    }

    fn attach(&mut self, parent: ComponentId, child: ComponentId) {
        if let Some(area) = self
            .components
            .get_mut(&parent)
            .and_then(|p| p.area.as_mut())
        {
            area.attach(child);
            self.parents.insert(child, parent);
        }
    }

    fn detach(&mut self, child: ComponentId) {
        if let Some(parent) = self.parents.remove(&child) {
            if let Some(area) = self
                .components
                .get_mut(&parent)
                .and_then(|p| p.area.as_mut())
            {
                area.detach(child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn diagram() -> Diagram {
        Diagram::new("test", ComponentRegistry::shared())
    }

    fn add(diagram: &mut Diagram, kind: ComponentKind, name: &str) -> ComponentId {
        let component = diagram.registry().create(kind, name);
        diagram.add_component(component)
    }

    fn assert_single_parent(diagram: &Diagram) {
        let mut seen = HashSet::new();
        for component in diagram.components() {
            for child in component.children() {
                assert!(seen.insert(*child), "component {child} has two parents");
                assert_eq!(diagram.parent_of(*child), Some(component.id));
            }
        }
    }

    #[test]
    fn test_new_diagram_has_region_root() {
        let d = diagram();
        assert_eq!(d.root().kind, ComponentKind::Region);
        assert!(d.is_empty());
        assert_eq!(d.areas(), vec![d.root_id()]);
    }

    #[test]
    fn test_unplaceable_component_goes_under_root() {
        let mut d = diagram();
        let ec2 = add(&mut d, ComponentKind::Ec2Instance, "web");
        assert_eq!(d.parent_of(ec2), Some(d.root_id()));
    }

    #[test]
    fn test_placement_is_first_match_in_registration_order() {
        let mut d = diagram();
        let vpc = add(&mut d, ComponentKind::Vpc, "main");
        let first = add(&mut d, ComponentKind::Subnet, "first");
        let second = add(&mut d, ComponentKind::Subnet, "second");
        assert_eq!(d.parent_of(first), Some(vpc));
        assert_eq!(d.parent_of(second), Some(vpc));

        let ec2 = add(&mut d, ComponentKind::Ec2Instance, "web");
        assert_eq!(d.parent_of(ec2), Some(first));

        // A security group registered later is also eligible but loses
        let sg = add(&mut d, ComponentKind::SecurityGroup, "sg");
        let db = add(&mut d, ComponentKind::RdsInstance, "db");
        assert_eq!(d.parent_of(sg), Some(vpc));
        assert_eq!(d.parent_of(db), Some(first));
    }

    #[test]
    fn test_contains_reparents_and_replaces_previous_edge() {
        let mut d = diagram();
        add(&mut d, ComponentKind::Vpc, "main");
        let a = add(&mut d, ComponentKind::Subnet, "a");
        let b = add(&mut d, ComponentKind::Subnet, "b");
        let ec2 = add(&mut d, ComponentKind::Ec2Instance, "web");
        assert_eq!(d.parent_of(ec2), Some(a));

        let first = d.add_relationship(a, ec2, RelationshipKind::Contains, None);
        assert!(first.is_some());
        let second = d.add_relationship(b, ec2, RelationshipKind::Contains, None);
        assert!(second.is_some());

        assert_eq!(d.parent_of(ec2), Some(b));
        assert!(!d.children_of(a).contains(&ec2));
        let contains: Vec<_> = d
            .relationships_of_kind(RelationshipKind::Contains)
            .filter(|r| r.target_id == ec2)
            .collect();
        assert_eq!(contains.len(), 1);
        assert_eq!(contains[0].source_id, b);
        assert_single_parent(&d);
    }

    #[test]
    fn test_disallowed_containment_changes_nothing() {
        let mut d = diagram();
        let vpc = add(&mut d, ComponentKind::Vpc, "main");
        let subnet = add(&mut d, ComponentKind::Subnet, "a");
        let ec2 = add(&mut d, ComponentKind::Ec2Instance, "web");
        d.add_relationship(subnet, ec2, RelationshipKind::Contains, None);

        // vpc may not hold an instance directly
        assert!(d
            .add_relationship(vpc, ec2, RelationshipKind::Contains, None)
            .is_none());
        assert_eq!(d.parent_of(ec2), Some(subnet));
        assert_eq!(d.relationships().len(), 1);
    }

    #[test]
    fn test_containment_cycles_rejected() {
        let mut d = diagram();
        let vpc = add(&mut d, ComponentKind::Vpc, "main");
        let subnet = add(&mut d, ComponentKind::Subnet, "a");
        let ec2 = add(&mut d, ComponentKind::Ec2Instance, "web");

        assert!(d.add_relationship(ec2, subnet, RelationshipKind::Contains, None).is_none());
        assert!(d.add_relationship(vpc, vpc, RelationshipKind::Contains, None).is_none());
        assert!(d
            .add_relationship(subnet, d.root_id(), RelationshipKind::Contains, None)
            .is_none());
        assert!(d.relationships().is_empty());
    }

    #[test]
    fn test_unknown_endpoint_rejected() {
        let mut d = diagram();
        let vpc = add(&mut d, ComponentKind::Vpc, "main");
        assert!(d
            .add_relationship(vpc, Uuid::new_v4(), RelationshipKind::DependsOn, None)
            .is_none());
        assert!(d.relationships().is_empty());
    }

    #[test]
    fn test_identical_relationship_recorded_once() {
        let mut d = diagram();
        let a = add(&mut d, ComponentKind::Ec2Instance, "a");
        let b = add(&mut d, ComponentKind::S3Bucket, "b");
        let first = d.add_relationship(a, b, RelationshipKind::ConnectsTo, None);
        let again = d.add_relationship(a, b, RelationshipKind::ConnectsTo, Some("again".into()));
        let other = d.add_relationship(a, b, RelationshipKind::DependsOn, None);
        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(d.relationships().len(), 2);
    }

    #[test]
    fn test_non_containment_edges_leave_tree_alone() {
        let mut d = diagram();
        let vpc = add(&mut d, ComponentKind::Vpc, "main");
        let bucket = add(&mut d, ComponentKind::S3Bucket, "logs");
        d.add_relationship(vpc, bucket, RelationshipKind::DependsOn, None);
        assert_eq!(d.parent_of(bucket), Some(d.root_id()));
    }

    #[test]
    fn test_remove_component_rehomes_children_and_drops_edges() {
        let mut d = diagram();
        let vpc = add(&mut d, ComponentKind::Vpc, "main");
        let subnet = add(&mut d, ComponentKind::Subnet, "a");
        let bucket = add(&mut d, ComponentKind::S3Bucket, "logs");
        d.add_relationship(vpc, subnet, RelationshipKind::Contains, None);
        d.add_relationship(subnet, bucket, RelationshipKind::ConnectsTo, None);

        let removed = d.remove_component(vpc).unwrap();
        assert_eq!(removed.name, "main");
        assert_eq!(d.parent_of(subnet), Some(d.root_id()));
        assert_eq!(d.relationships().len(), 1);
        assert!(d.component(vpc).is_none());
        assert_single_parent(&d);
    }

    #[test]
    fn test_remove_component_replaces_children_first_match() {
        let mut d = diagram();
        let main = add(&mut d, ComponentKind::Vpc, "main");
        let subnet = add(&mut d, ComponentKind::Subnet, "a");
        let web = add(&mut d, ComponentKind::Ec2Instance, "web");
        let backup = add(&mut d, ComponentKind::Vpc, "backup");
        assert_eq!(d.parent_of(subnet), Some(main));
        assert_eq!(d.parent_of(web), Some(subnet));

        d.remove_component(main);
        assert_eq!(d.parent_of(subnet), Some(backup));
        assert_eq!(d.parent_of(web), Some(subnet));
        assert!(d.component(backup).unwrap().allows(ComponentKind::Subnet));
        assert_single_parent(&d);
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut d = diagram();
        let root = d.root_id();
        assert!(d.remove_component(root).is_none());
        assert!(d.component(root).is_some());
    }

    #[test]
    fn test_single_parent_invariant_under_random_moves() {
        let mut d = diagram();
        add(&mut d, ComponentKind::Vpc, "main");
        let subnets: Vec<_> = (0..3)
            .map(|i| add(&mut d, ComponentKind::Subnet, &format!("s{i}")))
            .collect();
        let sgs: Vec<_> = (0..2)
            .map(|i| add(&mut d, ComponentKind::SecurityGroup, &format!("g{i}")))
            .collect();
        let instances: Vec<_> = (0..4)
            .map(|i| add(&mut d, ComponentKind::Ec2Instance, &format!("i{i}")))
            .collect();

        let parents: Vec<_> = subnets.iter().chain(sgs.iter()).copied().collect();
        for round in 0..20 {
            let parent = parents[round % parents.len()];
            let child = instances[(round * 3) % instances.len()];
            d.add_relationship(parent, child, RelationshipKind::Contains, None);
            assert_single_parent(&d);
        }
    }
}
