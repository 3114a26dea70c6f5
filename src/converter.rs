//! Conversion from declaration files to a diagram.
//!
//! The pipeline is:
//!
//! 1. resolve the files reachable from the root ([`ModuleResolver`])
//! 2. read them with bounded concurrency
//! 3. extract resources of the mapped kinds ([`ResourceExtractor`])
//! 4. filter them through the [`MappingPolicy`]
//! 5. build components and infer relationships ([`Converter::convert_resources`])
//! 6. lay the diagram out

use crate::config::Config;
use crate::diagram::layout::Engine;
use crate::diagram::{
    ComponentId, ComponentKind, ComponentRegistry, Diagram, RelationshipKind, SourceMarker,
    SourceStamp,
};
use crate::error::{ErrorCollector, Result, TfDiagramError};
use crate::mapping::MappingPolicy;
use crate::parser::ResourceExtractor;
use crate::resolver::{ModuleResolver, ResolvedFiles};
use crate::types::{ResourceId, SourceResource};

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Containment pairs `(parent, child)` honoured even when the parent area
/// was configured without the child kind.
const WELL_KNOWN_CONTAINMENT: &[(ComponentKind, ComponentKind)] = &[
    (ComponentKind::Vpc, ComponentKind::Subnet),
    (ComponentKind::Subnet, ComponentKind::Ec2Instance),
    (ComponentKind::SecurityGroup, ComponentKind::Ec2Instance),
];

/// Component properties holding references to enclosing areas, applied in
/// this order. Later entries win, so a subnet beats a security group.
const FOREIGN_KEYS: &[(&str, ComponentKind)] = &[
    ("vpcId", ComponentKind::Vpc),
    ("securityGroupId", ComponentKind::SecurityGroup),
    ("securityGroupIds", ComponentKind::SecurityGroup),
    ("subnetId", ComponentKind::Subnet),
    ("subnetIds", ComponentKind::Subnet),
];

/// Result of converting a root file.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    /// The laid-out diagram
    pub diagram: Diagram,
    /// Module resolution outcome
    pub resolved: ResolvedFiles,
    /// Resources that made it into the diagram, sorted by id
    pub resources: Vec<SourceResource>,
    /// Files that could not be read
    pub skipped_files: Vec<PathBuf>,
}

/// Drives a conversion.
#[derive(Debug, Clone)]
pub struct Converter {
    config: Config,
    policy: MappingPolicy,
    registry: Arc<ComponentRegistry>,
}

impl Converter {
    /// Create a converter.
    #[must_use]
    pub fn new(config: Config, policy: MappingPolicy, registry: Arc<ComponentRegistry>) -> Self {
        Self {
            config,
            policy,
            registry,
        }
    }

    /// The mapping policy in use.
    #[must_use]
    pub fn policy(&self) -> &MappingPolicy {
        &self.policy
    }

    /// Resolve the files reachable from `root`.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if `root` does not exist.
    pub fn resolve(&self, root: &Path) -> Result<ResolvedFiles> {
        ModuleResolver::new(self.config.scan.clone()).resolve(root)
    }

    /// Resolve, read and extract, returning the policy-filtered resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is missing, or if a file cannot be read
    /// while `continue_on_error` is off.
    pub async fn extract(&self, root: &Path) -> Result<(ResolvedFiles, Vec<SourceResource>, Vec<PathBuf>)> {
        let resolved = self.resolve(root)?;
        let (contents, skipped) = self.read_files(resolved.files().iter().cloned().collect()).await?;

        let extractor = ResourceExtractor::new(self.policy.interesting_kinds());
        let resources = self.policy.retain(extractor.extract_files(&contents));

        tracing::info!(
            files = contents.len(),
            skipped = skipped.len(),
            resources = resources.len(),
            "Extracted resources"
        );

        Ok((resolved, resources, skipped))
    }

    /// Convert the declarations reachable from `root` into a diagram.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is missing, or if a file cannot be read
    /// while `continue_on_error` is off.
    pub async fn convert_file(&self, root: &Path) -> Result<ConversionResult> {
        tracing::info!(path = %root.display(), "Converting");

        let (resolved, resources, skipped_files) = self.extract(root).await?;

        let name = diagram_name(resolved.root());
        let mut diagram = self.convert_resources(&resources, &name);
        diagram.set_source_marker(SourceMarker {
            root_file: resolved.root().to_path_buf(),
            files: resolved.files().iter().cloned().collect(),
            generated_at: chrono::Utc::now(),
        });

        tracing::info!(
            components = diagram.len() - 1,
            relationships = diagram.relationships().len(),
            "Conversion complete"
        );

        Ok(ConversionResult {
            diagram,
            resolved,
            resources,
            skipped_files,
        })
    }

    async fn read_files(&self, paths: Vec<PathBuf>) -> Result<(Vec<(PathBuf, String)>, Vec<PathBuf>)> {
        let limit = self.config.scan.max_concurrent_reads.max(1);

        let mut reads: Vec<_> = stream::iter(paths)
            .map(|path| async move {
                let result = tokio::fs::read_to_string(&path).await;
                (path, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await;
        reads.sort_by(|a, b| a.0.cmp(&b.0));

        let mut contents = Vec::with_capacity(reads.len());
        let mut skipped = Vec::new();
        let mut errors = ErrorCollector::new();

        for (path, result) in reads {
            let error = match result {
                Ok(content) => {
                    contents.push((path, content));
                    continue;
                }
                Err(e) => TfDiagramError::io(path.clone(), e, file!(), line!()),
            };

            if self.config.scan.continue_on_error && error.is_recoverable() {
                tracing::warn!(file = %path.display(), error = %error, "Skipping unreadable file");
                skipped.push(path);
            } else {
                tracing::error!(file = %path.display(), error = %error, "Failed to read file");
                errors.add(error);
            }
        }

        errors.into_result()?;
        Ok((contents, skipped))
    }

    /// Build a laid-out diagram from already extracted resources.
    ///
    /// Resources without a mapping are skipped.
    #[must_use]
    pub fn convert_resources(&self, resources: &[SourceResource], name: &str) -> Diagram {
        let mut diagram = Diagram::new(name, self.registry.clone());

        let placed = self.create_components(&mut diagram, resources);
        infer_from_references(&mut diagram, resources, &placed);
        backfill_foreign_keys(&mut diagram, &placed);

        Engine::new(self.config.layout).apply(&mut diagram);

        tracing::debug!(
            diagram = %name,
            components = diagram.len(),
            relationships = diagram.relationships().len(),
            "Built diagram"
        );

        diagram
    }

    fn create_components(
        &self,
        diagram: &mut Diagram,
        resources: &[SourceResource],
    ) -> HashMap<ResourceId, ComponentId> {
        let mut ordered: Vec<(ComponentKind, &SourceResource)> = resources
            .iter()
            .filter_map(|resource| {
                self.policy
                    .mapping_for(&resource.kind)
                    .map(|mapping| (mapping.component_kind, resource))
            })
            .collect();
        ordered.sort_by(|a, b| {
            placement_priority(a.0)
                .cmp(&placement_priority(b.0))
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        let mut placed = HashMap::new();
        for (kind, resource) in ordered {
            if placed.contains_key(&resource.id) {
                tracing::debug!(resource = %resource.id, "Resource declared twice, keeping the first");
                continue;
            }

            let mut component = self.registry.create(kind, resource.name.as_str());
            if let Some(mapping) = self.policy.mapping_for(&resource.kind) {
                component.properties.extend(mapping.map_attributes(resource));
            }
            if let Some(serde_json::Value::String(display)) = component.properties.remove("name") {
                component.name = display;
            }
            component.source = Some(SourceStamp {
                resource_id: resource.id.clone(),
                resource_kind: resource.kind.clone(),
                file: resource.source_file.clone(),
            });

            let id = diagram.add_component(component);
            placed.insert(resource.id.clone(), id);
        }

        placed
    }
}

/// Vpcs first, then subnets, then security groups, then the rest.
fn placement_priority(kind: ComponentKind) -> u8 {
    match kind {
        ComponentKind::Vpc => 0,
        ComponentKind::Subnet => 1,
        ComponentKind::SecurityGroup => 2,
        _ => 3,
    }
}

fn diagram_name(root: &Path) -> String {
    let target = if root.is_dir() {
        Some(root)
    } else {
        root.parent()
    };
    target
        .and_then(Path::file_name)
        .map_or_else(|| "diagram".to_string(), |n| n.to_string_lossy().into_owned())
}

/// Turn resource references into relationships.
fn infer_from_references(
    diagram: &mut Diagram,
    resources: &[SourceResource],
    placed: &HashMap<ResourceId, ComponentId>,
) {
    for resource in resources {
        let Some(&from) = placed.get(&resource.id) else {
            continue;
        };

        for dependency in &resource.dependencies {
            let Some(&to) = placed.get(dependency) else {
                tracing::trace!(
                    resource = %resource.id,
                    dependency = %dependency,
                    "Reference to a resource outside the diagram"
                );
                continue;
            };

            let Some(from_kind) = diagram.component(from).map(|c| c.kind) else {
                continue;
            };
            let Some(target) = diagram.component(to) else {
                continue;
            };
            let (to_kind, to_is_area, to_allows) =
                (target.kind, target.is_area(), target.allows(from_kind));

            let well_known = WELL_KNOWN_CONTAINMENT.contains(&(to_kind, from_kind));
            if to_allows || well_known {
                if !to_allows {
                    widen_area(diagram, to, from_kind);
                }
                if diagram
                    .add_relationship(to, from, RelationshipKind::Contains, None)
                    .is_some()
                {
                    continue;
                }
                // Rejected containment still records the reference
                diagram.add_relationship(from, to, RelationshipKind::DependsOn, None);
            } else if !to_is_area {
                diagram.add_relationship(from, to, RelationshipKind::ConnectsTo, None);
            } else {
                diagram.add_relationship(from, to, RelationshipKind::DependsOn, None);
            }
        }
    }
}

/// Let `area` hold components of `kind` for a well-known containment pair.
fn widen_area(diagram: &mut Diagram, area: ComponentId, kind: ComponentKind) {
    if let Some(state) = diagram.component_mut(area).and_then(|c| c.area.as_mut()) {
        tracing::debug!(area = %area, kind = %kind, "Allowing well-known containment");
        state.allowed_child_kinds.insert(kind);
    }
}

/// Reconnect components to areas named in their foreign-key properties.
fn backfill_foreign_keys(diagram: &mut Diagram, placed: &HashMap<ResourceId, ComponentId>) {
    // Per area kind: resource id and resource name → component
    let mut areas: HashMap<ComponentKind, HashMap<String, ComponentId>> = HashMap::new();
    for component in diagram.components() {
        if !component.is_area() || component.kind == ComponentKind::Region {
            continue;
        }
        let Some(stamp) = &component.source else {
            continue;
        };
        let lookup = areas.entry(component.kind).or_default();
        lookup.insert(stamp.resource_id.clone(), component.id);
        if let Some((_, name)) = stamp.resource_id.split_once('.') {
            lookup.entry(name.to_string()).or_insert(component.id);
        }
        lookup.entry(component.name.clone()).or_insert(component.id);
    }

    let mut links = Vec::new();
    for &child in placed.values() {
        let Some(component) = diagram.component(child) else {
            continue;
        };
        for (key, area_kind) in FOREIGN_KEYS {
            let Some(value) = component.properties.get(*key) else {
                continue;
            };
            let Some(lookup) = areas.get(area_kind) else {
                continue;
            };
            for reference in reference_values(value) {
                if let Some(&parent) = lookup.get(&reference) {
                    links.push((parent, child, *key));
                } else {
                    tracing::trace!(key = *key, reference = %reference, "Foreign key matches no area");
                }
            }
        }
    }

    // Deterministic order regardless of hash iteration
    links.sort_by_key(|(parent, child, key)| {
        (
            diagram.component(*child).and_then(|c| c.source.as_ref().map(|s| s.resource_id.clone())),
            FOREIGN_KEYS.iter().position(|(k, _)| k == key),
            *parent,
        )
    });

    for (parent, child, _) in links {
        if diagram.parent_of(child) == Some(parent)
            && diagram
                .relationships_of_kind(RelationshipKind::Contains)
                .any(|r| r.source_id == parent && r.target_id == child)
        {
            continue;
        }
        let kinds = diagram
            .component(parent)
            .zip(diagram.component(child))
            .map(|(p, c)| (p.kind, c.kind, p.allows(c.kind)));
        if let Some((parent_kind, child_kind, false)) = kinds {
            if WELL_KNOWN_CONTAINMENT.contains(&(parent_kind, child_kind)) {
                widen_area(diagram, parent, child_kind);
            }
        }
        diagram.add_relationship(parent, child, RelationshipKind::Contains, None);
    }
}

/// Normalized references held by a foreign-key property value.
///
/// `${aws_vpc.main.id}` and `aws_vpc.main.id` both become `aws_vpc.main`;
/// a bare name such as `main` is kept as is.
fn reference_values(value: &serde_json::Value) -> Vec<String> {
    let raw: Vec<&str> = match value {
        serde_json::Value::String(s) => vec![s.as_str()],
        serde_json::Value::Array(items) => items.iter().filter_map(serde_json::Value::as_str).collect(),
        _ => Vec::new(),
    };

    raw.into_iter()
        .map(|s| {
            let s = s.trim();
            let s = s
                .strip_prefix("${")
                .and_then(|inner| inner.strip_suffix('}'))
                .unwrap_or(s);
            let segments: Vec<&str> = s.split('.').take(2).collect();
            // Drop index suffixes such as `public[0]`
            segments
                .iter()
                .map(|segment| segment.split('[').next().unwrap_or(segment))
                .collect::<Vec<_>>()
                .join(".")
        })
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingConfig;
    use pretty_assertions::assert_eq;

    fn converter() -> Converter {
        Converter::new(
            Config::default(),
            MappingConfig::default_policy().compile(),
            ComponentRegistry::shared(),
        )
    }

    fn component_by_name<'a>(diagram: &'a Diagram, name: &str) -> &'a crate::diagram::Component {
        diagram.components().find(|c| c.name == name).unwrap()
    }

    fn network() -> Vec<SourceResource> {
        vec![
            SourceResource::new("aws_instance", "web", "main.tf")
                .with_attribute("subnet_id", "${aws_subnet.public.id}")
                .with_attribute("instance_type", "t3.micro")
                .with_dependency("aws_subnet.public"),
            SourceResource::new("aws_subnet", "public", "main.tf")
                .with_attribute("vpc_id", "${aws_vpc.main.id}")
                .with_dependency("aws_vpc.main"),
            SourceResource::new("aws_vpc", "main", "main.tf"),
            SourceResource::new("aws_s3_bucket", "logs", "main.tf").with_attribute("bucket", "app-logs"),
        ]
    }

    #[test]
    fn test_convert_resources_builds_nested_tree() {
        let diagram = converter().convert_resources(&network(), "network");

        assert_eq!(diagram.len(), 5);
        let vpc = component_by_name(&diagram, "main");
        let subnet = component_by_name(&diagram, "public");
        let web = component_by_name(&diagram, "web");
        let bucket = component_by_name(&diagram, "app-logs");

        assert_eq!(diagram.parent_of(vpc.id), Some(diagram.root_id()));
        assert_eq!(diagram.parent_of(subnet.id), Some(vpc.id));
        assert_eq!(diagram.parent_of(web.id), Some(subnet.id));
        assert_eq!(diagram.parent_of(bucket.id), Some(diagram.root_id()));
        assert_eq!(diagram.relationships_of_kind(RelationshipKind::Contains).count(), 2);
        assert_eq!(bucket.kind, ComponentKind::S3Bucket);
        assert!(!bucket.properties.contains_key("name"));
    }

    #[test]
    fn test_source_stamp_and_mapped_properties() {
        let diagram = converter().convert_resources(&network(), "network");
        let web = component_by_name(&diagram, "web");

        let stamp = web.source.as_ref().unwrap();
        assert_eq!(stamp.resource_id, "aws_instance.web");
        assert_eq!(stamp.resource_kind, "aws_instance");
        assert_eq!(web.property_str("subnetId"), Some("${aws_subnet.public.id}"));
    }

    #[test]
    fn test_reference_to_leaf_is_connects_to() {
        let resources = vec![
            SourceResource::new("aws_lambda_function", "handler", "main.tf")
                .with_dependency("aws_dynamodb_table.orders"),
            SourceResource::new("aws_dynamodb_table", "orders", "main.tf"),
        ];
        let diagram = converter().convert_resources(&resources, "serverless");
        let handler = component_by_name(&diagram, "handler");
        let orders = component_by_name(&diagram, "orders");

        let relationships = diagram.relationships();
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].kind, RelationshipKind::ConnectsTo);
        assert_eq!(relationships[0].source_id, handler.id);
        assert_eq!(relationships[0].target_id, orders.id);
    }

    #[test]
    fn test_reference_to_disallowing_area_is_depends_on() {
        let resources = vec![
            SourceResource::new("aws_s3_bucket", "assets", "main.tf").with_dependency("aws_vpc.main"),
            SourceResource::new("aws_vpc", "main", "main.tf"),
        ];
        let diagram = converter().convert_resources(&resources, "mixed");
        let relationships = diagram.relationships();
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].kind, RelationshipKind::DependsOn);
    }

    fn converter_with(registry: ComponentRegistry) -> Converter {
        Converter::new(
            Config::default(),
            MappingConfig::default_policy().compile(),
            Arc::new(registry),
        )
    }

    #[test]
    fn test_well_known_pair_overrides_narrow_area() {
        let registry = ComponentRegistry::builtin()
            .with_allowed_children(ComponentKind::Subnet, [ComponentKind::RdsInstance]);
        let resources = vec![
            SourceResource::new("aws_subnet", "public", "main.tf"),
            SourceResource::new("aws_instance", "web", "main.tf").with_dependency("aws_subnet.public"),
        ];
        let diagram = converter_with(registry).convert_resources(&resources, "narrow");
        let subnet = component_by_name(&diagram, "public");
        let web = component_by_name(&diagram, "web");

        assert_eq!(diagram.parent_of(web.id), Some(subnet.id));
        assert!(subnet.allows(ComponentKind::Ec2Instance));
        let contains: Vec<_> = diagram.relationships_of_kind(RelationshipKind::Contains).collect();
        assert_eq!(contains.len(), 1);
        assert_eq!(contains[0].source_id, subnet.id);
    }

    #[test]
    fn test_well_known_pair_through_foreign_key() {
        let registry = ComponentRegistry::builtin()
            .with_allowed_children(ComponentKind::Subnet, [ComponentKind::RdsInstance]);
        let resources = vec![
            SourceResource::new("aws_subnet", "public", "main.tf"),
            SourceResource::new("aws_instance", "web", "main.tf").with_attribute("subnet_id", "aws_subnet.public.id"),
        ];
        let diagram = converter_with(registry).convert_resources(&resources, "narrow");
        let subnet = component_by_name(&diagram, "public");
        let web = component_by_name(&diagram, "web");
        assert_eq!(diagram.parent_of(web.id), Some(subnet.id));
    }

    #[test]
    fn test_rejected_containment_becomes_depends_on() {
        // Subnets may hold vpcs here, but the vpc already encloses the subnet
        let registry = ComponentRegistry::builtin()
            .with_allowed_children(ComponentKind::Subnet, [ComponentKind::Vpc]);
        let resources = vec![
            SourceResource::new("aws_vpc", "main", "main.tf").with_dependency("aws_subnet.a"),
            SourceResource::new("aws_subnet", "a", "main.tf").with_dependency("aws_vpc.main"),
        ];
        let diagram = converter_with(registry).convert_resources(&resources, "loop");
        let vpc = component_by_name(&diagram, "main");
        let subnet = component_by_name(&diagram, "a");

        assert_eq!(diagram.parent_of(subnet.id), Some(vpc.id));
        let depends: Vec<_> = diagram.relationships_of_kind(RelationshipKind::DependsOn).collect();
        assert_eq!(depends.len(), 1);
        assert_eq!(depends[0].source_id, vpc.id);
        assert_eq!(depends[0].target_id, subnet.id);
    }

    #[test]
    fn test_foreign_keys_without_references() {
        // Only the fallback path saw the attribute, no dependency recorded
        let resources = vec![
            SourceResource::new("aws_vpc", "main", "main.tf"),
            SourceResource::new("aws_subnet", "a", "main.tf").with_attribute("vpc_id", "aws_vpc.main.id"),
        ];
        let diagram = converter().convert_resources(&resources, "fk");
        let vpc = component_by_name(&diagram, "main");
        let subnet = component_by_name(&diagram, "a");
        assert_eq!(diagram.parent_of(subnet.id), Some(vpc.id));
        assert_eq!(diagram.relationships().len(), 1);
    }

    #[test]
    fn test_unmapped_resources_are_skipped() {
        let resources = vec![SourceResource::new("aws_iam_role", "exec", "main.tf")];
        let diagram = converter().convert_resources(&resources, "empty");
        assert_eq!(diagram.len(), 1);
    }

    #[test]
    fn test_layout_is_applied() {
        let diagram = converter().convert_resources(&network(), "network");
        let vpc = component_by_name(&diagram, "main");
        let web = component_by_name(&diagram, "web");
        assert_eq!(vpc.position.y, 50.0);
        // subnets sit between the two layers
        assert_eq!(web.position.y, 450.0);
    }

    #[test]
    fn test_reference_values() {
        assert_eq!(reference_values(&serde_json::json!("${aws_vpc.main.id}")), vec!["aws_vpc.main"]);
        assert_eq!(
            reference_values(&serde_json::json!(["aws_subnet.a[0].id", "b"])),
            vec!["aws_subnet.a", "b"]
        );
        assert!(reference_values(&serde_json::json!(true)).is_empty());
    }

    #[test]
    fn test_diagram_name_from_directory() {
        assert_eq!(diagram_name(Path::new("/work/network/main.tf")), "network");
    }

    #[tokio::test]
    async fn test_convert_file_missing_root() {
        let error = converter()
            .convert_file(Path::new("/definitely/not/here/main.tf"))
            .await
            .unwrap_err();
        assert_eq!(error.exit_code(), 14);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped() {
        let temp = tempfile::TempDir::new().unwrap();
        let present = temp.path().join("main.tf");
        std::fs::write(&present, "resource \"aws_vpc\" \"main\" {}\n").unwrap();
        let missing = temp.path().join("gone.tf");

        let (contents, skipped) = converter()
            .read_files(vec![missing.clone(), present.clone()])
            .await
            .unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].0, present);
        assert_eq!(skipped, vec![missing]);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_fatal_when_strict() {
        let mut config = Config::default();
        config.scan.continue_on_error = false;
        let strict = Converter::new(
            config,
            MappingConfig::default_policy().compile(),
            ComponentRegistry::shared(),
        );

        let temp = tempfile::TempDir::new().unwrap();
        let error = strict
            .read_files(vec![temp.path().join("gone.tf")])
            .await
            .unwrap_err();
        assert!(matches!(error, TfDiagramError::Io { .. }));
        assert!(error.is_recoverable());
    }
}
