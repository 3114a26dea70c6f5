//! Resource mapping policy.
//!
//! The policy document says which resource kinds become which component
//! kinds, how resource attributes are renamed into component properties,
//! and which resource names are kept.
//!
//! # Policy Document Format
//!
//! ```yaml
//! version: "1.0"
//! resourceMappings:
//!   - sourceKind: aws_instance
//!     componentKind: ec2-instance
//!     attributeMapping:
//!       instance_type: instanceType
//!       subnet_id: subnetId
//!       tags.Name: name
//!     includePattern: "^web"
//!     excludePattern: "-legacy$"
//! ```
//!
//! JSON documents with the same shape are accepted too.

use crate::diagram::{ComponentKind, Properties};
use crate::error::{Result, ResultExt};
use crate::parser::KindSelection;
use crate::types::SourceResource;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Current policy document version.
pub const POLICY_VERSION: &str = "1.0";

/// A policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfig {
    /// Document version
    #[serde(default = "default_version")]
    pub version: String,

    /// One entry per mapped resource kind
    #[serde(default)]
    pub resource_mappings: Vec<ResourceMapping>,
}

/// How one resource kind becomes a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMapping {
    /// Resource type, e.g. `aws_instance`
    pub source_kind: String,

    /// Component kind tag, e.g. `ec2-instance`
    pub component_kind: String,

    /// Resource attribute (dot notation) → component property
    #[serde(default)]
    pub attribute_mapping: BTreeMap<String, String>,

    /// Regex the resource name must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_pattern: Option<String>,

    /// Regex the resource name must not match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_pattern: Option<String>,
}

fn default_version() -> String {
    POLICY_VERSION.to_string()
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self::default_policy()
    }
}

impl MappingConfig {
    /// The built-in policy covering networking, compute, storage,
    /// database, serverless and gateway kinds.
    #[must_use]
    pub fn default_policy() -> Self {
        let entries: &[(&str, &str, &[(&str, &str)])] = &[
            (
                "aws_vpc",
                "vpc",
                &[
                    ("cidr_block", "cidrBlock"),
                    ("enable_dns_hostnames", "enableDnsHostnames"),
                    ("tags.Name", "name"),
                ],
            ),
            (
                "aws_subnet",
                "subnet",
                &[
                    ("cidr_block", "cidrBlock"),
                    ("vpc_id", "vpcId"),
                    ("availability_zone", "availabilityZone"),
                    ("map_public_ip_on_launch", "mapPublicIpOnLaunch"),
                    ("tags.Name", "name"),
                ],
            ),
            (
                "aws_security_group",
                "security-group",
                &[
                    ("name", "name"),
                    ("description", "description"),
                    ("vpc_id", "vpcId"),
                ],
            ),
            (
                "aws_instance",
                "ec2-instance",
                &[
                    ("ami", "ami"),
                    ("instance_type", "instanceType"),
                    ("subnet_id", "subnetId"),
                    ("vpc_security_group_ids", "securityGroupIds"),
                    ("security_groups", "securityGroupIds"),
                    ("tags.Name", "name"),
                ],
            ),
            (
                "aws_db_instance",
                "rds-instance",
                &[
                    ("identifier", "name"),
                    ("engine", "engine"),
                    ("engine_version", "engineVersion"),
                    ("instance_class", "instanceClass"),
                    ("allocated_storage", "allocatedStorage"),
                    ("db_subnet_group_name", "subnetGroupName"),
                    ("vpc_security_group_ids", "securityGroupIds"),
                ],
            ),
            (
                "aws_s3_bucket",
                "s3-bucket",
                &[("bucket", "name"), ("acl", "acl")],
            ),
            (
                "aws_dynamodb_table",
                "dynamodb-table",
                &[
                    ("name", "name"),
                    ("billing_mode", "billingMode"),
                    ("hash_key", "hashKey"),
                ],
            ),
            (
                "aws_lambda_function",
                "lambda-function",
                &[
                    ("function_name", "name"),
                    ("runtime", "runtime"),
                    ("handler", "handler"),
                    ("memory_size", "memorySize"),
                    ("vpc_config.subnet_ids", "subnetIds"),
                    ("vpc_config.security_group_ids", "securityGroupIds"),
                ],
            ),
            (
                "aws_lb",
                "load-balancer",
                &[
                    ("name", "name"),
                    ("internal", "internal"),
                    ("load_balancer_type", "loadBalancerType"),
                    ("subnets", "subnetIds"),
                    ("security_groups", "securityGroupIds"),
                ],
            ),
            (
                "aws_alb",
                "load-balancer",
                &[
                    ("name", "name"),
                    ("internal", "internal"),
                    ("subnets", "subnetIds"),
                    ("security_groups", "securityGroupIds"),
                ],
            ),
            (
                "aws_api_gateway_rest_api",
                "api-gateway",
                &[("name", "name"), ("description", "description")],
            ),
            (
                "aws_apigatewayv2_api",
                "api-gateway",
                &[("name", "name"), ("protocol_type", "protocolType")],
            ),
            (
                "aws_internet_gateway",
                "internet-gateway",
                &[("vpc_id", "vpcId"), ("tags.Name", "name")],
            ),
            (
                "aws_nat_gateway",
                "nat-gateway",
                &[
                    ("subnet_id", "subnetId"),
                    ("connectivity_type", "connectivityType"),
                    ("tags.Name", "name"),
                ],
            ),
        ];

        Self {
            version: default_version(),
            resource_mappings: entries
                .iter()
                .map(|(source_kind, component_kind, attributes)| ResourceMapping {
                    source_kind: (*source_kind).to_string(),
                    component_kind: (*component_kind).to_string(),
                    attribute_mapping: attributes
                        .iter()
                        .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
                        .collect(),
                    include_pattern: None,
                    exclude_pattern: None,
                })
                .collect(),
        }
    }

    /// Parse a policy document from YAML or JSON text.
    ///
    /// Only the document shape is checked here; unknown component kinds and
    /// invalid patterns are reported when the policy is compiled.
    ///
    /// # Errors
    ///
    /// Returns `ConfigParse` if the text is not a policy document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| {
            crate::err!(ConfigParse {
                message: format!("invalid policy document: {e}"),
                source: Some(Box::new(e)),
            })
        })?;

        tracing::debug!(
            version = %config.version,
            mappings = config.resource_mappings.len(),
            "Policy document loaded"
        );

        Ok(config)
    }

    /// Read a policy document from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        Self::from_yaml(&content)
    }

    /// Render the document as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// The default policy as a commented YAML document.
    #[must_use]
    pub fn example_yaml() -> String {
        let body = Self::default_policy().to_yaml().unwrap_or_default();
        format!(
            "# tfdiagram resource mapping policy\n\
             #\n\
             # Each entry maps a resource type to a component kind. Resources whose\n\
             # type has no entry are left out of the diagram. includePattern and\n\
             # excludePattern are regular expressions matched against the resource\n\
             # name; exclude wins when both match.\n\
             \n{body}"
        )
    }

    /// Compile the document into a policy ready for matching.
    ///
    /// Entries with an unknown component kind are ignored with a warning,
    /// as are invalid include/exclude patterns. When a resource kind is
    /// mapped more than once the first entry wins.
    #[must_use]
    pub fn compile(&self) -> MappingPolicy {
        let mut mappings = HashMap::new();

        for mapping in &self.resource_mappings {
            let component_kind = match mapping.component_kind.parse::<ComponentKind>() {
                Ok(ComponentKind::Region) | Err(_) => {
                    tracing::warn!(
                        source_kind = %mapping.source_kind,
                        component_kind = %mapping.component_kind,
                        "Unknown component kind in mapping, ignoring it"
                    );
                    continue;
                }
                Ok(kind) => kind,
            };

            if mappings.contains_key(&mapping.source_kind) {
                tracing::warn!(
                    source_kind = %mapping.source_kind,
                    "Resource kind mapped more than once, keeping the first mapping"
                );
                continue;
            }

            mappings.insert(
                mapping.source_kind.clone(),
                CompiledMapping {
                    source_kind: mapping.source_kind.clone(),
                    component_kind,
                    attribute_mapping: mapping.attribute_mapping.clone(),
                    include: compile_pattern(&mapping.source_kind, mapping.include_pattern.as_deref()),
                    exclude: compile_pattern(&mapping.source_kind, mapping.exclude_pattern.as_deref()),
                },
            );
        }

        MappingPolicy { mappings }
    }
}

fn compile_pattern(source_kind: &str, pattern: Option<&str>) -> Option<Regex> {
    let pattern = pattern?;
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(
                source_kind = %source_kind,
                pattern = %pattern,
                error = %e,
                "Invalid name pattern in mapping, ignoring it"
            );
            None
        }
    }
}

/// A mapping entry with its kind resolved and patterns compiled.
#[derive(Debug, Clone)]
pub struct CompiledMapping {
    /// Resource type
    pub source_kind: String,
    /// Target component kind
    pub component_kind: ComponentKind,
    /// Resource attribute → component property
    pub attribute_mapping: BTreeMap<String, String>,
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl CompiledMapping {
    /// Check a resource name against the include/exclude patterns.
    ///
    /// Exclude wins over include.
    #[must_use]
    pub fn accepts_name(&self, name: &str) -> bool {
        if self.exclude.as_ref().is_some_and(|re| re.is_match(name)) {
            return false;
        }
        self.include.as_ref().is_none_or(|re| re.is_match(name))
    }

    /// Component properties renamed from the resource's attributes.
    ///
    /// Attributes the resource does not have are skipped, so the caller's
    /// kind defaults stay in place for them.
    #[must_use]
    pub fn map_attributes(&self, resource: &SourceResource) -> Properties {
        self.attribute_mapping
            .iter()
            .filter_map(|(from, to)| {
                resource
                    .attribute(from)
                    .map(|value| (to.clone(), value.to_json()))
            })
            .collect()
    }
}

/// A compiled policy.
#[derive(Debug, Clone, Default)]
pub struct MappingPolicy {
    mappings: HashMap<String, CompiledMapping>,
}

impl MappingPolicy {
    /// The mapping for a resource kind.
    #[must_use]
    pub fn mapping_for(&self, kind: &str) -> Option<&CompiledMapping> {
        self.mappings.get(kind)
    }

    /// Number of usable mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Returns true if nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// The resource kinds worth extracting.
    #[must_use]
    pub fn interesting_kinds(&self) -> KindSelection {
        KindSelection::only(self.mappings.keys().cloned())
    }

    /// Check whether a resource survives the policy.
    #[must_use]
    pub fn retains(&self, resource: &SourceResource) -> bool {
        self.mapping_for(&resource.kind)
            .is_some_and(|mapping| mapping.accepts_name(&resource.name))
    }

    /// Keep only the resources the policy retains.
    #[must_use]
    pub fn retain(&self, resources: Vec<SourceResource>) -> Vec<SourceResource> {
        let before = resources.len();
        let kept: Vec<_> = resources.into_iter().filter(|r| self.retains(r)).collect();
        tracing::debug!(before, after = kept.len(), "Applied mapping policy");
        kept
    }
}
