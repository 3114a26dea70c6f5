//! Native HCL parser implementation.
//!
//! This module provides the structured parse of `.tf` files using the
//! `hcl-rs` crate. Expressions are converted into a JSON tree so that both
//! syntaxes share one flattening routine.

use crate::error::Result;
use crate::parser::{parse_module_source, DeclarationParser, KindSelection, RawDeclaration};
use crate::types::ModuleRef;

use hcl::{Block, Body, Expression};
use serde_json::{Map, Value};
use std::path::Path;

/// HCL parser for `.tf` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct HclParser;

impl HclParser {
    fn parse_body(content: &str, file_path: &Path) -> Result<Body> {
        hcl::from_str(content).map_err(|e| {
            crate::err!(HclParse {
                file: file_path.to_path_buf(),
                message: e.to_string(),
            })
        })
    }
}

impl DeclarationParser for HclParser {
    fn parse_declarations(
        &self,
        content: &str,
        file_path: &Path,
        selection: &KindSelection,
    ) -> Result<Vec<RawDeclaration>> {
        let body = Self::parse_body(content, file_path)?;
        let mut declarations = Vec::new();

        for block in body.blocks() {
            let identifier = block.identifier.as_str();
            let labels: Vec<&str> = block.labels.iter().map(|l| l.as_str()).collect();

            let (kind, name) = match (identifier, labels.as_slice()) {
                ("resource", [kind, name]) if selection.contains(kind) => (*kind, *name),
                (kind, [name]) if selection.accepts_kind_keyed(kind) => (kind, *name),
                _ => continue,
            };

            declarations.push(RawDeclaration {
                kind: kind.to_string(),
                name: name.to_string(),
                body: body_to_json(&block.body),
            });
        }

        tracing::trace!(
            file = %file_path.display(),
            declarations = declarations.len(),
            "Parsed HCL declarations"
        );

        Ok(declarations)
    }

    fn parse_module_refs(&self, content: &str, file_path: &Path) -> Result<Vec<ModuleRef>> {
        let body = Self::parse_body(content, file_path)?;

        Ok(body
            .blocks()
            .filter(|block| block.identifier.as_str() == "module")
            .filter_map(|block| parse_module_block(block, file_path))
            .collect())
    }
}

/// Parse a module block into a `ModuleRef`.
fn parse_module_block(block: &Block, file_path: &Path) -> Option<ModuleRef> {
    let name = block
        .labels
        .first()
        .map_or_else(|| "unnamed".to_string(), |l| l.as_str().to_string());

    let Some(raw_source) = get_string_attribute(&block.body, "source") else {
        tracing::warn!(
            module = %name,
            file = %file_path.display(),
            "Module block missing source attribute"
        );
        return None;
    };

    Some(ModuleRef {
        name,
        source: parse_module_source(&raw_source),
        raw_source,
        file_path: file_path.to_path_buf(),
    })
}

/// Get a string attribute from a body.
fn get_string_attribute(body: &Body, key: &str) -> Option<String> {
    body.attributes()
        .find(|attr| attr.key.as_str() == key)
        .and_then(|attr| match expression_to_json(&attr.expr) {
            Value::String(s) => Some(s),
            _ => None,
        })
}

/// Convert a block body into a nested JSON object.
///
/// Nested blocks become objects under their identifier (and labels);
/// repeated blocks with the same identifier become a list.
fn body_to_json(body: &Body) -> Map<String, Value> {
    let mut map = Map::new();

    for attr in body.attributes() {
        map.insert(attr.key.as_str().to_string(), expression_to_json(&attr.expr));
    }

    for block in body.blocks() {
        let mut value = Value::Object(body_to_json(&block.body));
        for label in block.labels.iter().rev() {
            let mut wrapper = Map::new();
            wrapper.insert(label.as_str().to_string(), value);
            value = Value::Object(wrapper);
        }

        let key = block.identifier.as_str().to_string();
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }

    map
}

/// Convert an expression into a JSON value.
///
/// Literals keep their type (numbers become strings); traversals,
/// function calls and other non-literal expressions are rendered back to
/// their HCL text so reference scanning still sees `aws_vpc.main.id`.
fn expression_to_json(expr: &Expression) -> Value {
    match expr {
        Expression::Null => Value::Null,
        Expression::Bool(b) => Value::Bool(*b),
        Expression::Number(n) => Value::String(n.to_string()),
        Expression::String(s) => Value::String(s.clone()),
        Expression::Array(items) => Value::Array(items.iter().map(expression_to_json).collect()),
        Expression::Object(obj) => Value::Object(
            obj.iter()
                .map(|(key, value)| (object_key_to_string(key), expression_to_json(value)))
                .collect(),
        ),
        Expression::TemplateExpr(template) => Value::String(template.to_string()),
        other => Value::String(other.to_string()),
    }
}

/// Convert an object key to a string.
fn object_key_to_string(key: &hcl::ObjectKey) -> String {
    match key {
        hcl::ObjectKey::Identifier(id) => id.as_str().to_string(),
        hcl::ObjectKey::Expression(expr) => match expression_to_json(expr) {
            Value::String(s) => s,
            other => other.to_string(),
        },
        #[allow(unreachable_patterns)]
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModuleSource;

    fn parse(content: &str) -> Vec<RawDeclaration> {
        HclParser
            .parse_declarations(content, Path::new("test.tf"), &KindSelection::All)
            .unwrap()
    }

    #[test]
    fn test_parse_resource_block() {
        let declarations = parse(
            r#"
resource "aws_vpc" "main" {
  cidr_block           = "10.0.0.0/16"
  enable_dns_hostnames = true

  tags = {
    Name = "main-vpc"
  }
}
"#,
        );

        assert_eq!(declarations.len(), 1);
        let vpc = &declarations[0];
        assert_eq!(vpc.kind, "aws_vpc");
        assert_eq!(vpc.name, "main");
        assert_eq!(vpc.body["cidr_block"], Value::String("10.0.0.0/16".to_string()));
        assert_eq!(vpc.body["enable_dns_hostnames"], Value::Bool(true));
        assert_eq!(vpc.body["tags"]["Name"], Value::String("main-vpc".to_string()));
    }

    #[test]
    fn test_parse_traversal_renders_reference() {
        let declarations = parse(
            r#"
resource "aws_subnet" "public" {
  vpc_id     = aws_vpc.main.id
  cidr_block = "10.0.1.0/24"
}
"#,
        );

        let rendered = declarations[0].body["vpc_id"].as_str().unwrap();
        assert!(rendered.contains("aws_vpc.main.id"));
    }

    #[test]
    fn test_parse_kind_keyed_shape() {
        let declarations = parse(
            r#"
aws_vpc "main" {
  cidr_block = "10.0.0.0/16"
}

variable "region" {
  default = "us-east-1"
}
"#,
        );

        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].kind, "aws_vpc");
    }

    #[test]
    fn test_selection_filters_resource_blocks() {
        let content = r#"
resource "aws_vpc" "main" {}
resource "aws_s3_bucket" "logs" {}
"#;
        let declarations = HclParser
            .parse_declarations(content, Path::new("test.tf"), &KindSelection::only(["aws_vpc"]))
            .unwrap();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].name, "main");
    }

    #[test]
    fn test_repeated_nested_blocks_become_list() {
        let declarations = parse(
            r#"
resource "aws_security_group" "web" {
  ingress {
    from_port = 80
  }
  ingress {
    from_port = 443
  }
}
"#,
        );

        let ingress = declarations[0].body["ingress"].as_array().unwrap();
        assert_eq!(ingress.len(), 2);
        assert_eq!(ingress[1]["from_port"], Value::String("443".to_string()));
    }

    #[test]
    fn test_parse_module_refs() {
        let content = r#"
module "network" {
  source = "./modules/network"
}

module "eks" {
  source  = "terraform-aws-modules/eks/aws"
  version = "~> 19.0"
}

module "broken" {
  name = "no-source"
}
"#;

        let refs = HclParser
            .parse_module_refs(content, Path::new("main.tf"))
            .unwrap();

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "network");
        assert!(matches!(refs[0].source, ModuleSource::Local { .. }));
        assert!(matches!(refs[1].source, ModuleSource::Registry { .. }));
    }

    #[test]
    fn test_parse_invalid_hcl() {
        let result = HclParser.parse_declarations(
            "this is not valid { hcl",
            Path::new("test.tf"),
            &KindSelection::All,
        );
        assert!(result.is_err());
    }
}
