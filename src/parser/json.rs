//! JSON declaration parser (`.tf.json`).
//!
//! Two layouts are accepted:
//!
//! ```json
//! { "resource": { "aws_vpc": { "main": { "cidr_block": "10.0.0.0/16" } } } }
//! ```
//!
//! and the kind-keyed layout without the `resource` wrapper:
//!
//! ```json
//! { "aws_vpc": { "main": { "cidr_block": "10.0.0.0/16" } } }
//! ```

use crate::error::Result;
use crate::parser::{parse_module_source, DeclarationParser, KindSelection, RawDeclaration};
use crate::types::ModuleRef;

use serde_json::{Map, Value};
use std::path::Path;

/// Parser for Terraform JSON syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl JsonParser {
    fn parse_root(content: &str, file_path: &Path) -> Result<Map<String, Value>> {
        match serde_json::from_str::<Value>(content) {
            Ok(Value::Object(root)) => Ok(root),
            Ok(_) => Err(crate::err!(JsonParse {
                file: file_path.to_path_buf(),
                message: "top-level value is not an object".to_string(),
            })),
            Err(e) => Err(crate::err!(JsonParse {
                file: file_path.to_path_buf(),
                message: e.to_string(),
            })),
        }
    }
}

impl DeclarationParser for JsonParser {
    fn parse_declarations(
        &self,
        content: &str,
        file_path: &Path,
        selection: &KindSelection,
    ) -> Result<Vec<RawDeclaration>> {
        let root = Self::parse_root(content, file_path)?;
        let mut declarations = Vec::new();

        if let Some(Value::Object(resources)) = root.get("resource") {
            for (kind, by_name) in resources {
                if selection.contains(kind) {
                    push_named(kind, by_name, &mut declarations);
                }
            }
        }

        for (kind, by_name) in &root {
            if selection.accepts_kind_keyed(kind) {
                push_named(kind, by_name, &mut declarations);
            }
        }

        Ok(declarations)
    }

    fn parse_module_refs(&self, content: &str, file_path: &Path) -> Result<Vec<ModuleRef>> {
        let root = Self::parse_root(content, file_path)?;
        let Some(Value::Object(modules)) = root.get("module") else {
            return Ok(Vec::new());
        };

        Ok(modules
            .iter()
            .filter_map(|(name, body)| {
                let raw_source = merged_body(body).get("source")?.as_str()?.to_string();
                Some(ModuleRef {
                    name: name.clone(),
                    source: parse_module_source(&raw_source),
                    raw_source,
                    file_path: file_path.to_path_buf(),
                })
            })
            .collect())
    }
}

fn push_named(kind: &str, by_name: &Value, out: &mut Vec<RawDeclaration>) {
    let Value::Object(by_name) = by_name else {
        return;
    };
    for (name, body) in by_name {
        out.push(RawDeclaration {
            kind: kind.to_string(),
            name: name.clone(),
            body: merged_body(body),
        });
    }
}

/// Terraform JSON allows a block body to be an object or a list of objects.
fn merged_body(body: &Value) -> Map<String, Value> {
    match body {
        Value::Object(map) => map.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .flat_map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect(),
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_wrapper_shape() {
        let content = r#"{
  "resource": {
    "aws_vpc": { "main": { "cidr_block": "10.0.0.0/16" } },
    "aws_subnet": { "a": { "vpc_id": "${aws_vpc.main.id}" } }
  }
}"#;
        let declarations = JsonParser
            .parse_declarations(content, Path::new("main.tf.json"), &KindSelection::All)
            .unwrap();
        assert_eq!(declarations.len(), 2);
        assert!(declarations.iter().any(|d| d.kind == "aws_subnet" && d.name == "a"));
    }

    #[test]
    fn test_kind_keyed_shape() {
        let content = r#"{
  "aws_vpc": { "main": { "cidr_block": "10.0.0.0/16" } },
  "variable": { "region": { "default": "us-east-1" } }
}"#;
        let declarations = JsonParser
            .parse_declarations(content, Path::new("main.tf.json"), &KindSelection::All)
            .unwrap();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].kind, "aws_vpc");
        assert_eq!(declarations[0].body["cidr_block"], "10.0.0.0/16");
    }

    #[test]
    fn test_module_refs_from_json() {
        let content = r#"{ "module": { "network": { "source": "./network" } } }"#;
        let refs = JsonParser
            .parse_module_refs(content, Path::new("main.tf.json"))
            .unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].raw_source, "./network");
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(JsonParser
            .parse_declarations("{ not json", Path::new("x.tf.json"), &KindSelection::All)
            .is_err());
    }
}
