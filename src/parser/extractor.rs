//! Resource extraction: structured parse, regex fallback, flattening.

use crate::parser::{collect_references, fallback, parser_for, KindSelection, RawDeclaration};
use crate::types::{AttributeValue, Attributes, SourceResource};

use dashmap::DashMap;
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Extracts typed resource declarations from declaration file contents.
#[derive(Debug, Clone, Default)]
pub struct ResourceExtractor {
    selection: KindSelection,
}

impl ResourceExtractor {
    /// Create an extractor for the given kinds.
    #[must_use]
    pub fn new(selection: KindSelection) -> Self {
        Self { selection }
    }

    /// The kinds this extractor keeps.
    #[must_use]
    pub fn selection(&self) -> &KindSelection {
        &self.selection
    }

    /// Extract resources from a single file.
    ///
    /// The structured parser for the file's syntax runs first. When it
    /// fails or finds no resources, the regex fallback runs instead. This
    /// never fails; unreadable content yields an empty list.
    #[must_use]
    pub fn extract(&self, content: &str, file_path: &Path) -> Vec<SourceResource> {
        match parser_for(file_path).parse_declarations(content, file_path, &self.selection) {
            Ok(declarations) if !declarations.is_empty() => declarations
                .into_iter()
                .map(|declaration| into_resource(declaration, file_path))
                .collect(),
            Ok(_) => {
                tracing::debug!(
                    file = %file_path.display(),
                    "Structured parse found no resources, trying regex fallback"
                );
                fallback::resources(content, file_path, &self.selection)
            }
            Err(e) => {
                tracing::debug!(
                    file = %file_path.display(),
                    error = %e,
                    "Structured parse failed, trying regex fallback"
                );
                fallback::resources(content, file_path, &self.selection)
            }
        }
    }

    /// Extract resources from many files in parallel.
    ///
    /// Resources are keyed by id; when two files declare the same id the
    /// declaration from the lexicographically smaller path wins. The result
    /// is sorted by id, so it does not depend on the order of `files`.
    #[must_use]
    pub fn extract_files(&self, files: &[(PathBuf, String)]) -> Vec<SourceResource> {
        let by_id: DashMap<String, SourceResource> = DashMap::new();

        files.par_iter().for_each(|(path, content)| {
            for resource in self.extract(content, path) {
                by_id
                    .entry(resource.id.clone())
                    .and_modify(|existing| {
                        if resource.source_file < existing.source_file {
                            tracing::warn!(
                                id = %resource.id,
                                kept = %resource.source_file.display(),
                                dropped = %existing.source_file.display(),
                                "Duplicate resource declaration"
                            );
                            *existing = resource.clone();
                        } else if resource.source_file != existing.source_file {
                            tracing::warn!(
                                id = %resource.id,
                                kept = %existing.source_file.display(),
                                dropped = %resource.source_file.display(),
                                "Duplicate resource declaration"
                            );
                        }
                    })
                    .or_insert(resource);
            }
        });

        let mut resources: Vec<SourceResource> = by_id.into_iter().map(|(_, r)| r).collect();
        resources.sort_by(|a, b| a.id.cmp(&b.id));

        tracing::debug!(
            files = files.len(),
            resources = resources.len(),
            "Extracted resources"
        );

        resources
    }
}

fn into_resource(declaration: RawDeclaration, file_path: &Path) -> SourceResource {
    let mut resource = SourceResource::new(declaration.kind, declaration.name, file_path);
    resource.attributes = flatten(&declaration.body);

    let mut dependencies = BTreeSet::new();
    let mut strings = Vec::new();
    for value in resource.attributes.values() {
        value.collect_strings(&mut strings);
    }
    for text in strings {
        collect_references(text, &mut dependencies);
    }
    dependencies.remove(&resource.id);
    resource.dependencies = dependencies;

    resource
}

/// Flatten a nested attribute tree into dot-joined keys.
pub(crate) fn flatten(body: &Map<String, Value>) -> Attributes {
    let mut out = Attributes::new();
    for (key, value) in body {
        flatten_into(key, value, &mut out);
    }
    out
}

fn flatten_into(key: &str, value: &Value, out: &mut Attributes) {
    match value {
        Value::Object(map) => {
            for (child, nested) in map {
                flatten_into(&format!("{key}.{child}"), nested, out);
            }
        }
        other => {
            if let Some(value) = to_attribute(other) {
                out.insert(key.to_string(), value);
            }
        }
    }
}

fn to_attribute(value: &Value) -> Option<AttributeValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(AttributeValue::Bool(*b)),
        Value::Number(n) => Some(AttributeValue::String(n.to_string())),
        Value::String(s) => Some(AttributeValue::String(s.clone())),
        Value::Array(items) => Some(AttributeValue::List(
            items
                .iter()
                .filter_map(|item| match item {
                    // Objects inside lists are kept whole, as JSON text
                    Value::Object(_) => Some(AttributeValue::String(item.to_string())),
                    other => to_attribute(other),
                })
                .collect(),
        )),
        Value::Object(_) => Some(AttributeValue::String(value.to_string())),
    }
}
