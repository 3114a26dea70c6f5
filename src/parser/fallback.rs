//! Regex-based fallback extraction.
//!
//! Used when the structured parse rejects a file or finds no resources in
//! it. Everything here is best effort: values that cannot be read with
//! confidence are left out, and nothing in this module returns an error.

use crate::parser::{collect_references, parse_module_source, KindSelection};
use crate::types::{AttributeValue, Attributes, ModuleRef, SourceResource};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

// `resource "kind" "name" {` or `kind "name" {`
static RESOURCE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*(?:resource[ \t]+"([A-Za-z0-9_-]+)"|"?([A-Za-z0-9_-]+)"?)[ \t]+"([^"]+)"[ \t]*\{"#)
        .expect("Invalid regex")
});

static MODULE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*module[ \t]+"([^"]+)"[ \t]*\{"#).expect("Invalid regex")
});

static SOURCE_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*source[ \t]*=[ \t]*"([^"]+)""#).expect("Invalid regex")
});

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[ \t]*"?([A-Za-z_][A-Za-z0-9_.:/-]*)"?[ \t]*=[ \t]*(.*?)[ \t]*,?[ \t]*$"#)
        .expect("Invalid regex")
});

static TAGS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*tags[ \t]*=?[ \t]*\{").expect("Invalid regex"));

/// Extract resources from `content` with regular expressions.
pub(crate) fn resources(content: &str, file_path: &Path, selection: &KindSelection) -> Vec<SourceResource> {
    let mut found = Vec::new();

    for caps in RESOURCE_HEADER.captures_iter(content) {
        let (kind, keyed) = match (caps.get(1), caps.get(2)) {
            (Some(kind), _) => (kind.as_str(), false),
            (None, Some(kind)) => (kind.as_str(), true),
            (None, None) => continue,
        };
        let accepted = if keyed {
            selection.accepts_kind_keyed(kind)
        } else {
            selection.contains(kind)
        };
        if !accepted {
            continue;
        }

        let name = &caps[3];
        let header_end = caps.get(0).map_or(0, |m| m.end());
        let Some(body) = block_body(content, header_end) else {
            tracing::debug!(
                file = %file_path.display(),
                kind = %kind,
                name = %name,
                "Unbalanced block, skipping"
            );
            continue;
        };

        let mut resource = SourceResource::new(kind, name, file_path);
        resource.attributes = top_level_attributes(body);
        resource.attributes.extend(tag_attributes(body));

        let mut dependencies = BTreeSet::new();
        collect_references(body, &mut dependencies);
        dependencies.remove(&resource.id);
        resource.dependencies = dependencies;

        found.push(resource);
    }

    found
}

/// Extract module references from `content` with regular expressions.
pub(crate) fn module_refs(content: &str, file_path: &Path) -> Vec<ModuleRef> {
    MODULE_HEADER
        .captures_iter(content)
        .filter_map(|caps| {
            let header_end = caps.get(0)?.end();
            let body = block_body(content, header_end)?;
            let raw_source = SOURCE_ATTRIBUTE.captures(body)?.get(1)?.as_str().to_string();
            Some(ModuleRef {
                name: caps[1].to_string(),
                source: parse_module_source(&raw_source),
                raw_source,
                file_path: file_path.to_path_buf(),
            })
        })
        .collect()
}

/// Return the text between the `{` ending at `start` and its matching `}`.
///
/// Braces inside quoted strings and `#` / `//` comments are ignored.
fn block_body(content: &str, start: usize) -> Option<&str> {
    let bytes = content.as_bytes();
    let mut depth = 1usize;
    let mut i = start;
    let mut in_string = false;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            match b {
                b'\\' => i += 1,
                b'"' => in_string = false,
                _ => {}
            }
        } else {
            match b {
                b'"' => in_string = true,
                b'#' => i = skip_line(bytes, i),
                b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line(bytes, i),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return content.get(start..i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }

    None
}

fn skip_line(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| from + offset)
}

/// Remove everything nested inside `{ }`, keeping newlines.
///
/// Brackets are left alone so single-line lists survive for [`parse_value`].
fn strip_nested(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for c in body.chars() {
        if in_string {
            if depth == 0 {
                out.push(c);
            }
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                if depth == 0 {
                    out.push(c);
                }
            }
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '\n' => out.push(c),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }

    out
}

/// Collect `key = value` pairs at the top level of a block body.
fn top_level_attributes(body: &str) -> Attributes {
    strip_nested(body)
        .lines()
        .filter_map(|line| {
            let caps = ASSIGNMENT.captures(line)?;
            let value = parse_value(caps.get(2)?.as_str())?;
            Some((caps[1].to_string(), value))
        })
        .collect()
}

/// Collect `tags { Key = "v" }` / `tags = { ... }` entries as `tags.Key`.
fn tag_attributes(body: &str) -> Attributes {
    let mut attributes = Attributes::new();
    for m in TAGS_BLOCK.find_iter(body) {
        let Some(tags) = block_body(body, m.end()) else {
            continue;
        };
        for line in tags.lines() {
            if let Some(caps) = ASSIGNMENT.captures(line) {
                if let Some(value) = caps.get(2).and_then(|v| parse_value(v.as_str())) {
                    attributes.insert(format!("tags.{}", &caps[1]), value);
                }
            }
        }
    }
    attributes
}

/// Parse a single-line value, returning `None` when it cannot be read with confidence.
fn parse_value(raw: &str) -> Option<AttributeValue> {
    let raw = strip_trailing_comment(raw);
    if raw.is_empty() {
        return None;
    }

    if let Some(inner) = raw.strip_prefix('"') {
        let inner = inner.strip_suffix('"')?;
        return Some(AttributeValue::String(inner.replace("\\\"", "\"")));
    }

    if let Some(inner) = raw.strip_prefix('[') {
        let inner = inner.strip_suffix(']')?;
        let items = inner
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .filter_map(parse_value)
            .collect();
        return Some(AttributeValue::List(items));
    }

    match raw {
        "true" => Some(AttributeValue::Bool(true)),
        "false" => Some(AttributeValue::Bool(false)),
        _ if raw.ends_with('[') || raw.ends_with('(') || raw.starts_with("<<") => None,
        _ => Some(AttributeValue::String(raw.to_string())),
    }
}

/// Cut a `#` or `//` comment that starts outside quoted strings.
fn strip_trailing_comment(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    let mut in_string = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_string => i += 1,
            b'"' => in_string = !in_string,
            b'#' if !in_string => return raw[..i].trim(),
            b'/' if !in_string && bytes.get(i + 1) == Some(&b'/') => return raw[..i].trim(),
            _ => {}
        }
        i += 1;
    }

    raw.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_extracts_attributes_and_tags() {
        let content = r#"
resource "aws_instance" "web" {
  ami           = "ami-123456"
  instance_type = t3.micro
  monitoring    = true
  subnet_id     = aws_subnet.public.id

  tags {
    Name = "web-server"
    Env  = "prod"
  }
}
"#;
        let resources = resources(content, Path::new("main.tf"), &KindSelection::All);
        assert_eq!(resources.len(), 1);

        let web = &resources[0];
        assert_eq!(web.id, "aws_instance.web");
        assert_eq!(web.attribute("ami"), Some(&AttributeValue::from("ami-123456")));
        assert_eq!(web.attribute("instance_type"), Some(&AttributeValue::from("t3.micro")));
        assert_eq!(web.attribute("monitoring"), Some(&AttributeValue::Bool(true)));
        assert_eq!(web.attribute("tags.Name"), Some(&AttributeValue::from("web-server")));
        assert_eq!(web.attribute("tags.Env"), Some(&AttributeValue::from("prod")));
        assert!(web.attribute("Name").is_none());
        assert!(web.dependencies.contains("aws_subnet.public"));
    }

    #[test]
    fn test_fallback_kind_keyed_blocks() {
        let content = r#"
boundary_kind "main" {
  cidr = "10.0.0.0/16"
}
subdivision_kind "sub" {
  parent_id = boundary_kind.main.id
}
"#;
        let selection = KindSelection::only(["boundary_kind", "subdivision_kind"]);
        let resources = resources(content, Path::new("main.tf"), &selection);
        assert_eq!(resources.len(), 2);
        assert!(resources[1].dependencies.contains("boundary_kind.main"));
    }

    #[test]
    fn test_fallback_omits_unreadable_values() {
        let content = r#"
resource "aws_security_group" "web" {
  name = "web"
  ingress_cidrs = [
    "0.0.0.0/0",
  ]
  description = <<EOT
multi
EOT
  ports = ["80", "443"]
}
"#;
        let resources = resources(content, Path::new("sg.tf"), &KindSelection::All);
        let sg = &resources[0];
        assert!(sg.attribute("ingress_cidrs").is_none());
        assert!(sg.attribute("description").is_none());
        assert_eq!(
            sg.attribute("ports"),
            Some(&AttributeValue::List(vec![
                AttributeValue::from("80"),
                AttributeValue::from("443")
            ]))
        );
    }

    #[test]
    fn test_fallback_values_with_trailing_comments() {
        let content = r#"
resource "aws_instance" "web" {
  ami           = "ami-123" # ubuntu
  instance_type = "t3.micro" // burstable
  user_data     = "echo #1 // not a comment"
  monitoring    = false # off
  ports         = ["80", "443"] # http
}
"#;
        let resources = resources(content, Path::new("main.tf"), &KindSelection::All);
        let web = &resources[0];
        assert_eq!(web.attribute("ami"), Some(&AttributeValue::from("ami-123")));
        assert_eq!(web.attribute("instance_type"), Some(&AttributeValue::from("t3.micro")));
        assert_eq!(
            web.attribute("user_data"),
            Some(&AttributeValue::from("echo #1 // not a comment"))
        );
        assert_eq!(web.attribute("monitoring"), Some(&AttributeValue::Bool(false)));
        assert_eq!(
            web.attribute("ports"),
            Some(&AttributeValue::List(vec![
                AttributeValue::from("80"),
                AttributeValue::from("443")
            ]))
        );
    }

    #[test]
    fn test_strip_nested_keeps_brackets() {
        let stripped = strip_nested("a = [\"x\"]\nb {\n  c = 1\n}\n");
        assert!(stripped.contains("a = [\"x\"]"));
        assert!(!stripped.contains("c = 1"));
    }

    #[test]
    fn test_fallback_skips_unselected_and_unbalanced() {
        let content = r#"
variable "region" {
  default = "us-east-1"
}
resource "aws_vpc" "broken" {
  cidr_block = "10.0.0.0/16"
"#;
        assert!(resources(content, Path::new("x.tf"), &KindSelection::All).is_empty());
    }

    #[test]
    fn test_fallback_module_refs() {
        let content = r#"
module "network" {
  source = "../network"
  cidr   = var.cidr
}
"#;
        let refs = module_refs(content, Path::new("main.tf"));
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "network");
        assert_eq!(refs[0].raw_source, "../network");
    }

    #[test]
    fn test_block_body_ignores_braces_in_strings() {
        let content = r#"x { a = "}" b = 1 }"#;
        assert_eq!(block_body(content, 3), Some(r#" a = "}" b = 1 "#));
    }
}
