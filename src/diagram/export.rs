//! Diagram export functionality.
//!
//! This module renders a [`Diagram`] in the supported output formats.
//! JSON and YAML carry the full
//! [`DiagramDocument`](crate::diagram::DiagramDocument); DOT and Mermaid are
//! views for humans where areas become nested clusters/subgraphs and
//! containment edges are implied by nesting.

use crate::diagram::component::{Component, ComponentId};
use crate::diagram::model::{Diagram, RelationshipKind};
use crate::error::Result;
use crate::types::DiagramFormat;

/// Export a diagram to the specified format.
///
/// # Supported Formats
///
/// - **JSON**: the diagram document, for programmatic access
/// - **YAML**: the same document in YAML
/// - **DOT**: Graphviz DOT format for visualization
/// - **Mermaid**: Mermaid flowchart syntax for documentation
///
/// # Example
///
/// ```rust
/// use tfdiagram::diagram::{export_diagram, ComponentRegistry, Diagram};
/// use tfdiagram::types::DiagramFormat;
///
/// let diagram = Diagram::new("empty", ComponentRegistry::shared());
/// let dot = export_diagram(&diagram, DiagramFormat::Dot, true).unwrap();
/// assert!(dot.starts_with("digraph"));
/// ```
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_diagram(diagram: &Diagram, format: DiagramFormat, pretty: bool) -> Result<String> {
    match format {
        DiagramFormat::Json => export_json(diagram, pretty),
        DiagramFormat::Yaml => export_yaml(diagram),
        DiagramFormat::Dot => Ok(export_dot(diagram)),
        DiagramFormat::Mermaid => Ok(export_mermaid(diagram)),
    }
}

fn export_json(diagram: &Diagram, pretty: bool) -> Result<String> {
    let document = diagram.to_document();
    let rendered = if pretty {
        serde_json::to_string_pretty(&document)
    } else {
        serde_json::to_string(&document)
    };
    rendered.map_err(|e| {
        crate::err!(Export {
            message: format!("Failed to serialize diagram to JSON: {e}"),
        })
    })
}

fn export_yaml(diagram: &Diagram) -> Result<String> {
    serde_yaml::to_string(&diagram.to_document()).map_err(|e| {
        crate::err!(Export {
            message: format!("Failed to serialize diagram to YAML: {e}"),
        })
    })
}

/// Export to Graphviz DOT format.
fn export_dot(diagram: &Diagram) -> String {
    let mut dot = String::new();
    dot.push_str(&format!("digraph \"{}\" {{\n", escape_dot_string(diagram.name())));
    dot.push_str("    rankdir=TB;\n");
    dot.push_str("    compound=true;\n");
    dot.push_str("    node [shape=box, style=rounded];\n\n");

    write_dot_component(diagram, diagram.root_id(), 1, &mut dot);
    dot.push('\n');

    for relationship in diagram.relationships() {
        let style = match relationship.kind {
            RelationshipKind::Contains => continue,
            RelationshipKind::ConnectsTo => "style=solid, color=blue",
            RelationshipKind::DependsOn => "style=dashed, color=gray",
            RelationshipKind::References => "style=dotted, color=gray",
        };
        let from_id = node_id(relationship.source_id);
        let to_id = node_id(relationship.target_id);
        let label = relationship
            .label
            .as_deref()
            .map_or_else(|| relationship.kind.to_string(), ToString::to_string);
        dot.push_str(&format!(
            "    {from_id} -> {to_id} [{style}, label=\"{}\"];\n",
            escape_dot_string(&label)
        ));
    }

    dot.push_str("}\n");
    dot
}

fn write_dot_component(diagram: &Diagram, id: ComponentId, depth: usize, out: &mut String) {
    let Some(component) = diagram.component(id) else {
        return;
    };
    let indent = "    ".repeat(depth);
    let label = escape_dot_string(&format!("{}\\n({})", component.name, component.kind));

    if component.is_area() {
        out.push_str(&format!("{indent}subgraph cluster_{} {{\n", node_id(id)));
        out.push_str(&format!("{indent}    label=\"{label}\";\n"));
        out.push_str(&format!("{indent}    style=dashed;\n"));
        // Anchor node so edges can point at the cluster
        out.push_str(&format!(
            "{indent}    {} [label=\"{label}\", shape=plaintext];\n",
            node_id(id)
        ));
        for child in component.children() {
            write_dot_component(diagram, *child, depth + 1, out);
        }
        out.push_str(&format!("{indent}}}\n"));
    } else {
        out.push_str(&format!(
            "{indent}{} [label=\"{label}\", fillcolor={}, style=\"rounded,filled\"];\n",
            node_id(id),
            dot_fill(component)
        ));
    }
}

fn dot_fill(component: &Component) -> &'static str {
    use crate::diagram::component::ComponentKind::*;
    match component.kind {
        Ec2Instance | LambdaFunction => "lightsalmon",
        RdsInstance | DynamoDbTable => "lightblue",
        S3Bucket => "lightgreen",
        LoadBalancer | ApiGateway | InternetGateway | NatGateway => "khaki",
        Region | Vpc | Subnet | SecurityGroup => "white",
    }
}

/// Export to Mermaid flowchart format.
fn export_mermaid(diagram: &Diagram) -> String {
    let mut mermaid = String::new();
    mermaid.push_str("flowchart TD\n");
    mermaid.push_str(&format!("    %% {}\n\n", escape_mermaid_string(diagram.name())));

    write_mermaid_component(diagram, diagram.root_id(), 1, &mut mermaid);
    mermaid.push('\n');

    for relationship in diagram.relationships() {
        let arrow = match relationship.kind {
            // Nesting already shows containment
            RelationshipKind::Contains => continue,
            RelationshipKind::ConnectsTo => "-->",
            RelationshipKind::DependsOn => "-.->",
            RelationshipKind::References => "-.-",
        };
        let from_id = node_id(relationship.source_id);
        let to_id = node_id(relationship.target_id);
        match &relationship.label {
            Some(label) => mermaid.push_str(&format!(
                "    {from_id} {arrow}|{}| {to_id}\n",
                escape_mermaid_string(label)
            )),
            None => mermaid.push_str(&format!("    {from_id} {arrow} {to_id}\n")),
        }
    }

    mermaid
}

fn write_mermaid_component(diagram: &Diagram, id: ComponentId, depth: usize, out: &mut String) {
    let Some(component) = diagram.component(id) else {
        return;
    };
    let indent = "    ".repeat(depth);
    let label = escape_mermaid_string(&format!("{} ({})", component.name, component.kind));

    if component.is_area() {
        out.push_str(&format!("{indent}subgraph {}[\"{label}\"]\n", node_id(id)));
        for child in component.children() {
            write_mermaid_component(diagram, *child, depth + 1, out);
        }
        out.push_str(&format!("{indent}end\n"));
    } else {
        out.push_str(&format!("{indent}{}[\"{label}\"]\n", node_id(id)));
    }
}

/// Graph node id for a component.
fn node_id(id: ComponentId) -> String {
    format!("c{}", id.simple())
}

/// Escape a string for use in DOT labels.
fn escape_dot_string(s: &str) -> String {
    s.replace('"', "\\\"").replace('\n', "\\n")
}

/// Escape a string for use in Mermaid labels.
fn escape_mermaid_string(s: &str) -> String {
    s.replace('"', "'").replace('\n', " ")
}
