//! Human-readable terminal output.

use crate::config::Config;
use crate::converter::ConversionResult;
use crate::diagram::RelationshipKind;
use crate::mapping::MappingPolicy;
use crate::resolver::ResolvedFiles;
use crate::types::SourceResource;

use colored::Colorize;
use comfy_table::{Cell, Color, ContentArrangement, Table};

/// Text reporter for CLI output.
pub struct TextReporter {
    /// Whether to use colors
    use_colors: bool,
}

impl TextReporter {
    /// Create a new text reporter.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            use_colors: config.output.colored,
        }
    }

    /// Summary of a finished conversion.
    #[must_use]
    pub fn conversion_summary(&self, result: &ConversionResult) -> String {
        let diagram = &result.diagram;
        let mut output = self.section("Conversion");

        let rows = [
            ("Files parsed", result.resolved.len().saturating_sub(result.skipped_files.len())),
            ("Files skipped", result.skipped_files.len()),
            ("Resources", result.resources.len()),
            ("Components", diagram.len().saturating_sub(1)),
            (
                "Containment",
                diagram.relationships_of_kind(RelationshipKind::Contains).count(),
            ),
            (
                "Other relationships",
                diagram
                    .relationships()
                    .iter()
                    .filter(|r| r.kind != RelationshipKind::Contains)
                    .count(),
            ),
        ];
        for (label, count) in rows {
            let count = if self.use_colors {
                count.to_string().bright_white().bold().to_string()
            } else {
                count.to_string()
            };
            output.push_str(&format!("  {label:<20} {count}\n"));
        }

        if result.resolved.has_cycles() {
            output.push_str(&self.warning("module references form a cycle"));
        }
        for path in &result.skipped_files {
            output.push_str(&self.warning(&format!("could not read {}", path.display())));
        }

        output
    }

    /// Table of extracted resources and the component kind each maps to.
    #[must_use]
    pub fn resources_table(&self, resources: &[SourceResource], policy: &MappingPolicy) -> String {
        let mut output = self.section("Resources");

        if resources.is_empty() {
            output.push_str("  No mapped resources found\n");
            return output;
        }

        let mut table = Table::new();
        table
            .load_preset(comfy_table::presets::UTF8_BORDERS_ONLY)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Resource", "Component", "References", "File"]);

        for resource in resources {
            let component = policy
                .mapping_for(&resource.kind)
                .map_or_else(|| "-".to_string(), |m| m.component_kind.to_string());
            let component_cell = if self.use_colors {
                Cell::new(component).fg(Color::Cyan)
            } else {
                Cell::new(component)
            };
            let references = resource
                .dependencies
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");

            table.add_row(vec![
                Cell::new(&resource.id),
                component_cell,
                Cell::new(references),
                Cell::new(resource.source_file.display()),
            ]);
        }

        output.push_str(&table.to_string());
        output.push('\n');
        output
    }

    /// The module tree of a resolution.
    #[must_use]
    pub fn module_tree(&self, resolved: &ResolvedFiles) -> String {
        let mut output = self.section("Modules");
        output.push_str(&resolved.tree().to_string());

        let unresolved = resolved.unresolved().count();
        let footer = format!(
            "\n  {} files, {} unresolved module sources",
            resolved.len(),
            unresolved
        );
        if self.use_colors {
            output.push_str(&footer.dimmed().to_string());
        } else {
            output.push_str(&footer);
        }
        output.push('\n');

        if resolved.has_cycles() {
            output.push_str(&self.warning("module references form a cycle"));
        }
        output
    }

    fn section(&self, title: &str) -> String {
        let title = if self.use_colors {
            title.bright_cyan().bold().to_string()
        } else {
            title.to_string()
        };
        format!("\n{title}\n{}\n", "-".repeat(60))
    }

    fn warning(&self, message: &str) -> String {
        if self.use_colors {
            format!("  {} {message}\n", "warning:".yellow().bold())
        } else {
            format!("  warning: {message}\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingConfig;

    fn plain() -> TextReporter {
        let mut config = Config::default();
        config.output.colored = false;
        TextReporter::new(&config)
    }

    #[test]
    fn test_resources_table_lists_component_kind() {
        let policy = MappingConfig::default_policy().compile();
        let resources = vec![
            SourceResource::new("aws_vpc", "main", "main.tf"),
            SourceResource::new("aws_subnet", "a", "main.tf").with_dependency("aws_vpc.main"),
        ];

        let output = plain().resources_table(&resources, &policy);
        assert!(output.contains("aws_subnet.a"));
        assert!(output.contains("subnet"));
        assert!(output.contains("aws_vpc.main"));
    }

    #[test]
    fn test_empty_resources_table() {
        let policy = MappingConfig::default_policy().compile();
        let output = plain().resources_table(&[], &policy);
        assert!(output.contains("No mapped resources found"));
    }
}
