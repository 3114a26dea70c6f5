//! Diagnostic module tree.

use super::ResolvedFiles;

use serde::Serialize;
use std::collections::HashSet;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

/// A module reference that ended its branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedModule {
    /// Module block name
    pub name: String,
    /// Classified source, e.g. `registry:registry.terraform.io/a/b/c`
    pub source: String,
}

/// One file in the module tree.
///
/// A file is expanded the first time it is reached; any later occurrence
/// is a leaf with `cyclic` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleTree {
    /// File path
    pub path: PathBuf,
    /// Module block that led here, `None` for root files
    pub module: Option<String>,
    /// Already expanded elsewhere, children omitted
    pub cyclic: bool,
    /// References that did not resolve to local files
    pub unresolved: Vec<UnresolvedModule>,
    /// Files pulled in by module blocks
    pub children: Vec<ModuleTree>,
}

impl ModuleTree {
    pub(super) fn build(resolved: &ResolvedFiles) -> Self {
        let mut expanded = HashSet::new();
        let children = resolved
            .seeds()
            .iter()
            .filter(|seed| resolved.contains(seed))
            .map(|seed| Self::expand(resolved, seed, None, &mut expanded))
            .collect();

        Self {
            path: resolved.root().to_path_buf(),
            module: None,
            cyclic: false,
            unresolved: Vec::new(),
            children,
        }
    }

    fn expand(
        resolved: &ResolvedFiles,
        path: &Path,
        module: Option<&str>,
        expanded: &mut HashSet<PathBuf>,
    ) -> Self {
        let mut node = Self {
            path: path.to_path_buf(),
            module: module.map(ToString::to_string),
            cyclic: false,
            unresolved: Vec::new(),
            children: Vec::new(),
        };

        if !expanded.insert(path.to_path_buf()) {
            node.cyclic = true;
            return node;
        }

        node.unresolved = resolved
            .unresolved_of(path)
            .iter()
            .map(|module_ref| UnresolvedModule {
                name: module_ref.name.clone(),
                source: module_ref.source.to_string(),
            })
            .collect();

        for (name, target) in resolved.dependencies_of(path) {
            node.children
                .push(Self::expand(resolved, target, Some(name), expanded));
        }

        node
    }

    /// Number of nodes marked cyclic.
    #[must_use]
    pub fn cyclic_count(&self) -> usize {
        usize::from(self.cyclic) + self.children.iter().map(Self::cyclic_count).sum::<usize>()
    }

    /// Total number of nodes below this one.
    #[must_use]
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }

    fn label(&self) -> String {
        let mut label = match &self.module {
            Some(module) => format!("{} [module.{module}]", self.path.display()),
            None => self.path.display().to_string(),
        };
        if self.cyclic {
            label.push_str(" (cyclic)");
        }
        label
    }

    fn write_children(&self, f: &mut fmt::Formatter<'_>, prefix: &str) -> fmt::Result {
        let total = self.children.len() + self.unresolved.len();
        let mut index = 0;

        for unresolved in &self.unresolved {
            index += 1;
            let branch = if index == total { "└── " } else { "├── " };
            writeln!(
                f,
                "{prefix}{branch}module.{} -> {} (not resolved)",
                unresolved.name, unresolved.source
            )?;
        }

        for child in &self.children {
            index += 1;
            let last = index == total;
            let branch = if last { "└── " } else { "├── " };
            writeln!(f, "{prefix}{branch}{}", child.label())?;
            let next = format!("{prefix}{}", if last { "    " } else { "│   " });
            child.write_children(f, &next)?;
        }

        Ok(())
    }
}

impl Display for ModuleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.label())?;
        self.write_children(f, "")
    }
}

#[cfg(test)]
mod tests {
    use crate::resolver::ModuleResolver;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cycle_appears_as_leaf() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        fs::create_dir_all(temp.path().join("b")).unwrap();
        let root = temp.path().join("a/main.tf");
        fs::write(&root, r#"module "b" { source = "../b" }"#).unwrap();
        fs::write(temp.path().join("b/main.tf"), r#"module "a" { source = "../a" }"#).unwrap();

        let tree = ModuleResolver::default().resolve(&root).unwrap().tree();

        assert_eq!(tree.children.len(), 1);
        let a = &tree.children[0];
        assert_eq!(a.children.len(), 1);
        let b = &a.children[0];
        assert_eq!(b.module.as_deref(), Some("b"));
        assert_eq!(b.children.len(), 1);
        assert!(b.children[0].cyclic);
        assert_eq!(tree.cyclic_count(), 1);

        let rendered = tree.to_string();
        assert!(rendered.contains("[module.b]"));
        assert!(rendered.contains("(cyclic)"));
    }

    #[test]
    fn test_unresolved_are_listed() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("main.tf");
        fs::write(
            &root,
            r#"module "vpc" { source = "git::https://example.com/vpc.git" }"#,
        )
        .unwrap();

        let tree = ModuleResolver::default().resolve(&root).unwrap().tree();
        let main = &tree.children[0];
        assert_eq!(main.unresolved.len(), 1);
        assert_eq!(main.unresolved[0].name, "vpc");
        assert!(main.unresolved[0].source.starts_with("git:"));
        assert!(tree.to_string().contains("(not resolved)"));
        assert_eq!(tree.descendant_count(), 1);
    }
}
