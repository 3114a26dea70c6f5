//! Module dependency resolution.
//!
//! Starting from a root declaration file, the resolver follows local
//! `module` sources transitively and returns every file that has to be
//! parsed. Remote sources (git, http, buckets, registry addresses that do
//! not exist on disk) end their branch.
//!
//! One visited set of canonical paths is shared by the whole walk, so
//! module cycles and diamonds terminate and each file is read once.

mod tree;

pub use tree::{ModuleTree, UnresolvedModule};

use crate::config::ScanOptions;
use crate::error::Result;
use crate::parser::{extract_module_refs, is_local_looking, SKIP_FILES};
use crate::types::ModuleRef;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The outcome of resolving a root file.
#[derive(Debug, Clone)]
pub struct ResolvedFiles {
    root: PathBuf,
    seeds: Vec<PathBuf>,
    files: BTreeSet<PathBuf>,
    graph: DiGraph<PathBuf, String>,
    node_index: HashMap<PathBuf, NodeIndex>,
    unresolved: HashMap<PathBuf, Vec<ModuleRef>>,
}

impl ResolvedFiles {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            seeds: Vec::new(),
            files: BTreeSet::new(),
            graph: DiGraph::new(),
            node_index: HashMap::new(),
            unresolved: HashMap::new(),
        }
    }

    /// The canonical root path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files of the root directory, in the order they were seeded.
    #[must_use]
    pub fn seeds(&self) -> &[PathBuf] {
        &self.seeds
    }

    /// All files to parse, sorted.
    #[must_use]
    pub fn files(&self) -> &BTreeSet<PathBuf> {
        &self.files
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Returns true if the file is part of the result.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    /// The module graph: file to file edges labelled with the module name.
    #[must_use]
    pub fn graph(&self) -> &DiGraph<PathBuf, String> {
        &self.graph
    }

    /// Returns true if module references form a cycle.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Files referenced by `file` through module blocks, with the module name.
    #[must_use]
    pub fn dependencies_of(&self, file: &Path) -> Vec<(&str, &Path)> {
        let Some(&index) = self.node_index.get(file) else {
            return Vec::new();
        };
        let mut deps: Vec<_> = self
            .graph
            .edges(index)
            .map(|edge| (edge.weight().as_str(), self.graph[edge.target()].as_path()))
            .collect();
        // petgraph yields edges newest first
        deps.reverse();
        deps
    }

    /// Module references from `file` that did not resolve to local files.
    #[must_use]
    pub fn unresolved_of(&self, file: &Path) -> &[ModuleRef] {
        self.unresolved.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every unresolved module reference.
    pub fn unresolved(&self) -> impl Iterator<Item = &ModuleRef> {
        self.unresolved.values().flatten()
    }

    /// Diagnostic tree of the module structure.
    #[must_use]
    pub fn tree(&self) -> ModuleTree {
        ModuleTree::build(self)
    }

    fn add_file(&mut self, path: &Path) -> NodeIndex {
        self.files.insert(path.to_path_buf());
        if let Some(&index) = self.node_index.get(path) {
            return index;
        }
        let index = self.graph.add_node(path.to_path_buf());
        self.node_index.insert(path.to_path_buf(), index);
        index
    }

    fn add_edge(&mut self, from: &Path, to: &Path, module: &str) {
        let from = self.add_file(from);
        let to = self.add_file(to);
        if !self
            .graph
            .edges_connecting(from, to)
            .any(|edge| edge.weight() == module)
        {
            self.graph.add_edge(from, to, module.to_string());
        }
    }

    fn forget(&mut self, path: &Path) {
        self.files.remove(path);
    }
}

/// Resolves the set of declaration files reachable from a root file.
#[derive(Debug, Clone)]
pub struct ModuleResolver {
    options: ScanOptions,
    excludes: Vec<glob::Pattern>,
}

impl ModuleResolver {
    /// Create a resolver from scan options.
    #[must_use]
    pub fn new(options: ScanOptions) -> Self {
        let excludes = options.compiled_excludes();
        Self { options, excludes }
    }

    /// Resolve every file that must be parsed for `root`.
    ///
    /// `root` is usually a declaration file; a directory is accepted and
    /// treated as its declaration files.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if `root` does not exist. Every other problem
    /// (unreadable files, unresolvable sources) is logged and skipped.
    pub fn resolve(&self, root: &Path) -> Result<ResolvedFiles> {
        if !root.exists() {
            return Err(crate::err!(FileNotFound {
                path: root.to_path_buf(),
            }));
        }

        let root = canonical(root);
        tracing::info!(path = %root.display(), "Resolving module dependencies");

        let mut resolved = ResolvedFiles::new(root.clone());
        let mut worklist = VecDeque::new();

        let root_dir = if root.is_dir() {
            root.clone()
        } else {
            resolved.seeds.push(root.clone());
            root.parent().map_or_else(|| root.clone(), Path::to_path_buf)
        };
        for sibling in self.declaration_files(&root_dir) {
            if !resolved.seeds.contains(&sibling) {
                resolved.seeds.push(sibling);
            }
        }
        for seed in &resolved.seeds.clone() {
            resolved.add_file(seed);
            worklist.push_back(seed.clone());
        }

        let mut visited: HashSet<PathBuf> = HashSet::new();
        while let Some(file) = worklist.pop_front() {
            if !visited.insert(file.clone()) {
                continue;
            }

            let content = match std::fs::read_to_string(&file) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "Skipping unreadable file");
                    resolved.forget(&file);
                    continue;
                }
            };

            let base_dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
            for module_ref in extract_module_refs(&content, &file) {
                match self.resolve_source(&module_ref.raw_source, &base_dir) {
                    Some(targets) => {
                        tracing::debug!(
                            module = %module_ref.name,
                            source = %module_ref.raw_source,
                            files = targets.len(),
                            "Resolved local module"
                        );
                        for target in targets {
                            resolved.add_edge(&file, &target, &module_ref.name);
                            if !visited.contains(&target) {
                                worklist.push_back(target);
                            }
                        }
                    }
                    None => {
                        tracing::debug!(
                            module = %module_ref.name,
                            source = %module_ref.source,
                            "Module source is not local, branch ends here"
                        );
                        resolved
                            .unresolved
                            .entry(file.clone())
                            .or_default()
                            .push(module_ref);
                    }
                }
            }
        }

        tracing::info!(
            files = resolved.len(),
            cyclic = resolved.has_cycles(),
            "Module resolution complete"
        );

        Ok(resolved)
    }

    /// Turn a module source into the files it contributes, if it is local.
    fn resolve_source(&self, source: &str, base_dir: &Path) -> Option<Vec<PathBuf>> {
        let source = source.trim();
        if source.is_empty() || !is_local_looking(source) {
            return None;
        }

        let candidate = if Path::new(source).is_absolute() {
            PathBuf::from(source)
        } else {
            base_dir.join(source)
        };

        if candidate.is_dir() {
            let files = self.declaration_files(&canonical(&candidate));
            return (!files.is_empty()).then_some(files);
        }

        if candidate.is_file() && self.options.has_declaration_extension(&candidate) {
            return Some(vec![canonical(&candidate)]);
        }

        if candidate.extension().is_none() {
            let mut with_ext = candidate.into_os_string();
            with_ext.push(".tf");
            let with_ext = PathBuf::from(with_ext);
            if with_ext.is_file() {
                return Some(vec![canonical(&with_ext)]);
            }
        }

        None
    }

    /// Declaration files directly inside `dir`, entry files first.
    fn declaration_files(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "Error reading directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| self.options.has_declaration_extension(path))
            .filter(|path| !self.should_skip(path))
            .map(|path| canonical(&path))
            .collect();

        files.sort_by_key(|path| (self.entry_rank(path), path.clone()));
        files
    }

    fn entry_rank(&self, path: &Path) -> usize {
        let name = file_name(path);
        self.options
            .entry_files
            .iter()
            .position(|entry| *entry == name)
            .unwrap_or(self.options.entry_files.len())
    }

    fn should_skip(&self, path: &Path) -> bool {
        let name = file_name(path);
        if name.starts_with('.') || SKIP_FILES.contains(&name.as_str()) {
            return true;
        }
        let path_str = path.to_string_lossy();
        self.excludes
            .iter()
            .any(|pattern| pattern.matches(&path_str) || pattern.matches(&name))
    }
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::new(ScanOptions::default())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
