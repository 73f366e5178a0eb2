//! Named file-set graph and output resolution.
//!
//! Large builds share file sets between targets by reference, so a target's
//! outputs are the union of a walk over this graph.

use buildlens_log::event::{File, NamedSetOfFiles};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// A resolved output file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputFile {
    /// Path prefix and file name
    pub name: String,
    /// Location, usually a `file://` URI
    pub uri: Option<String>,
}

impl From<&File> for OutputFile {
    fn from(file: &File) -> Self {
        Self {
            name: file.display_path(),
            uri: file.uri.clone(),
        }
    }
}

/// Named sets keyed by their opaque id; nodes never change once inserted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedSetGraph {
    nodes: IndexMap<String, NamedSetOfFiles>,
}

impl NamedSetGraph {
    /// Create a new empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node; returns false and keeps the original on a repeated id
    pub fn insert(&mut self, set: NamedSetOfFiles) -> bool {
        if self.nodes.contains_key(&set.id) {
            tracing::debug!(id = %set.id, "Ignoring repeated named set");
            return false;
        }
        self.nodes.insert(set.id.clone(), set);
        true
    }

    /// Look up a node
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&NamedSetOfFiles> {
        self.nodes.get(id)
    }

    /// Number of nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Breadth-first resolver over a [`NamedSetGraph`]
pub struct FileSetResolver<'a> {
    graph: &'a NamedSetGraph,
}

impl<'a> FileSetResolver<'a> {
    /// Create a resolver
    #[must_use]
    pub fn new(graph: &'a NamedSetGraph) -> Self {
        Self { graph }
    }

    /// All files reachable from `root`.
    ///
    /// Each node contributes once even when reached along several paths or
    /// through a cycle. Ids that are not in the graph yield nothing.
    #[must_use]
    pub fn resolve(&self, root: &str) -> Vec<OutputFile> {
        self.resolve_all(std::iter::once(root))
    }

    /// All files reachable from any of `roots`, sharing one visited set
    #[must_use]
    pub fn resolve_all<'r>(&self, roots: impl IntoIterator<Item = &'r str>) -> Vec<OutputFile> {
        let mut queue: VecDeque<&str> = roots.into_iter().collect();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut files = Vec::new();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.graph.get(id) else {
                tracing::trace!(id, "Named set not seen, skipping branch");
                continue;
            };
            files.extend(node.files.iter().map(OutputFile::from));
            queue.extend(
                node.file_sets
                    .iter()
                    .map(String::as_str)
                    .filter(|child| !visited.contains(child)),
            );
        }

        files
    }

    /// Like [`resolve_all`](Self::resolve_all), deduplicated by file name
    /// with the first occurrence kept
    #[must_use]
    pub fn resolve_unique<'r>(
        &self,
        roots: impl IntoIterator<Item = &'r str>,
    ) -> Vec<OutputFile> {
        let mut seen = HashSet::new();
        self.resolve_all(roots)
            .into_iter()
            .filter(|file| seen.insert(file.name.clone()))
            .collect()
    }
}
