//! In-memory model of the TimeCamp group hierarchy.
//!
//! An arena of `{id, name, parent_id}` nodes indexed by id, with parent
//! links only and no owned child pointers, so malformed listings can
//! never form a reference cycle. Shared by the prepare engine (dry
//! derivation) and the sync engine (live reconciliation).

use std::collections::HashMap;

use campsync_core::SyncError;

use crate::model::LiveGroup;

#[derive(Debug, Clone)]
pub struct GroupNode {
    pub id: u64,
    pub name: String,
    pub parent_id: Option<u64>,
}

/// A forest rooted at the configured root group. Path segment comparison
/// is case-sensitive and performed verbatim; prepare has already
/// normalised every segment.
pub struct GroupTree {
    root_id: u64,
    nodes: HashMap<u64, GroupNode>,
}

impl GroupTree {
    pub fn new(root_id: u64) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id,
            GroupNode {
                id: root_id,
                name: String::new(),
                parent_id: None,
            },
        );
        Self { root_id, nodes }
    }

    /// Build the tree from a live group listing.
    pub fn from_groups(root_id: u64, groups: &[LiveGroup]) -> Self {
        let mut tree = Self::new(root_id);
        for group in groups {
            if group.group_id == root_id {
                continue;
            }
            tree.nodes.insert(
                group.group_id,
                GroupNode {
                    id: group.group_id,
                    name: group.name.clone(),
                    parent_id: group.parent_id,
                },
            );
        }
        tree
    }

    pub fn root_id(&self) -> u64 {
        self.root_id
    }

    /// Record a newly created group.
    pub fn insert(&mut self, id: u64, name: &str, parent_id: u64) {
        self.nodes.insert(
            id,
            GroupNode {
                id,
                name: name.to_string(),
                parent_id: Some(parent_id),
            },
        );
    }

    pub fn children_of(&self, id: u64) -> Vec<&GroupNode> {
        self.nodes
            .values()
            .filter(|n| n.parent_id == Some(id))
            .collect()
    }

    fn child_by_name(&self, parent_id: u64, name: &str) -> Option<u64> {
        self.nodes
            .values()
            .find(|n| n.parent_id == Some(parent_id) && n.name == name)
            .map(|n| n.id)
    }

    /// Resolve a breadcrumb to a group id. The empty path is the root.
    pub fn lookup_by_path(&self, path: &str) -> Option<u64> {
        let mut current = self.root_id;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = self.child_by_name(current, segment)?;
        }
        Some(current)
    }

    /// Resolve a breadcrumb, creating missing segments parent-first via
    /// `create(name, parent_id) -> new id`. The callback is the seam
    /// between the live API and a dry-run recorder.
    pub fn ensure_path(
        &mut self,
        path: &str,
        create: &mut dyn FnMut(&str, u64) -> Result<u64, SyncError>,
    ) -> Result<u64, SyncError> {
        let mut current = self.root_id;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = match self.child_by_name(current, segment) {
                Some(id) => id,
                None => {
                    let id = create(segment, current)?;
                    self.insert(id, segment, current);
                    id
                }
            };
        }
        Ok(current)
    }

    /// Breadcrumb of a group relative to the root, if it sits under it.
    pub fn path_of(&self, id: u64) -> Option<String> {
        if id == self.root_id {
            return Some(String::new());
        }
        let mut segments = Vec::new();
        let mut current = id;
        let mut hops = 0usize;
        loop {
            let node = self.nodes.get(&current)?;
            segments.push(node.name.clone());
            match node.parent_id {
                Some(parent) if parent == self.root_id => {
                    segments.reverse();
                    return Some(segments.join("/"));
                }
                Some(parent) => current = parent,
                None => return None,
            }
            hops += 1;
            if hops > self.nodes.len() {
                return None;
            }
        }
    }
}
