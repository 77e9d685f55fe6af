mod merge;
mod validate;

pub use merge::merge_texts;
pub use validate::{check_attributes, validate_configfile, ValidationError};

use std::collections::{HashMap, HashSet};

use crate::models::Configfile;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("Configfile not found: {0}")]
    UnknownNode(i64),
    #[error("Cycle in configfile parent chain at {0}")]
    Cycle(i64),
}

/// In-memory arena of configfiles addressed by id, with a child index.
///
/// The store loads every row (including soft-deleted ones) into a tree
/// before resolving chains, so traversal never issues per-node queries.
#[derive(Debug, Default, Clone)]
pub struct ConfigTree {
    nodes: HashMap<i64, Configfile>,
    children: HashMap<i64, Vec<i64>>,
}

impl ConfigTree {
    pub fn new(nodes: impl IntoIterator<Item = Configfile>) -> Self {
        let nodes: HashMap<i64, Configfile> = nodes.into_iter().map(|n| (n.id, n)).collect();

        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        for node in nodes.values() {
            if let Some(parent_id) = node.parent_id {
                children.entry(parent_id).or_default().push(node.id);
            }
        }
        // Stable child order: creation order
        for ids in children.values_mut() {
            ids.sort_unstable();
        }

        Self { nodes, children }
    }

    /// Add or replace a node, keeping the child index in sync
    pub fn insert(&mut self, node: Configfile) {
        if let Some(old) = self.nodes.get(&node.id) {
            if let Some(pid) = old.parent_id {
                if let Some(ids) = self.children.get_mut(&pid) {
                    ids.retain(|c| *c != node.id);
                }
            }
        }
        if let Some(pid) = node.parent_id {
            let ids = self.children.entry(pid).or_default();
            let pos = ids.partition_point(|c| *c < node.id);
            ids.insert(pos, node.id);
        }
        self.nodes.insert(node.id, node);
    }

    pub fn get(&self, id: i64) -> Option<&Configfile> {
        self.nodes.get(&id)
    }

    /// Names of live nodes
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .values()
            .filter(|n| !n.is_deleted())
            .map(|n| n.name.as_str())
    }

    /// Direct children of a node, soft-deleted ones included
    pub fn children(&self, id: i64) -> &[i64] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Live nodes whose parent is unset or not a live node
    pub fn roots(&self) -> Vec<i64> {
        let mut roots: Vec<i64> = self
            .nodes
            .values()
            .filter(|n| !n.is_deleted())
            .filter(|n| match n.parent_id {
                None => true,
                Some(pid) => self.nodes.get(&pid).map_or(true, Configfile::is_deleted),
            })
            .map(|n| n.id)
            .collect();
        roots.sort_unstable();
        roots
    }

    /// Inheritance chain from the outermost ancestor down to `id` itself.
    ///
    /// A parent id that points at no known node ends the chain.
    pub fn resolve_chain(&self, id: i64) -> Result<Vec<&Configfile>, TreeError> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(id);

        while let Some(cur) = current {
            let node = match self.nodes.get(&cur) {
                Some(node) => node,
                None if cur == id => return Err(TreeError::UnknownNode(id)),
                None => break,
            };
            if !visited.insert(cur) {
                return Err(TreeError::Cycle(cur));
            }
            chain.push(node);
            current = node.parent_id;
        }

        chain.reverse(); // ancestors first, self last
        Ok(chain)
    }

    /// Inheritance-flattened parameter text of a node
    pub fn effective_text(&self, id: i64) -> Result<String, TreeError> {
        let chain = self.resolve_chain(id)?;
        Ok(merge_texts(chain.iter().map(|n| n.text.as_str())))
    }

    /// Effective text a node would have with `text` as its own text under `parent_id`
    pub fn effective_text_under(&self, parent_id: Option<i64>, text: &str) -> Result<String, TreeError> {
        let chain = match parent_id {
            Some(pid) => self.resolve_chain(pid)?,
            None => Vec::new(),
        };
        Ok(merge_texts(
            chain.iter().map(|n| n.text.as_str()).chain(std::iter::once(text)),
        ))
    }

    /// All descendants of `id` in depth-first pre-order, excluding `id` itself
    pub fn descendants(&self, id: i64) -> Result<Vec<i64>, TreeError> {
        if !self.nodes.contains_key(&id) {
            return Err(TreeError::UnknownNode(id));
        }

        let mut out = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut stack: Vec<i64> = self.children(id).iter().rev().copied().collect();

        while let Some(cur) = stack.pop() {
            if !visited.insert(cur) {
                return Err(TreeError::Cycle(cur));
            }
            out.push(cur);
            stack.extend(self.children(cur).iter().rev().copied());
        }
        Ok(out)
    }

    /// Check if setting `proposed_parent` as parent of `id` would create a cycle
    pub fn would_create_cycle(&self, id: i64, proposed_parent: i64) -> bool {
        if id == proposed_parent {
            return true;
        }

        // Walk up from proposed_parent to see if we reach id
        let mut current = Some(proposed_parent);
        let mut visited = HashSet::new();

        while let Some(cur) = current {
            if cur == id {
                return true;
            }
            if !visited.insert(cur) {
                break; // Already visited, existing cycle in data
            }
            current = self.nodes.get(&cur).and_then(|n| n.parent_id);
        }

        false
    }
}
