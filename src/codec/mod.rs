//! Export of configfile subtrees to nested JSON and re-import with fresh ids.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use crate::compiler::ParameterCompiler;
use crate::db::Store;
use crate::models::{Configfile, ConfigfileExport, CreateConfigfileRequest, ImportConfigfileRequest, ImportReport};
use crate::tree::{check_attributes, validate_configfile, ConfigTree, TreeError, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Malformed tree: {0}")]
    Malformed(String),
    #[error("Import rejected for '{name}': {source}")]
    Validation {
        name: String,
        #[source]
        source: ValidationError,
    },
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Serialize the subtree rooted at `id`.
///
/// The root is exported even when soft-deleted; below it only live
/// children are followed, in id order.
pub fn export_tree(tree: &ConfigTree, id: i64) -> Result<ConfigfileExport, TreeError> {
    let root = tree.get(id).ok_or(TreeError::UnknownNode(id))?;
    let mut visited = HashSet::new();
    export_node(tree, root, &mut visited)
}

fn export_node(tree: &ConfigTree, node: &Configfile, visited: &mut HashSet<i64>) -> Result<ConfigfileExport, TreeError> {
    if !visited.insert(node.id) {
        return Err(TreeError::Cycle(node.id));
    }

    let mut out = ConfigfileExport::from_node(node);
    for child_id in tree.children(node.id) {
        let Some(child) = tree.get(*child_id) else { continue };
        if child.is_deleted() {
            continue;
        }
        out.children.push(export_node(tree, child, visited)?);
    }
    Ok(out)
}

/// Node ids of an uploaded subtree, rejecting duplicates
pub fn collect_ids(root: &ConfigfileExport) -> Result<BTreeSet<i64>, ImportError> {
    let mut ids = BTreeSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if !ids.insert(node.id) {
            return Err(ImportError::Malformed(format!("id {} appears more than once", node.id)));
        }
        stack.extend(node.children.iter());
    }
    Ok(ids)
}

/// Map each distinct id, ascending, onto `start_id`, `start_id + 1`, ...
///
/// The whole mapping is computed before anything is rewritten, so an old id
/// equal to a newly assigned one can never be substituted twice.
pub fn plan_id_remap(ids: &BTreeSet<i64>, start_id: i64) -> Result<BTreeMap<i64, i64>, ImportError> {
    ids.iter()
        .enumerate()
        .map(|(offset, old)| {
            i64::try_from(offset)
                .ok()
                .and_then(|offset| start_id.checked_add(offset))
                .map(|new| (*old, new))
                .ok_or_else(|| id_overflow(start_id, ids.len()))
        })
        .collect()
}

/// First id of the block handed to an import: one past the highest id in
/// the store, or one past the upload's own highest id when the store is empty
pub fn start_id(store_max: Option<i64>, ids: &BTreeSet<i64>) -> Result<i64, ImportError> {
    let base = store_max.unwrap_or_else(|| ids.last().copied().unwrap_or(0));
    base.checked_add(1).ok_or_else(|| id_overflow(base, ids.len()))
}

fn id_overflow(start: i64, count: usize) -> ImportError {
    ImportError::Malformed(format!(
        "no room for {} configfile ids after id {}",
        count, start
    ))
}

/// Rewrite ids in place and attach the subtree under `destination`.
///
/// Children are re-pointed at their structural parent. The root keeps a null
/// parent if it was uploaded as a forest root; otherwise it takes `destination`.
pub fn remap_ids(root: &mut ConfigfileExport, map: &BTreeMap<i64, i64>, destination: Option<i64>) {
    if root.parent_id.is_some() {
        root.parent_id = destination;
    }

    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if let Some(new) = map.get(&node.id) {
            node.id = *new;
        }
        let parent = node.id;
        for child in node.children.iter_mut() {
            child.parent_id = Some(parent);
            stack.push(child);
        }
    }
}

/// Make `name` unique against `taken` by appending " (2)", " (3)", ...
pub fn dedupe_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    (2..)
        .map(|n| format!("{} ({})", name, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Flatten a remapped subtree into creation order (pre-order, parents first)
fn flatten(root: &ConfigfileExport) -> Vec<(i64, CreateConfigfileRequest)> {
    let mut out = Vec::with_capacity(root.node_count());
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        out.push((node.id, node.to_request()));
        stack.extend(node.children.iter().rev());
    }
    out
}

fn as_node(id: i64, req: &CreateConfigfileRequest) -> Configfile {
    let now = chrono::Utc::now();
    Configfile {
        id,
        name: req.name.clone(),
        device: req.device,
        parent_id: req.parent_id,
        text: req.text.clone(),
        firmware: req.firmware.clone(),
        cvc: req.cvc.clone(),
        public: req.public,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

/// Referenced firmware and certificate files missing from the provisioning root
fn missing_file_warnings(prov_dir: &Path, nodes: &[(i64, CreateConfigfileRequest)]) -> Vec<String> {
    let mut warnings = Vec::new();
    for (_, req) in nodes {
        if !req.firmware.is_empty() && !prov_dir.join("fw").join(&req.firmware).is_file() {
            warnings.push(format!("missing firmware file {} for node {}", req.firmware, req.name));
        }
        if !req.cvc.is_empty() && !prov_dir.join("cvc").join(&req.cvc).is_file() {
            warnings.push(format!("missing certificate file {} for node {}", req.cvc, req.name));
        }
    }
    warnings
}

/// Recreate an uploaded subtree in the store.
///
/// Every node is checked before anything is written and the whole subtree is
/// inserted in one transaction. When the caller names the top node, that node
/// is also compiled against its effective text. Callers serialize imports.
pub async fn import_tree(
    store: &Store,
    compiler: &ParameterCompiler,
    prov_dir: &Path,
    req: &ImportConfigfileRequest,
) -> Result<ImportReport, ImportError> {
    let mut root: ConfigfileExport = serde_json::from_str(&req.content)?;

    let mut tree = store.load_configfile_tree().await?;
    let ids = collect_ids(&root)?;
    let start = start_id(store.max_configfile_id().await?, &ids)?;
    let map = plan_id_remap(&ids, start)?;
    remap_ids(&mut root, &map, req.parent_id);

    let named = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if let Some(name) = named {
        root.name = name.to_string();
    }

    let mut taken: HashSet<String> = tree.names().map(str::to_string).collect();

    let mut nodes = flatten(&root);
    for (i, (id, node)) in nodes.iter_mut().enumerate() {
        node.name = dedupe_name(node.name.trim(), &taken);

        let checked = if i == 0 && named.is_some() {
            validate_configfile(&tree, compiler, None, node).await
        } else {
            check_attributes(&tree, None, node)
        };
        checked.map_err(|source| ImportError::Validation {
            name: node.name.clone(),
            source,
        })?;

        taken.insert(node.name.clone());
        tree.insert(as_node(*id, node));
    }

    store.insert_configfiles(&nodes).await?;

    let warnings = missing_file_warnings(prov_dir, &nodes);
    for w in &warnings {
        tracing::warn!("Import: {}", w);
    }
    tracing::info!("Imported {} configfiles starting at id {}", nodes.len(), start);

    Ok(ImportReport {
        root_id: root.id,
        created: nodes.iter().map(|(id, _)| *id).collect(),
        warnings,
    })
}
