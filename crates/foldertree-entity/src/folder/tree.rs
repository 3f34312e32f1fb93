//! Ordered folder views and tree structures for hierarchical display.

use serde::{Deserialize, Serialize};

use foldertree_core::types::FolderId;

use super::model::Folder;

/// A folder positioned relative to a reference folder.
///
/// `distance` comes from the closure index. `order` is the rank of the
/// folder in the sequence it was returned in (ancestors root-first,
/// descendants breadth-first); it is computed per query and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedFolder {
    /// The folder record.
    pub folder: Folder,
    /// Distance from the reference folder.
    pub distance: i32,
    /// Rank within the returned sequence, starting at 0.
    pub order: usize,
}

/// A node in a rendered folder tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderNode {
    /// Folder ID.
    pub id: FolderId,
    /// Folder name (`None` for the root).
    pub name: Option<String>,
    /// Absolute path, e.g. `Reports/2024/`.
    pub path: String,
    /// Distance from the node the tree was built from.
    pub depth: i32,
    /// Whether the folder came from an external sync.
    pub external: bool,
    /// Child folder nodes, sorted by name.
    pub children: Vec<FolderNode>,
}

impl FolderNode {
    /// Total number of nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(FolderNode::size).sum::<usize>()
    }
}
