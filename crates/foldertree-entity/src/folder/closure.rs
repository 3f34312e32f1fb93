//! Closure index rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use foldertree_core::types::{ClosureEdgeId, FolderId};

/// One row of the closure index: `ancestor_id` reaches `descendant_id`
/// by walking `distance` parent links downward. Every live folder has a
/// self-edge at distance 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ClosureEdge {
    /// Row identifier.
    pub id: ClosureEdgeId,
    /// The upper end of the path.
    pub ancestor_id: FolderId,
    /// The lower end of the path.
    pub descendant_id: FolderId,
    /// Number of parent links between the two folders.
    #[sqlx(rename = "path_length")]
    pub distance: i32,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

impl ClosureEdge {
    /// The `(ancestor, descendant, distance)` triple without row metadata.
    pub fn link(&self) -> NewClosureEdge {
        NewClosureEdge {
            ancestor_id: self.ancestor_id,
            descendant_id: self.descendant_id,
            distance: self.distance,
        }
    }

    /// Check if this is the reflexive row of a folder.
    pub fn is_self_edge(&self) -> bool {
        self.ancestor_id == self.descendant_id && self.distance == 0
    }

    /// Check if this row links a parent to a direct child.
    pub fn is_direct(&self) -> bool {
        self.distance == 1
    }
}

/// A closure row to be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NewClosureEdge {
    /// The upper end of the path.
    pub ancestor_id: FolderId,
    /// The lower end of the path.
    pub descendant_id: FolderId,
    /// Number of parent links between the two folders.
    pub distance: i32,
}

impl NewClosureEdge {
    /// The reflexive row for a folder.
    pub fn self_edge(id: FolderId) -> Self {
        Self {
            ancestor_id: id,
            descendant_id: id,
            distance: 0,
        }
    }

    /// Materialize the row with an id and timestamp.
    pub fn into_edge(self, id: ClosureEdgeId, created_at: DateTime<Utc>) -> ClosureEdge {
        ClosureEdge {
            id,
            ancestor_id: self.ancestor_id,
            descendant_id: self.descendant_id,
            distance: self.distance,
            created_at,
        }
    }
}
