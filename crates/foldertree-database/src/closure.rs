//! Closure table algorithms.
//!
//! These functions compute which `folder_paths` rows to write or remove for
//! each tree mutation. They are pure: both the PostgreSQL repository and the
//! in-memory store read the rows they need, call into this module, and
//! persist the result inside their own transaction.
//!
//! Conventions used throughout:
//! - a *chain* is the set of rows whose `descendant_id` is one folder (its
//!   ancestors, itself included at distance 0);
//! - a *subtree* is the set of rows whose `ancestor_id` is one folder (its
//!   descendants, itself included at distance 0).

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use foldertree_core::types::FolderId;
use foldertree_entity::folder::{ClosureEdge, Folder, NewClosureEdge, OrderedFolder};

/// Rows to insert when `child_id` is created under the folder whose chain
/// is `parent_chain`.
///
/// Every ancestor of the parent (the parent included) reaches the child one
/// step further than it reaches the parent; the child also gets its
/// self-edge.
pub fn edges_for_child(parent_chain: &[NewClosureEdge], child_id: FolderId) -> Vec<NewClosureEdge> {
    let mut edges: Vec<NewClosureEdge> = parent_chain
        .iter()
        .map(|link| NewClosureEdge {
            ancestor_id: link.ancestor_id,
            descendant_id: child_id,
            distance: link.distance + 1,
        })
        .collect();
    edges.push(NewClosureEdge::self_edge(child_id));
    edges
}

/// Whether `edge` crosses into the moving subtree from outside it.
///
/// These are exactly the rows a move severs. Rows internal to the subtree
/// keep their distances.
pub fn is_severed(edge: &NewClosureEdge, subtree: &HashSet<FolderId>) -> bool {
    subtree.contains(&edge.descendant_id) && !subtree.contains(&edge.ancestor_id)
}

/// Rows to insert when the subtree described by `subtree` is attached under
/// the folder whose chain is `new_parent_chain`.
///
/// For a chain member `p` at distance `dp` above the new parent and a
/// subtree member `s` at distance `ds` below the subtree root, the new row
/// is `(p, s, dp + ds + 1)`.
pub fn plan_move(
    new_parent_chain: &[NewClosureEdge],
    subtree: &[NewClosureEdge],
) -> Vec<NewClosureEdge> {
    let mut edges = Vec::with_capacity(new_parent_chain.len() * subtree.len());
    for above in new_parent_chain {
        for below in subtree {
            edges.push(NewClosureEdge {
                ancestor_id: above.ancestor_id,
                descendant_id: below.descendant_id,
                distance: above.distance + below.distance + 1,
            });
        }
    }
    edges
}

/// Pick the next batch of folders to remove from a subtree.
///
/// Deepest folders go first, ties broken by id. Because a folder is only
/// chosen once every deeper folder has been chosen, its children are always
/// in the same batch or an earlier one, so the part of the tree left behind
/// after each batch is still a well-formed subtree.
pub fn deletion_batch(subtree: &[NewClosureEdge], max_folders: usize) -> Vec<FolderId> {
    let mut members: Vec<(i32, FolderId)> = subtree
        .iter()
        .map(|link| (link.distance, link.descendant_id))
        .collect();
    members.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    members
        .into_iter()
        .take(max_folders)
        .map(|(_, id)| id)
        .collect()
}

/// Rank ancestors root-first: distance descending, the reference folder
/// itself last at distance 0.
pub fn rank_ancestors(mut rows: Vec<(Folder, i32)>) -> Vec<OrderedFolder> {
    rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.id.cmp(&b.0.id)));
    assign_order(rows)
}

/// Rank descendants breadth-first: distance ascending, ties by id so that
/// identical reads return identical sequences.
pub fn rank_descendants(mut rows: Vec<(Folder, i32)>) -> Vec<OrderedFolder> {
    rows.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.id.cmp(&b.0.id)));
    assign_order(rows)
}

fn assign_order(rows: Vec<(Folder, i32)>) -> Vec<OrderedFolder> {
    rows.into_iter()
        .enumerate()
        .map(|(order, (folder, distance))| OrderedFolder {
            folder,
            distance,
            order,
        })
        .collect()
}

/// A structural defect found in a workspace's closure index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// A live folder has no `(f, f, 0)` row.
    MissingSelfEdge { folder_id: FolderId },
    /// More than one row links the same pair.
    DuplicateEdge {
        ancestor_id: FolderId,
        descendant_id: FolderId,
    },
    /// A row references a folder that is missing or soft-deleted.
    DanglingEdge {
        ancestor_id: FolderId,
        descendant_id: FolderId,
    },
    /// `(a, b, d1)` and `(b, c, d2)` exist but `(a, c, d1 + d2)` does not.
    MissingTransitiveEdge {
        ancestor_id: FolderId,
        descendant_id: FolderId,
        distance: i32,
    },
    /// Two folders reach each other.
    Cycle { a: FolderId, b: FolderId },
    /// A non-root folder does not have exactly one parent.
    ParentCount { folder_id: FolderId, parents: usize },
    /// The workspace does not have exactly one root.
    RootCount { roots: usize },
}

/// Result of [`verify`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    /// Number of live folders examined.
    pub folders: usize,
    /// Number of closure rows examined.
    pub edges: usize,
    /// Every defect found.
    pub violations: Vec<Violation>,
}

impl IntegrityReport {
    /// Whether the index satisfies every invariant.
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check a workspace's live folders and closure rows against the closure
/// invariants: reflexivity, uniqueness, transitivity, acyclicity, one parent
/// per non-root folder and a single root.
pub fn verify(folders: &[Folder], edges: &[ClosureEdge]) -> IntegrityReport {
    let live: HashSet<FolderId> = folders.iter().filter(|f| f.is_live()).map(|f| f.id).collect();
    let mut violations = Vec::new();

    let mut by_pair: HashMap<(FolderId, FolderId), i32> = HashMap::new();
    let mut duplicates = BTreeSet::new();
    for edge in edges {
        if !live.contains(&edge.ancestor_id) || !live.contains(&edge.descendant_id) {
            violations.push(Violation::DanglingEdge {
                ancestor_id: edge.ancestor_id,
                descendant_id: edge.descendant_id,
            });
        }
        if by_pair
            .insert((edge.ancestor_id, edge.descendant_id), edge.distance)
            .is_some()
        {
            duplicates.insert((edge.ancestor_id, edge.descendant_id));
        }
    }
    violations.extend(duplicates.into_iter().map(|(ancestor_id, descendant_id)| {
        Violation::DuplicateEdge {
            ancestor_id,
            descendant_id,
        }
    }));

    let mut live_sorted: Vec<FolderId> = live.iter().copied().collect();
    live_sorted.sort();

    for id in &live_sorted {
        if by_pair.get(&(*id, *id)) != Some(&0) {
            violations.push(Violation::MissingSelfEdge { folder_id: *id });
        }
    }

    let mut sorted_pairs: Vec<(&(FolderId, FolderId), &i32)> = by_pair.iter().collect();
    sorted_pairs.sort();

    for ((a, b), distance) in &sorted_pairs {
        if a < b && *distance > &0 && by_pair.contains_key(&(*b, *a)) {
            violations.push(Violation::Cycle { a: *a, b: *b });
        }
    }

    let mut below: HashMap<FolderId, Vec<(FolderId, i32)>> = HashMap::new();
    for ((a, b), distance) in &sorted_pairs {
        if *distance > &0 {
            below.entry(*a).or_default().push((*b, **distance));
        }
    }
    for ((a, b), d1) in &sorted_pairs {
        if *d1 == &0 {
            continue;
        }
        for (c, d2) in below.get(b).into_iter().flatten() {
            let expected = **d1 + d2;
            if by_pair.get(&(*a, *c)) != Some(&expected) {
                violations.push(Violation::MissingTransitiveEdge {
                    ancestor_id: *a,
                    descendant_id: *c,
                    distance: expected,
                });
            }
        }
    }

    let mut parents: HashMap<FolderId, usize> = HashMap::new();
    for ((_, b), distance) in &sorted_pairs {
        if **distance == 1 {
            *parents.entry(*b).or_default() += 1;
        }
    }
    let mut roots = 0;
    for folder in folders.iter().filter(|f| f.is_live()) {
        let count = parents.get(&folder.id).copied().unwrap_or(0);
        if folder.is_root() {
            roots += 1;
            if count != 0 {
                violations.push(Violation::ParentCount {
                    folder_id: folder.id,
                    parents: count,
                });
            }
        } else if count != 1 {
            violations.push(Violation::ParentCount {
                folder_id: folder.id,
                parents: count,
            });
        }
    }
    if !live.is_empty() && roots != 1 {
        violations.push(Violation::RootCount { roots });
    }

    IntegrityReport {
        folders: live.len(),
        edges: edges.len(),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use foldertree_core::types::{ClosureEdgeId, WorkspaceId};
    use foldertree_entity::folder::CreateFolder;

    use super::*;

    fn chain_of(edges: &[NewClosureEdge], id: FolderId) -> Vec<NewClosureEdge> {
        edges
            .iter()
            .filter(|e| e.descendant_id == id)
            .copied()
            .collect()
    }

    fn subtree_of(edges: &[NewClosureEdge], id: FolderId) -> Vec<NewClosureEdge> {
        edges
            .iter()
            .filter(|e| e.ancestor_id == id)
            .copied()
            .collect()
    }

    fn distance(edges: &[NewClosureEdge], a: FolderId, b: FolderId) -> Option<i32> {
        edges
            .iter()
            .find(|e| e.ancestor_id == a && e.descendant_id == b)
            .map(|e| e.distance)
    }

    fn add_child(edges: &mut Vec<NewClosureEdge>, parent: FolderId) -> FolderId {
        let id = FolderId::new();
        let chain = chain_of(edges, parent);
        edges.extend(edges_for_child(&chain, id));
        id
    }

    fn apply_move(edges: &mut Vec<NewClosureEdge>, subtree_root: FolderId, new_parent: FolderId) {
        let subtree = subtree_of(edges, subtree_root);
        let members: HashSet<FolderId> = subtree.iter().map(|e| e.descendant_id).collect();
        edges.retain(|e| !is_severed(e, &members));
        let chain = chain_of(edges, new_parent);
        edges.extend(plan_move(&chain, &subtree));
    }

    fn materialize(
        edges: &[NewClosureEdge],
        ids: &[(FolderId, Option<&str>)],
    ) -> (Vec<Folder>, Vec<ClosureEdge>) {
        let ws = WorkspaceId::new();
        let folders = ids
            .iter()
            .map(|(id, name)| {
                let data = match name {
                    Some(n) => CreateFolder::named(ws, *n),
                    None => CreateFolder::root(ws),
                };
                Folder::from_create(*id, &data, Utc::now())
            })
            .collect();
        let rows = edges
            .iter()
            .map(|e| e.into_edge(ClosureEdgeId::new(), Utc::now()))
            .collect();
        (folders, rows)
    }

    #[test]
    fn test_edges_for_child_extends_parent_chain() {
        let root = FolderId::new();
        let mut edges = vec![NewClosureEdge::self_edge(root)];
        let a = add_child(&mut edges, root);
        let b = add_child(&mut edges, a);

        assert_eq!(distance(&edges, root, b), Some(2));
        assert_eq!(distance(&edges, a, b), Some(1));
        assert_eq!(distance(&edges, b, b), Some(0));
        assert_eq!(chain_of(&edges, b).len(), 3);
        assert_eq!(edges.len(), 6);
    }

    #[test]
    fn test_is_severed_only_crosses_into_subtree() {
        let (outside, s, inner) = (FolderId::new(), FolderId::new(), FolderId::new());
        let members: HashSet<FolderId> = [s, inner].into_iter().collect();
        let crossing = NewClosureEdge {
            ancestor_id: outside,
            descendant_id: inner,
            distance: 2,
        };
        let internal = NewClosureEdge {
            ancestor_id: s,
            descendant_id: inner,
            distance: 1,
        };
        let unrelated = NewClosureEdge::self_edge(outside);

        assert!(is_severed(&crossing, &members));
        assert!(!is_severed(&internal, &members));
        assert!(!is_severed(&unrelated, &members));
    }

    #[test]
    fn test_move_preserves_internal_distances() {
        let root = FolderId::new();
        let mut edges = vec![NewClosureEdge::self_edge(root)];
        let s = add_child(&mut edges, root);
        let s1 = add_child(&mut edges, s);
        let s2 = add_child(&mut edges, s);
        let p_parent = add_child(&mut edges, root);
        let p = add_child(&mut edges, p_parent);

        apply_move(&mut edges, s, p);

        assert_eq!(distance(&edges, s, s1), Some(1));
        assert_eq!(distance(&edges, s, s2), Some(1));
        assert_eq!(distance(&edges, p, s), Some(1));
        assert_eq!(distance(&edges, p, s1), Some(2));
        assert_eq!(distance(&edges, root, s1), Some(4));
        assert_eq!(distance(&edges, p_parent, s2), Some(3));
    }

    #[test]
    fn test_plan_move_is_chain_times_subtree() {
        let chain = vec![
            NewClosureEdge::self_edge(FolderId::new()),
            NewClosureEdge {
                ancestor_id: FolderId::new(),
                descendant_id: FolderId::new(),
                distance: 1,
            },
        ];
        let s = FolderId::new();
        let subtree = vec![
            NewClosureEdge::self_edge(s),
            NewClosureEdge {
                ancestor_id: s,
                descendant_id: FolderId::new(),
                distance: 1,
            },
            NewClosureEdge {
                ancestor_id: s,
                descendant_id: FolderId::new(),
                distance: 2,
            },
        ];
        let planned = plan_move(&chain, &subtree);
        assert_eq!(planned.len(), 6);
        assert!(planned.iter().all(|e| e.distance >= 1));
        assert_eq!(planned.iter().map(|e| e.distance).max(), Some(4));
    }

    #[test]
    fn test_deletion_batch_takes_deepest_first() {
        let root = FolderId::new();
        let mut edges = vec![NewClosureEdge::self_edge(root)];
        let x = add_child(&mut edges, root);
        let x1 = add_child(&mut edges, x);
        let x2 = add_child(&mut edges, x);
        let x11 = add_child(&mut edges, x1);

        let subtree = subtree_of(&edges, x);
        let first = deletion_batch(&subtree, 2);
        assert_eq!(first[0], x11);
        assert!(first[1] == x1 || first[1] == x2);

        let all = deletion_batch(&subtree, 10);
        assert_eq!(all.len(), 4);
        assert_eq!(all.last(), Some(&x));
    }

    #[test]
    fn test_rank_ancestors_root_first() {
        let ws = WorkspaceId::new();
        let make = |name: Option<&str>| {
            let data = match name {
                Some(n) => CreateFolder::named(ws, n),
                None => CreateFolder::root(ws),
            };
            Folder::from_create(FolderId::new(), &data, Utc::now())
        };
        let (root, a, b) = (make(None), make(Some("a")), make(Some("b")));
        let ranked = rank_ancestors(vec![(b.clone(), 0), (root.clone(), 2), (a.clone(), 1)]);

        let ids: Vec<FolderId> = ranked.iter().map(|o| o.folder.id).collect();
        assert_eq!(ids, vec![root.id, a.id, b.id]);
        assert_eq!(ranked[0].order, 0);
        assert_eq!(ranked[2].distance, 0);
    }

    #[test]
    fn test_rank_descendants_is_stable_by_id() {
        let ws = WorkspaceId::new();
        let folders: Vec<Folder> = (0..4)
            .map(|i| {
                Folder::from_create(
                    FolderId::new(),
                    &CreateFolder::named(ws, format!("f{i}")),
                    Utc::now(),
                )
            })
            .collect();
        let rows = vec![
            (folders[0].clone(), 2),
            (folders[1].clone(), 1),
            (folders[2].clone(), 1),
            (folders[3].clone(), 2),
        ];
        let first = rank_descendants(rows.clone());
        let mut reversed = rows;
        reversed.reverse();
        let second = rank_descendants(reversed);

        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_eq!(first.iter().map(|o| o.order).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_verify_accepts_well_formed_tree() {
        let root = FolderId::new();
        let mut edges = vec![NewClosureEdge::self_edge(root)];
        let a = add_child(&mut edges, root);
        let b = add_child(&mut edges, a);
        let c = add_child(&mut edges, root);
        apply_move(&mut edges, a, c);

        let (folders, rows) = materialize(
            &edges,
            &[(root, None), (a, Some("a")), (b, Some("b")), (c, Some("c"))],
        );
        let report = verify(&folders, &rows);
        assert!(report.is_consistent(), "{:?}", report.violations);
        assert_eq!(report.folders, 4);
    }

    #[test]
    fn test_verify_reports_missing_transitive_edge() {
        let root = FolderId::new();
        let mut edges = vec![NewClosureEdge::self_edge(root)];
        let a = add_child(&mut edges, root);
        let b = add_child(&mut edges, a);
        edges.retain(|e| !(e.ancestor_id == root && e.descendant_id == b));

        let (folders, rows) =
            materialize(&edges, &[(root, None), (a, Some("a")), (b, Some("b"))]);
        let report = verify(&folders, &rows);
        assert!(report.violations.contains(&Violation::MissingTransitiveEdge {
            ancestor_id: root,
            descendant_id: b,
            distance: 2,
        }));
    }

    #[test]
    fn test_verify_reports_cycle_and_missing_self_edge() {
        let root = FolderId::new();
        let mut edges = vec![NewClosureEdge::self_edge(root)];
        let a = add_child(&mut edges, root);
        edges.push(NewClosureEdge {
            ancestor_id: a,
            descendant_id: root,
            distance: 1,
        });
        edges.retain(|e| !(e.ancestor_id == a && e.descendant_id == a));

        let (folders, rows) = materialize(&edges, &[(root, None), (a, Some("a"))]);
        let report = verify(&folders, &rows);
        assert!(report.violations.iter().any(|v| matches!(v, Violation::Cycle { .. })));
        assert!(report
            .violations
            .contains(&Violation::MissingSelfEdge { folder_id: a }));
    }
}
