// Copyright 2020 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Three-way comparison of two trees against their common ancestor.

use std::collections::BTreeSet;

use crate::error::IndexError;
use crate::ids::{RepoId, TreeId};
use crate::merkle::TreeNode;
use crate::model::{Entry, EntryAddress, EntryType};
use crate::repo_path::{PathComponent, TreePath};
use crate::store::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifferenceKind {
    Added,
    Changed,
    Removed,
    Conflict,
}

/// Which side a non-conflicting change came from, relative to `base`.
/// `Conflict` means both sides touched the same path incompatibly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDirection {
    Left,
    Right,
    Conflict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
    pub path: String,
    pub path_type: EntryType,
    pub kind: DifferenceKind,
    pub direction: MergeDirection,
}

fn read_node(
    tx: &mut dyn Transaction,
    repo_id: &RepoId,
    address: &TreeId,
) -> Result<TreeNode, IndexError> {
    if *address == TreeNode::empty().address {
        return Ok(TreeNode::empty());
    }
    tx.read_tree_node(repo_id, address).map_err(|e| match e {
        crate::error::StoreError::NotFound => IndexError::NotFound,
        other => IndexError::Store(other),
    })
}

/// Compares `left` and `right` against their common ancestor `base` and
/// reports every path where either side diverged from it.
pub fn diff(
    tx: &mut dyn Transaction,
    repo_id: &RepoId,
    left: &TreeId,
    right: &TreeId,
    base: &TreeId,
) -> Result<Vec<Difference>, IndexError> {
    let left_node = read_node(tx, repo_id, left)?;
    let right_node = read_node(tx, repo_id, right)?;
    let base_node = read_node(tx, repo_id, base)?;
    diff_dir(tx, repo_id, &left_node, &right_node, &base_node, &TreePath::root())
}

fn diff_dir(
    tx: &mut dyn Transaction,
    repo_id: &RepoId,
    left: &TreeNode,
    right: &TreeNode,
    base: &TreeNode,
    at_path: &TreePath,
) -> Result<Vec<Difference>, IndexError> {
    let mut out = Vec::new();
    let mut names: BTreeSet<&str> = BTreeSet::new();
    names.extend(left.children.keys().map(String::as_str));
    names.extend(right.children.keys().map(String::as_str));
    names.extend(base.children.keys().map(String::as_str));

    for name in names {
        let le = left.children.get(name);
        let re = right.children.get(name);
        let be = base.children.get(name);

        let types: BTreeSet<EntryType> = [le, re, be]
            .into_iter()
            .flatten()
            .map(Entry::entry_type)
            .collect();

        if types.len() > 1 {
            out.push(Difference {
                path: at_path.join_tree(&PathComponent::from(name)).as_internal_string(),
                path_type: EntryType::Object,
                kind: DifferenceKind::Conflict,
                direction: MergeDirection::Conflict,
            });
            continue;
        }

        match types.into_iter().next() {
            Some(EntryType::Tree) => {
                let empty = TreeNode::empty();
                let left_child = match le.and_then(|e| e.address.as_tree_id()) {
                    Some(id) => read_node(tx, repo_id, id)?,
                    None => empty.clone(),
                };
                let right_child = match re.and_then(|e| e.address.as_tree_id()) {
                    Some(id) => read_node(tx, repo_id, id)?,
                    None => empty.clone(),
                };
                let base_child = match be.and_then(|e| e.address.as_tree_id()) {
                    Some(id) => read_node(tx, repo_id, id)?,
                    None => empty,
                };
                let child_path = at_path.join_tree(&PathComponent::from(name));
                out.extend(diff_dir(tx, repo_id, &left_child, &right_child, &base_child, &child_path)?);
            }
            Some(EntryType::Object) => {
                if let Some(d) = object_difference(at_path, name, le, re, be) {
                    out.push(d);
                }
            }
            None => unreachable!("name present in the union must resolve to some entry"),
        }
    }

    Ok(out)
}

fn object_difference(
    at_path: &TreePath,
    name: &str,
    left: Option<&Entry>,
    right: Option<&Entry>,
    base: Option<&Entry>,
) -> Option<Difference> {
    let la: Option<&EntryAddress> = left.map(|e| &e.address);
    let ra: Option<&EntryAddress> = right.map(|e| &e.address);
    let ba: Option<&EntryAddress> = base.map(|e| &e.address);

    if la == ba && ra == ba {
        return None;
    }

    let path = at_path.join_object(&PathComponent::from(name)).as_internal_string();

    let kind_for = |present: Option<&EntryAddress>| -> DifferenceKind {
        match (ba, present) {
            (None, Some(_)) => DifferenceKind::Added,
            (Some(_), None) => DifferenceKind::Removed,
            (Some(_), Some(_)) => DifferenceKind::Changed,
            (None, None) => unreachable!("at least one side differs from base"),
        }
    };

    let (kind, direction) = if la == ba && ra != ba {
        (kind_for(ra), MergeDirection::Right)
    } else if ra == ba && la != ba {
        (kind_for(la), MergeDirection::Left)
    } else if la == ra {
        // Both sides made the identical change independently: not a
        // conflict, but neither side is authoritative either, so either
        // can be taken as the merge result.
        (kind_for(la), MergeDirection::Right)
    } else {
        (DifferenceKind::Conflict, MergeDirection::Conflict)
    };

    Some(Difference {
        path,
        path_type: EntryType::Object,
        kind,
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::ids::ObjectId;
    use crate::merkle::MerkleTree;
    use crate::model::WorkspaceEntry;
    use crate::repo_path::ObjectPath;
    use crate::testing::MemoryStoreHarness;
    use crate::clock::Timestamp;

    fn entry(name: &str, seed: u8) -> Entry {
        Entry {
            name: name.to_string(),
            address: EntryAddress::Object(ObjectId::from_bytes(vec![seed; 4])),
            creation_date: Timestamp::from_millis(1, 0),
            size: seed as u64,
            checksum: format!("c{seed}"),
        }
    }

    fn build(
        h: &mut MemoryStoreHarness,
        repo: &crate::ids::RepoId,
        branch: &crate::ids::BranchId,
        changes: &[(&str, Option<u8>)],
    ) -> TreeId {
        let mut tx = h.tx();
        let mut tree = MerkleTree::empty();
        for (path, seed) in changes {
            let p = ObjectPath::parse(path).unwrap();
            let we = match seed {
                Some(s) => WorkspaceEntry::insert(repo.clone(), branch.clone(), p.clone(), entry(p.base_name().as_str(), *s)),
                None => WorkspaceEntry::tombstone(repo.clone(), branch.clone(), p.clone()),
            };
            tree = tree.update(&mut *tx, repo, &[we]).unwrap();
        }
        tree.root().clone()
    }

    #[test]
    fn unchanged_path_produces_no_difference() {
        let mut h = MemoryStoreHarness::new();
        let (repo, branch) = h.repo_and_branch("r1", "master");
        let base = build(&mut h, &repo, &branch, &[("a.txt", Some(1))]);
        let mut tx = h.tx();
        let diffs = diff(&mut *tx, &repo, &base, &base, &base).unwrap();
        assert!(diffs.is_empty());
    }

    #[test]
    fn change_on_one_side_reports_direction() {
        let mut h = MemoryStoreHarness::new();
        let (repo, branch) = h.repo_and_branch("r1", "master");
        let base = build(&mut h, &repo, &branch, &[("a.txt", Some(1))]);
        let left = base.clone();
        let right = build(&mut h, &repo, &branch, &[("a.txt", Some(1)), ("a.txt", Some(2))]);
        let mut tx = h.tx();
        let diffs = diff(&mut *tx, &repo, &left, &right, &base).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].direction, MergeDirection::Right);
        assert_eq!(diffs[0].kind, DifferenceKind::Changed);
    }

    #[test]
    fn divergent_changes_are_conflicts() {
        let mut h = MemoryStoreHarness::new();
        let (repo, branch) = h.repo_and_branch("r1", "master");
        let base = build(&mut h, &repo, &branch, &[("a.txt", Some(1))]);
        let left = build(&mut h, &repo, &branch, &[("a.txt", Some(1)), ("a.txt", Some(2))]);
        let right = build(&mut h, &repo, &branch, &[("a.txt", Some(1)), ("a.txt", Some(3))]);
        let mut tx = h.tx();
        let diffs = diff(&mut *tx, &repo, &left, &right, &base).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].direction, MergeDirection::Conflict);
        assert_eq!(diffs[0].kind, DifferenceKind::Conflict);
    }

    #[test]
    fn addition_and_removal_are_detected() {
        let mut h = MemoryStoreHarness::new();
        let (repo, branch) = h.repo_and_branch("r1", "master");
        let base = build(&mut h, &repo, &branch, &[("a.txt", Some(1)), ("b.txt", Some(2))]);
        let left = base.clone();
        let right = build(
            &mut h,
            &repo,
            &branch,
            &[("a.txt", Some(1)), ("b.txt", Some(2)), ("b.txt", None), ("c.txt", Some(3))],
        );
        let mut tx = h.tx();
        let mut diffs = diff(&mut *tx, &repo, &left, &right, &base).unwrap();
        diffs.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].kind, DifferenceKind::Removed);
        assert_eq!(diffs[1].kind, DifferenceKind::Added);
    }
}
