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

//! Immutable, content-addressed directory trees and the operators that
//! mutate, walk, and compare them.

pub mod diff;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::content_hash::{ContentHash, DigestUpdate};
use crate::error::{IndexError, StoreError};
use crate::ids::{RepoId, TreeId};
use crate::model::{Entry, EntryAddress, EntryType, Object, WorkspaceEntry};
use crate::repo_path::{ObjectPath, PathComponent, TreePath};
use crate::store::{Page, Transaction};

/// One addressable directory: a set of `(name, entry)` children. Two
/// `TreeNode`s with the same logical children always have the same
/// address, regardless of the order children were inserted in, because
/// the `BTreeMap` already orders them by name before hashing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub address: TreeId,
    pub children: BTreeMap<String, Entry>,
}

struct TreeNodeContent<'a> {
    children: &'a BTreeMap<String, Entry>,
}

impl ContentHash for TreeNodeContent<'_> {
    fn hash(&self, state: &mut impl DigestUpdate) {
        state.update(&(self.children.len() as u64).to_le_bytes());
        for (name, entry) in self.children {
            name.hash(state);
            entry.hash(state);
        }
    }
}

impl TreeNode {
    pub fn new(children: BTreeMap<String, Entry>) -> Self {
        let address = TreeId::of(&TreeNodeContent { children: &children });
        TreeNode { address, children }
    }

    pub fn empty() -> Self {
        TreeNode::new(BTreeMap::new())
    }
}

/// A tree identified by the address of its root node. Mutating it never
/// touches a stored node in place; every operation returns the address of
/// a newly-written (possibly pre-existing, if content was unchanged)
/// root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    root: TreeId,
}

impl MerkleTree {
    pub fn new(root: TreeId) -> Self {
        MerkleTree { root }
    }

    pub fn empty() -> Self {
        MerkleTree::new(TreeNode::empty().address)
    }

    pub fn root(&self) -> &TreeId {
        &self.root
    }

    fn read_node(
        &self,
        tx: &mut dyn Transaction,
        repo_id: &RepoId,
        address: &TreeId,
    ) -> Result<TreeNode, IndexError> {
        if *address == TreeNode::empty().address {
            return Ok(TreeNode::empty());
        }
        tx.read_tree_node(repo_id, address).map_err(|e| match e {
            StoreError::NotFound => IndexError::NotFound,
            other => IndexError::Store(other),
        })
    }

    /// Walks `path`'s components from the root, returning the final
    /// `Entry` regardless of whether it names an object or a nested tree.
    pub fn get_entry_any(
        &self,
        tx: &mut dyn Transaction,
        repo_id: &RepoId,
        path: &ObjectPath,
    ) -> Result<Entry, IndexError> {
        let mut node = self.read_node(tx, repo_id, &self.root)?;
        let components = path.components();
        for component in &components[..components.len() - 1] {
            let entry = node
                .children
                .get(component.as_str())
                .ok_or(IndexError::NotFound)?;
            let child_tree = entry.address.as_tree_id().ok_or(IndexError::NotFound)?;
            node = self.read_node(tx, repo_id, child_tree)?;
        }
        let last = components.last().expect("object path has a basename");
        node.children.get(last.as_str()).cloned().ok_or(IndexError::NotFound)
    }

    /// Same as [`Self::get_entry_any`], but requires the final component's
    /// entry type to match `expected`.
    pub fn get_entry(
        &self,
        tx: &mut dyn Transaction,
        repo_id: &RepoId,
        path: &ObjectPath,
        expected: EntryType,
    ) -> Result<Entry, IndexError> {
        let entry = self.get_entry_any(tx, repo_id, path)?;
        if entry.entry_type() != expected {
            return Err(IndexError::NotFound);
        }
        Ok(entry)
    }

    pub fn get_object(
        &self,
        tx: &mut dyn Transaction,
        repo_id: &RepoId,
        path: &ObjectPath,
    ) -> Result<Object, IndexError> {
        let entry = self.get_entry(tx, repo_id, path, EntryType::Object)?;
        let object_id = entry.address.as_object_id().expect("checked by get_entry");
        tx.read_object(repo_id, object_id).map_err(|e| match e {
            StoreError::NotFound => IndexError::NotFound,
            other => IndexError::Store(other),
        })
    }

    /// Applies a batch of staged changes and returns the tree rooted at
    /// the resulting address. Tombstones remove a path; everything else
    /// inserts or overwrites it. Directories left empty by a removal are
    /// collapsed out of their parent rather than persisted as empty
    /// nodes.
    pub fn update(
        &self,
        tx: &mut dyn Transaction,
        repo_id: &RepoId,
        entries: &[WorkspaceEntry],
    ) -> Result<MerkleTree, IndexError> {
        let refs: Vec<&WorkspaceEntry> = entries.iter().collect();
        let new_root = self.apply_at(tx, repo_id, &self.root, &TreePath::root(), &refs)?;
        Ok(MerkleTree::new(new_root))
    }

    fn apply_at(
        &self,
        tx: &mut dyn Transaction,
        repo_id: &RepoId,
        current: &TreeId,
        at_path: &TreePath,
        entries: &[&WorkspaceEntry],
    ) -> Result<TreeId, IndexError> {
        let node = self.read_node(tx, repo_id, current)?;
        let mut children = node.children;

        let mut direct: Vec<&WorkspaceEntry> = Vec::new();
        let mut deeper: BTreeMap<PathComponent, Vec<&WorkspaceEntry>> = BTreeMap::new();
        let depth = at_path.components().len();
        for entry in entries {
            let parent = entry.path.parent_path();
            if parent == *at_path {
                direct.push(entry);
            } else {
                let next = parent.components()[depth].clone();
                deeper.entry(next).or_default().push(entry);
            }
        }

        for entry in direct {
            if entry.tombstone {
                children.remove(&entry.entry_name);
            } else {
                let new_entry = entry.as_entry().ok_or(IndexError::Validation(
                    crate::error::ValidationError::EmptyField("workspace entry"),
                ))?;
                children.insert(new_entry.name.clone(), new_entry);
            }
        }

        for (component, sub_entries) in deeper {
            let child_path = at_path.join_tree(&component);
            let existing_child = match children.get(component.as_str()) {
                Some(entry) if entry.entry_type() == EntryType::Tree => {
                    entry.address.as_tree_id().expect("checked").clone()
                }
                Some(_) => TreeNode::empty().address,
                None => TreeNode::empty().address,
            };
            let new_child_address =
                self.apply_at(tx, repo_id, &existing_child, &child_path, &sub_entries)?;
            if new_child_address == TreeNode::empty().address {
                children.remove(component.as_str());
            } else {
                let child_node = self.read_node(tx, repo_id, &new_child_address)?;
                let aggregate_size: u64 = child_node.children.values().map(|e| e.size).sum();
                children.insert(
                    component.as_str().to_string(),
                    Entry {
                        name: component.as_str().to_string(),
                        address: EntryAddress::Tree(new_child_address.clone()),
                        // Directory entries are purely structural: their
                        // metadata is derived from their children so that
                        // two updates producing the same logical tree
                        // always produce the same address, independent of
                        // when each update ran.
                        creation_date: Timestamp::from_millis(0, 0),
                        size: aggregate_size,
                        checksum: new_child_address.hex(),
                    },
                );
            }
        }

        let new_node = TreeNode::new(children);
        tx.write_tree_node(repo_id, &new_node)
            .map_err(IndexError::Store)?;
        Ok(new_node.address)
    }

    /// The tree's total size: the sum of its immediate children's sizes,
    /// which for a directory child is itself already the aggregate over
    /// everything beneath it (see [`Self::apply_at`]), so no recursion is
    /// needed here.
    pub fn total_size(&self, tx: &mut dyn Transaction, repo_id: &RepoId) -> Result<u64, IndexError> {
        let root = self.read_node(tx, repo_id, &self.root)?;
        Ok(root.children.values().map(|e| e.size).sum())
    }

    /// Lists entries under `prefix`. With `descend = false`, returns
    /// immediate children (both object and tree entries). With `descend =
    /// true`, recurses and yields only object entries, in full-path
    /// lexicographic order.
    pub fn prefix_scan(
        &self,
        tx: &mut dyn Transaction,
        repo_id: &RepoId,
        prefix: &TreePath,
        from: Option<&str>,
        limit: usize,
        descend: bool,
    ) -> Result<Page<(String, Entry)>, IndexError> {
        let base = self.resolve_dir(tx, repo_id, prefix)?;
        let mut collected = Vec::new();
        if descend {
            self.collect_descend(tx, repo_id, &base, prefix, from, limit + 1, &mut collected)?;
        } else {
            for (name, entry) in &base.children {
                let full_path = format!("{}{}", prefix.as_internal_string(), name);
                if let Some(from) = from {
                    if full_path.as_str() <= from {
                        continue;
                    }
                }
                collected.push((full_path, entry.clone()));
                if collected.len() > limit {
                    break;
                }
            }
        }
        let has_more = collected.len() > limit;
        collected.truncate(limit);
        Ok(Page::new(collected, has_more))
    }

    fn resolve_dir(
        &self,
        tx: &mut dyn Transaction,
        repo_id: &RepoId,
        path: &TreePath,
    ) -> Result<TreeNode, IndexError> {
        let mut node = self.read_node(tx, repo_id, &self.root)?;
        for component in path.components() {
            let entry = match node.children.get(component.as_str()) {
                Some(e) => e,
                None => return Ok(TreeNode::empty()),
            };
            let child = match entry.address.as_tree_id() {
                Some(id) => id,
                None => return Ok(TreeNode::empty()),
            };
            node = self.read_node(tx, repo_id, child)?;
        }
        Ok(node)
    }

    fn collect_descend(
        &self,
        tx: &mut dyn Transaction,
        repo_id: &RepoId,
        node: &TreeNode,
        at_path: &TreePath,
        from: Option<&str>,
        remaining: usize,
        out: &mut Vec<(String, Entry)>,
    ) -> Result<(), IndexError> {
        for (name, entry) in &node.children {
            if out.len() >= remaining {
                return Ok(());
            }
            match entry.entry_type() {
                EntryType::Object => {
                    let full_path = format!("{}{}", at_path.as_internal_string(), name);
                    if let Some(from) = from {
                        if full_path.as_str() <= from {
                            continue;
                        }
                    }
                    out.push((full_path, entry.clone()));
                }
                EntryType::Tree => {
                    let child_id = entry.address.as_tree_id().expect("checked");
                    let child_path = at_path.join_tree(&PathComponent::from(name.as_str()));
                    // Prune subtrees entirely below the cursor.
                    if let Some(from) = from {
                        let child_prefix = child_path.as_internal_string();
                        if !child_prefix.as_str().starts_with(from)
                            && child_prefix.as_str() < from
                            && !from.starts_with(child_prefix.as_str())
                        {
                            continue;
                        }
                    }
                    let child_node = self.read_node(tx, repo_id, child_id)?;
                    self.collect_descend(tx, repo_id, &child_node, &child_path, from, remaining, out)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::error::ValidationError;
    use crate::ids::ObjectId;
    use crate::testing::MemoryStoreHarness;

    fn object_entry(name: &str, seed: u8) -> Entry {
        Entry {
            name: name.to_string(),
            address: EntryAddress::Object(ObjectId::from_bytes(vec![seed; 4])),
            creation_date: Timestamp::from_millis(1, 0),
            size: seed as u64,
            checksum: format!("c{seed}"),
        }
    }

    fn insert(repo: &crate::ids::RepoId, branch: &crate::ids::BranchId, path: &str, seed: u8) -> WorkspaceEntry {
        let p = ObjectPath::parse(path).unwrap();
        let entry = Entry { name: p.base_name().as_str().to_string(), ..object_entry(p.base_name().as_str(), seed) };
        WorkspaceEntry::insert(repo.clone(), branch.clone(), p, entry)
    }

    fn tombstone(repo: &crate::ids::RepoId, branch: &crate::ids::BranchId, path: &str) -> WorkspaceEntry {
        WorkspaceEntry::tombstone(repo.clone(), branch.clone(), ObjectPath::parse(path).unwrap())
    }

    #[test]
    fn update_then_get_object_roundtrip() {
        let mut h = MemoryStoreHarness::new();
        let (repo, branch) = h.repo_and_branch("r1", "master");
        let mut tx = h.tx();
        let tree = MerkleTree::empty();
        let e = insert(&repo, &branch, "a/b.txt", 7);
        let tree2 = tree.update(&mut *tx, &repo, &[e]).unwrap();
        let obj_entry = tree2
            .get_entry(&mut *tx, &repo, &ObjectPath::parse("a/b.txt").unwrap(), EntryType::Object)
            .unwrap();
        assert_eq!(obj_entry.name, "b.txt");
    }

    #[test]
    fn update_is_idempotent() {
        let mut h = MemoryStoreHarness::new();
        let (repo, branch) = h.repo_and_branch("r1", "master");
        let mut tx = h.tx();
        let tree = MerkleTree::empty();
        let e = insert(&repo, &branch, "a.txt", 3);
        let once = tree.update(&mut *tx, &repo, &[e.clone()]).unwrap();
        let twice = once.update(&mut *tx, &repo, &[e]).unwrap();
        assert_eq!(once.root(), twice.root());
    }

    #[test]
    fn tombstone_cancels_insert() {
        let mut h = MemoryStoreHarness::new();
        let (repo, branch) = h.repo_and_branch("r1", "master");
        let mut tx = h.tx();
        let tree = MerkleTree::empty();
        let e = insert(&repo, &branch, "a.txt", 3);
        let inserted = tree.update(&mut *tx, &repo, &[e]).unwrap();
        let removed = inserted
            .update(&mut *tx, &repo, &[tombstone(&repo, &branch, "a.txt")])
            .unwrap();
        assert_eq!(removed.root(), tree.root());
    }

    #[test]
    fn empty_directories_collapse() {
        let mut h = MemoryStoreHarness::new();
        let (repo, branch) = h.repo_and_branch("r1", "master");
        let mut tx = h.tx();
        let tree = MerkleTree::empty();
        let added = tree.update(&mut *tx, &repo, &[insert(&repo, &branch, "dir/file.txt", 1)]).unwrap();
        let removed = added
            .update(&mut *tx, &repo, &[tombstone(&repo, &branch, "dir/file.txt")])
            .unwrap();
        assert_eq!(removed.root(), tree.root());
        // The now-empty "dir" must not be listed.
        let page = removed
            .prefix_scan(&mut *tx, &repo, &TreePath::root(), None, 10, false)
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[test]
    fn get_entry_wrong_type_not_found() {
        let mut h = MemoryStoreHarness::new();
        let (repo, branch) = h.repo_and_branch("r1", "master");
        let mut tx = h.tx();
        let tree = MerkleTree::empty();
        let added = tree.update(&mut *tx, &repo, &[insert(&repo, &branch, "a.txt", 1)]).unwrap();
        let err = added
            .get_entry(&mut *tx, &repo, &ObjectPath::parse("a.txt").unwrap(), EntryType::Tree)
            .unwrap_err();
        assert!(matches!(err, IndexError::NotFound));
    }

    #[test]
    fn prefix_scan_pagination_matches_single_scan() {
        let mut h = MemoryStoreHarness::new();
        let (repo, branch) = h.repo_and_branch("r1", "master");
        let mut tx = h.tx();
        let mut tree = MerkleTree::empty();
        let names = ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"];
        for (i, name) in names.iter().enumerate() {
            tree = tree
                .update(&mut *tx, &repo, &[insert(&repo, &branch, name, i as u8)])
                .unwrap();
        }
        let full = tree.prefix_scan(&mut *tx, &repo, &TreePath::root(), None, 100, false).unwrap();
        assert_eq!(full.items.len(), 5);
        assert!(!full.has_more);

        let mut paged = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = tree
                .prefix_scan(&mut *tx, &repo, &TreePath::root(), cursor.as_deref(), 2, false)
                .unwrap();
            let done = !page.has_more;
            for (path, entry) in page.items {
                cursor = Some(path.clone());
                paged.push((path, entry));
            }
            if done {
                break;
            }
        }
        assert_eq!(paged, full.items);
    }

    #[test]
    fn validation_error_display_is_reasonable() {
        let e = ValidationError::EmptyField("x");
        assert!(e.to_string().contains('x'));
    }
}
