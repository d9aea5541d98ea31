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

//! Record shapes persisted through the [`crate::store::Store`] seam.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::content_hash::{ContentHash, DigestUpdate};
use crate::ids::{BranchId, CommitId, ObjectId, RepoId, TreeId};
use crate::repo_path::ObjectPath;

/// The default partial-commit probability (spec.md §6).
pub const DEFAULT_PARTIAL_COMMIT_RATIO: f64 = 0.01;

/// The default branch created by `CreateRepo`.
pub const DEFAULT_BRANCH: &str = "master";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Repo {
    pub id: RepoId,
    pub storage_namespace: String,
    pub creation_date: Timestamp,
    pub default_branch: BranchId,
    /// Read by `should_partially_commit`; see DESIGN.md for why this
    /// deviates from the letter of spec.md §9 by actually consulting the
    /// repo rather than ignoring it.
    pub partial_commit_ratio: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub repository_id: RepoId,
    pub commit_id: CommitId,
    pub commit_root: TreeId,
    pub workspace_root: TreeId,
}

impl Branch {
    /// `Clean` or `Staged` in the state machine of spec.md §4.10: the
    /// workspace has not yet been folded into a divergent root.
    pub fn is_at_commit_root(&self) -> bool {
        self.commit_root == self.workspace_root
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub address: CommitId,
    pub tree: TreeId,
    pub parents: Vec<CommitId>,
    pub committer: String,
    pub message: String,
    pub creation_date: Timestamp,
    pub metadata: BTreeMap<String, String>,
}

/// The fields hashed to produce a commit's address. Kept separate from
/// [`Commit`] so that the address field itself is never part of its own
/// hash input.
struct CommitContent<'a> {
    tree: &'a TreeId,
    parents: &'a [CommitId],
    committer: &'a str,
    message: &'a str,
    creation_date: &'a Timestamp,
    metadata: &'a BTreeMap<String, String>,
}

impl ContentHash for CommitContent<'_> {
    fn hash(&self, state: &mut impl DigestUpdate) {
        self.tree.hash(state);
        self.parents.hash(state);
        self.committer.hash(state);
        self.message.hash(state);
        self.creation_date.hash(state);
        self.metadata.hash(state);
    }
}

impl Commit {
    /// Builds a commit and assigns its address from its own content,
    /// exactly as spec.md §3 requires (`address = hash(canonical(commit
    /// without address))`).
    pub fn new(
        tree: TreeId,
        parents: Vec<CommitId>,
        committer: String,
        message: String,
        creation_date: Timestamp,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        let address = CommitId::of(&CommitContent {
            tree: &tree,
            parents: &parents,
            committer: &committer,
            message: &message,
            creation_date: &creation_date,
            metadata: &metadata,
        });
        Commit {
            address,
            tree,
            parents,
            committer,
            message,
            creation_date,
            metadata,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Root {
    pub address: TreeId,
    pub repository_id: RepoId,
    pub creation_date: Timestamp,
    pub size: u64,
}

/// One child of a [`crate::merkle::TreeNode`]: either a reference to a
/// stored `Object` or to a nested `TreeNode`. The entry type is carried by
/// which address variant is present, the same way `jj-lib`'s `TreeValue`
/// folds type and address into one enum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryAddress {
    Object(ObjectId),
    Tree(TreeId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryType {
    Object,
    Tree,
}

impl EntryAddress {
    pub fn entry_type(&self) -> EntryType {
        match self {
            EntryAddress::Object(_) => EntryType::Object,
            EntryAddress::Tree(_) => EntryType::Tree,
        }
    }

    pub fn as_object_id(&self) -> Option<&ObjectId> {
        match self {
            EntryAddress::Object(id) => Some(id),
            EntryAddress::Tree(_) => None,
        }
    }

    pub fn as_tree_id(&self) -> Option<&TreeId> {
        match self {
            EntryAddress::Tree(id) => Some(id),
            EntryAddress::Object(_) => None,
        }
    }
}

impl ContentHash for EntryAddress {
    fn hash(&self, state: &mut impl DigestUpdate) {
        match self {
            EntryAddress::Object(id) => {
                0u32.hash(state);
                id.hash(state);
            }
            EntryAddress::Tree(id) => {
                1u32.hash(state);
                id.hash(state);
            }
        }
    }
}

/// One directory entry, identified by name within its parent `TreeNode`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    pub address: EntryAddress,
    pub creation_date: Timestamp,
    pub size: u64,
    pub checksum: String,
}

impl Entry {
    pub fn entry_type(&self) -> EntryType {
        self.address.entry_type()
    }
}

impl ContentHash for Entry {
    fn hash(&self, state: &mut impl DigestUpdate) {
        self.name.hash(state);
        self.address.hash(state);
        self.creation_date.hash(state);
        self.size.hash(state);
        self.checksum.hash(state);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub address: ObjectId,
    pub size: u64,
    pub checksum: String,
    pub physical_address: String,
    pub metadata: BTreeMap<String, String>,
}

struct ObjectContent<'a> {
    size: u64,
    checksum: &'a str,
    physical_address: &'a str,
    metadata: &'a BTreeMap<String, String>,
}

impl ContentHash for ObjectContent<'_> {
    fn hash(&self, state: &mut impl DigestUpdate) {
        self.size.hash(state);
        self.checksum.hash(state);
        self.physical_address.hash(state);
        self.metadata.hash(state);
    }
}

impl Object {
    pub fn new(
        size: u64,
        checksum: String,
        physical_address: String,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        let address = ObjectId::of(&ObjectContent {
            size,
            checksum: &checksum,
            physical_address: &physical_address,
            metadata: &metadata,
        });
        Object {
            address,
            size,
            checksum,
            physical_address,
            metadata,
        }
    }
}

/// A staged change for one path on one branch. `tombstone = true` means
/// "this path is deleted relative to the committed tree"; the entry
/// fields are then not authoritative and are `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    pub repository_id: RepoId,
    pub branch_id: BranchId,
    pub path: ObjectPath,
    pub entry_name: String,
    pub entry_address: Option<EntryAddress>,
    pub entry_creation_date: Option<Timestamp>,
    pub entry_size: Option<u64>,
    pub entry_checksum: Option<String>,
    pub tombstone: bool,
}

impl WorkspaceEntry {
    pub fn insert(
        repository_id: RepoId,
        branch_id: BranchId,
        path: ObjectPath,
        entry: Entry,
    ) -> Self {
        WorkspaceEntry {
            repository_id,
            branch_id,
            path,
            entry_name: entry.name,
            entry_address: Some(entry.address),
            entry_creation_date: Some(entry.creation_date),
            entry_size: Some(entry.size),
            entry_checksum: Some(entry.checksum),
            tombstone: false,
        }
    }

    pub fn tombstone(repository_id: RepoId, branch_id: BranchId, path: ObjectPath) -> Self {
        let entry_name = path.base_name().as_str().to_string();
        WorkspaceEntry {
            repository_id,
            branch_id,
            path,
            entry_name,
            entry_address: None,
            entry_creation_date: None,
            entry_size: None,
            entry_checksum: None,
            tombstone: true,
        }
    }

    /// Reconstructs the authoritative `Entry` this workspace record
    /// stages, or `None` if it is a tombstone.
    pub fn as_entry(&self) -> Option<Entry> {
        if self.tombstone {
            return None;
        }
        Some(Entry {
            name: self.entry_name.clone(),
            address: self.entry_address.clone()?,
            creation_date: self.entry_creation_date?,
            size: self.entry_size.unwrap_or(0),
            checksum: self.entry_checksum.clone().unwrap_or_default(),
        })
    }
}

/// A resolved [`crate::refs::resolve_ref`] result: either a bare commit,
/// or a branch together with the commit at its head.
#[derive(Clone, Debug, PartialEq)]
pub enum Reference {
    Commit(Commit),
    Branch { branch: Branch, commit: Commit },
}

impl Reference {
    pub fn commit(&self) -> &Commit {
        match self {
            Reference::Commit(c) => c,
            Reference::Branch { commit, .. } => commit,
        }
    }

    pub fn branch(&self) -> Option<&Branch> {
        match self {
            Reference::Commit(_) => None,
            Reference::Branch { branch, .. } => Some(branch),
        }
    }

    pub fn is_branch(&self) -> bool {
        self.branch().is_some()
    }
}
