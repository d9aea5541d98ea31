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

//! The index façade: the one surface most callers use. Everything here
//! validates its arguments before ever opening a transaction, then
//! delegates to [`crate::merkle`], [`crate::dag`], [`crate::workspace`],
//! [`crate::merge`], and [`crate::refs`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rand::RngCore;
use tracing::instrument;

use crate::clock::Clock;
use crate::content_hash::blake2b_hash;
use crate::dag::commit_scan;
use crate::error::{IndexError, StoreError, ValidationError};
use crate::ids::{BranchId, CommitId, ObjectId, RepoId};
use crate::merge::merge;
use crate::merkle::diff::{diff, Difference};
use crate::merkle::MerkleTree;
use crate::model::{
    Branch, Commit, Entry, EntryType, Object, Reference, Repo, Root, WorkspaceEntry, DEFAULT_BRANCH,
    DEFAULT_PARTIAL_COMMIT_RATIO,
};
use crate::refs::{resolve_ref, validate_branch_id};
use crate::repo_path::{ObjectPath, TreePath};
use crate::store::{Page, Store, Transaction, TransactOptions};
use crate::workspace::{partial_commit, should_partially_commit, write_entry_to_workspace};

/// The versioned metadata index. Generic over the store implementation;
/// time and randomness are injected as trait objects so callers can swap
/// them without adding a type parameter for each.
pub struct Index<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl<S: Store> Index<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, rng: Box<dyn RngCore + Send>) -> Self {
        Index {
            store,
            clock,
            rng: Mutex::new(rng),
        }
    }

    fn read_branch_checked(
        &self,
        tx: &mut dyn Transaction,
        repo_id: &RepoId,
        branch_id: &BranchId,
    ) -> Result<Branch, IndexError> {
        tx.read_branch(repo_id, branch_id).map_err(|e| match e {
            StoreError::NotFound => IndexError::BranchNotFound,
            other => IndexError::Store(other),
        })
    }

    fn maybe_flush(&self, tx: &mut dyn Transaction, repo: &Repo, branch_id: &BranchId) -> Result<(), IndexError> {
        let mut rng = self.rng.lock().expect("rng mutex poisoned");
        if should_partially_commit(repo, &mut *rng) {
            partial_commit(tx, &repo.id, branch_id)?;
        }
        Ok(())
    }

    // ---- Repos ----------------------------------------------------

    #[instrument(skip(self))]
    pub fn create_repo(&self, id: &str, storage_namespace: String) -> Result<Repo, IndexError> {
        let repo_id = RepoId::new(id)?;
        let now = self.clock.now();
        let default_branch = BranchId::new_unchecked(DEFAULT_BRANCH);
        let repo = Repo {
            id: repo_id.clone(),
            storage_namespace,
            creation_date: now,
            default_branch: default_branch.clone(),
            partial_commit_ratio: DEFAULT_PARTIAL_COMMIT_RATIO,
        };
        let empty_root = MerkleTree::empty().root().clone();
        self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
            let genesis = Commit::new(empty_root.clone(), Vec::new(), "system".to_string(), "genesis".to_string(), now, BTreeMap::new());
            tx.write_commit(&repo_id, &genesis).map_err(IndexError::Store)?;
            let branch = Branch {
                id: default_branch.clone(),
                repository_id: repo_id.clone(),
                commit_id: genesis.address,
                commit_root: empty_root.clone(),
                workspace_root: empty_root.clone(),
            };
            tx.write_branch(&branch).map_err(IndexError::Store)?;
            tx.write_repo(&repo).map_err(IndexError::Store)?;
            Ok(())
        })?;
        Ok(repo)
    }

    #[instrument(skip(self))]
    pub fn get_repo(&self, id: &str) -> Result<Repo, IndexError> {
        let repo_id = RepoId::new(id)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_only(), |tx| {
            tx.read_repo(&repo_id).map_err(|e| match e {
                StoreError::NotFound => IndexError::NotFound,
                other => IndexError::Store(other),
            })
        })
    }

    #[instrument(skip(self))]
    pub fn list_repos(&self, after: Option<&str>, amount: usize) -> Result<Page<Repo>, IndexError> {
        let after = after.map(RepoId::new).transpose()?;
        self.store.transact(TransactOptions::read_only(), |tx| {
            tx.list_repos(after.as_ref(), amount).map_err(IndexError::Store)
        })
    }

    #[instrument(skip(self))]
    pub fn delete_repo(&self, id: &str) -> Result<(), IndexError> {
        let repo_id = RepoId::new(id)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
            tx.delete_repo(&repo_id).map_err(|e| match e {
                StoreError::NotFound => IndexError::NotFound,
                other => IndexError::Store(other),
            })
        })
    }

    // ---- Branches ---------------------------------------------------

    #[instrument(skip(self))]
    pub fn create_branch(&self, repo_id: &str, branch_id: &str, source_ref: &str) -> Result<Branch, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let branch_id = validate_branch_id(branch_id)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
            if tx.read_branch(&repo_id, &branch_id).is_ok() {
                return Err(IndexError::BranchAlreadyExists);
            }
            let source = resolve_ref(tx, &repo_id, source_ref)?;
            let (commit_id, tree) = match &source {
                Reference::Commit(c) => (c.address.clone(), c.tree.clone()),
                Reference::Branch { branch, .. } => (branch.commit_id.clone(), branch.commit_root.clone()),
            };
            let branch = Branch {
                id: branch_id.clone(),
                repository_id: repo_id.clone(),
                commit_id,
                commit_root: tree.clone(),
                workspace_root: tree,
            };
            tx.write_branch(&branch).map_err(IndexError::Store)?;
            Ok(branch)
        })
    }

    #[instrument(skip(self))]
    pub fn get_branch(&self, repo_id: &str, branch_id: &str) -> Result<Branch, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let branch_id = validate_branch_id(branch_id)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_only(), |tx| {
            self.read_branch_checked(tx, &repo_id, &branch_id)
        })
    }

    #[instrument(skip(self))]
    pub fn delete_branch(&self, repo_id: &str, branch_id: &str) -> Result<(), IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let branch_id = validate_branch_id(branch_id)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
            tx.clear_workspace(&repo_id, &branch_id).map_err(IndexError::Store)?;
            tx.delete_branch(&repo_id, &branch_id).map_err(|e| match e {
                StoreError::NotFound => IndexError::BranchNotFound,
                other => IndexError::Store(other),
            })
        })
    }

    #[instrument(skip(self))]
    pub fn list_branches_by_prefix(&self, repo_id: &str, prefix: &str, after: Option<&str>, amount: usize) -> Result<Page<Branch>, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_only(), |tx| {
            tx.read_repo(&repo_id).map_err(|e| match e {
                StoreError::NotFound => IndexError::NotFound,
                other => IndexError::Store(other),
            })?;
            let mut matches = Vec::new();
            let mut cursor = after.map(BranchId::new_unchecked);
            let mut has_more = false;
            loop {
                let page = tx.list_branches(&repo_id, cursor.as_ref(), 256).map_err(IndexError::Store)?;
                let exhausted = page.items.is_empty();
                for branch in page.items {
                    cursor = Some(branch.id.clone());
                    if branch.id.as_str().starts_with(prefix) {
                        if matches.len() == amount {
                            has_more = true;
                            break;
                        }
                        matches.push(branch);
                    }
                }
                if has_more || exhausted || !page.has_more {
                    break;
                }
            }
            Ok(Page::new(matches, has_more))
        })
    }

    /// Clears the workspace and sets `workspaceRoot = commitRoot`. Shared
    /// by `reset_branch` and `revert_path(root)`, which is spec'd to be
    /// the same operation under another name.
    fn reset_branch_in_tx(
        &self,
        tx: &mut dyn Transaction,
        repo_id: &RepoId,
        branch_id: &BranchId,
    ) -> Result<Branch, IndexError> {
        let mut branch = self.read_branch_checked(tx, repo_id, branch_id)?;
        tx.clear_workspace(repo_id, branch_id).map_err(IndexError::Store)?;
        branch.workspace_root = branch.commit_root.clone();
        tx.write_branch(&branch).map_err(IndexError::Store)?;
        Ok(branch)
    }

    #[instrument(skip(self))]
    pub fn reset_branch(&self, repo_id: &str, branch_id: &str) -> Result<Branch, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let branch_id = validate_branch_id(branch_id)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
            self.reset_branch_in_tx(tx, &repo_id, &branch_id)
        })
    }

    // ---- Reads --------------------------------------------------------

    /// The tree a reference is read through: a commit reference always
    /// reads its own tree; a branch reference reads `workspaceRoot` when
    /// `read_uncommitted`, else the last-committed `commitRoot`.
    fn view_tree(reference: &Reference, read_uncommitted: bool) -> crate::ids::TreeId {
        match reference {
            Reference::Commit(c) => c.tree.clone(),
            Reference::Branch { branch, .. } => {
                if read_uncommitted {
                    branch.workspace_root.clone()
                } else {
                    branch.commit_root.clone()
                }
            }
        }
    }

    fn read_entry_typed(
        &self,
        repo_id: &str,
        reference: &str,
        path: &str,
        read_uncommitted: bool,
        expected: Option<EntryType>,
    ) -> Result<Entry, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let object_path = ObjectPath::parse(path)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_only(), |tx| {
            let resolved = resolve_ref(tx, &repo_id, reference)?;
            if read_uncommitted {
                if let Reference::Branch { branch, .. } = &resolved {
                    if let Some(overlay) = tx.read_workspace_entry(&repo_id, &branch.id, &object_path).map_err(IndexError::Store)? {
                        return overlay.as_entry().ok_or(IndexError::NotFound);
                    }
                }
            }
            let tree = MerkleTree::new(Self::view_tree(&resolved, read_uncommitted));
            match expected {
                Some(expected) => tree.get_entry(tx, &repo_id, &object_path, expected),
                None => tree.get_entry_any(tx, &repo_id, &object_path),
            }
        })
    }

    /// Type-agnostic entry lookup: returns whatever `path` names, object or
    /// nested tree.
    #[instrument(skip(self))]
    pub fn read_entry(&self, repo_id: &str, reference: &str, path: &str, read_uncommitted: bool) -> Result<Entry, IndexError> {
        self.read_entry_typed(repo_id, reference, path, read_uncommitted, None)
    }

    #[instrument(skip(self))]
    pub fn read_entry_object(&self, repo_id: &str, reference: &str, path: &str, read_uncommitted: bool) -> Result<Entry, IndexError> {
        self.read_entry_typed(repo_id, reference, path, read_uncommitted, Some(EntryType::Object))
    }

    #[instrument(skip(self))]
    pub fn read_entry_tree(&self, repo_id: &str, reference: &str, path: &str, read_uncommitted: bool) -> Result<Entry, IndexError> {
        self.read_entry_typed(repo_id, reference, path, read_uncommitted, Some(EntryType::Tree))
    }

    #[instrument(skip(self))]
    pub fn read_object(&self, repo_id: &str, reference: &str, path: &str, read_uncommitted: bool) -> Result<Object, IndexError> {
        let entry = self.read_entry_object(repo_id, reference, path, read_uncommitted)?;
        let repo_id = RepoId::new(repo_id)?;
        let object_id = entry.address.as_object_id().expect("checked by read_entry_object").clone();
        self.store.repo_transact(&repo_id, TransactOptions::read_only(), |tx| {
            tx.read_object(&repo_id, &object_id).map_err(|e| match e {
                StoreError::NotFound => IndexError::NotFound,
                other => IndexError::Store(other),
            })
        })
    }

    /// Returns the `Root` record for the tree that `reference`'s resolved
    /// commit points at.
    #[instrument(skip(self))]
    pub fn read_root_object(&self, repo_id: &str, reference: &str) -> Result<Root, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_only(), |tx| {
            let resolved = resolve_ref(tx, &repo_id, reference)?;
            let tree = resolved.commit().tree.clone();
            tx.read_root(&repo_id, &tree).map_err(|e| match e {
                StoreError::NotFound => IndexError::NotFound,
                other => IndexError::Store(other),
            })
        })
    }

    #[instrument(skip(self))]
    pub fn list_objects_by_prefix(
        &self,
        repo_id: &str,
        reference: &str,
        prefix: &str,
        after: Option<&str>,
        amount: usize,
        descend: bool,
    ) -> Result<Page<(String, Entry)>, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let tree_path = TreePath::parse(prefix);
        self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
            let resolved = resolve_ref(tx, &repo_id, reference)?;
            let root = match &resolved {
                Reference::Commit(c) => c.tree.clone(),
                Reference::Branch { branch, .. } => {
                    partial_commit(tx, &repo_id, &branch.id)?;
                    self.read_branch_checked(tx, &repo_id, &branch.id)?.workspace_root
                }
            };
            MerkleTree::new(root).prefix_scan(tx, &repo_id, &tree_path, after, amount, descend)
        })
    }

    // ---- Writes ---------------------------------------------------

    #[instrument(skip(self, metadata))]
    pub fn write_object(
        &self,
        repo_id: &str,
        branch_id: &str,
        path: &str,
        size: u64,
        checksum: String,
        physical_address: String,
        metadata: BTreeMap<String, String>,
    ) -> Result<Object, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let branch_id = validate_branch_id(branch_id)?;
        let object_path = ObjectPath::parse(path)?;
        let now = self.clock.now();
        self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
            let repo = tx.read_repo(&repo_id).map_err(|e| match e {
                StoreError::NotFound => IndexError::NotFound,
                other => IndexError::Store(other),
            })?;
            self.read_branch_checked(tx, &repo_id, &branch_id)?;
            let object = Object::new(size, checksum, physical_address, metadata);
            tx.write_object(&repo_id, &object).map_err(IndexError::Store)?;
            let entry = Entry {
                name: object_path.base_name().as_str().to_string(),
                address: crate::model::EntryAddress::Object(object.address.clone()),
                creation_date: now,
                size: object.size,
                checksum: object.checksum.clone(),
            };
            let staged = WorkspaceEntry::insert(repo_id.clone(), branch_id.clone(), object_path, entry);
            write_entry_to_workspace(tx, &staged)?;
            self.maybe_flush(tx, &repo, &branch_id)?;
            Ok(object)
        })
    }

    /// Convenience wrapper: hashes `content` itself rather than requiring
    /// the caller to already know its checksum. The physical blob store is
    /// out of scope, so the physical address is synthesized from the
    /// content hash.
    #[instrument(skip(self, content))]
    pub fn write_file(&self, repo_id: &str, branch_id: &str, path: &str, content: &[u8]) -> Result<Object, IndexError> {
        let checksum = hex::encode(blake2b_hash(content));
        let physical_address = format!("inline:{checksum}");
        self.write_object(repo_id, branch_id, path, content.len() as u64, checksum, physical_address, BTreeMap::new())
    }

    /// Links an already-stored object to a new path, without creating a
    /// new `Object` record.
    #[instrument(skip(self))]
    pub fn write_entry(&self, repo_id: &str, branch_id: &str, path: &str, object_id: &str) -> Result<(), IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let branch_id = validate_branch_id(branch_id)?;
        let object_path = ObjectPath::parse(path)?;
        let object_id = ObjectId::from_hex(object_id)?;
        let now = self.clock.now();
        self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
            self.read_branch_checked(tx, &repo_id, &branch_id)?;
            let object = tx.read_object(&repo_id, &object_id).map_err(|e| match e {
                StoreError::NotFound => IndexError::NotFound,
                other => IndexError::Store(other),
            })?;
            let entry = Entry {
                name: object_path.base_name().as_str().to_string(),
                address: crate::model::EntryAddress::Object(object.address),
                creation_date: now,
                size: object.size,
                checksum: object.checksum,
            };
            let staged = WorkspaceEntry::insert(repo_id.clone(), branch_id.clone(), object_path, entry);
            write_entry_to_workspace(tx, &staged)
        })
    }

    #[instrument(skip(self))]
    pub fn delete_object(&self, repo_id: &str, branch_id: &str, path: &str) -> Result<(), IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let branch_id = validate_branch_id(branch_id)?;
        let object_path = ObjectPath::parse(path)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
            let branch = self.read_branch_checked(tx, &repo_id, &branch_id)?;
            let overlay = tx.read_workspace_entry(&repo_id, &branch_id, &object_path).map_err(IndexError::Store)?;
            let in_tree = MerkleTree::new(branch.workspace_root.clone())
                .get_entry(tx, &repo_id, &object_path, EntryType::Object)
                .is_ok();

            match (&overlay, in_tree) {
                (None, false) => Err(IndexError::NotFound),
                (Some(e), _) if e.tombstone => Err(IndexError::NotFound),
                (Some(_), false) => tx.delete_workspace_entry(&repo_id, &branch_id, &object_path).map_err(IndexError::Store),
                (_, true) => {
                    let tombstone = WorkspaceEntry::tombstone(repo_id.clone(), branch_id.clone(), object_path.clone());
                    write_entry_to_workspace(tx, &tombstone)
                }
            }
        })
    }

    // ---- History ----------------------------------------------------

    #[instrument(skip(self))]
    pub fn get_commit(&self, repo_id: &str, reference: &str) -> Result<Commit, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_only(), |tx| {
            Ok(resolve_ref(tx, &repo_id, reference)?.commit().clone())
        })
    }

    #[instrument(skip(self))]
    pub fn get_commit_log(&self, repo_id: &str, reference: &str, after: Option<&str>, amount: usize) -> Result<Page<Commit>, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let after = after.map(CommitId::from_hex).transpose()?;
        self.store.repo_transact(&repo_id, TransactOptions::read_only(), |tx| {
            let head = resolve_ref(tx, &repo_id, reference)?.commit().address.clone();
            commit_scan(tx, &repo_id, &head, after.as_ref(), amount)
        })
    }

    #[instrument(skip(self))]
    pub fn commit(&self, repo_id: &str, branch_id: &str, committer: String, message: String, metadata: BTreeMap<String, String>) -> Result<Commit, IndexError> {
        if message.is_empty() {
            return Err(IndexError::Validation(ValidationError::EmptyCommitMessage));
        }
        let repo_id = RepoId::new(repo_id)?;
        let branch_id = validate_branch_id(branch_id)?;
        let now = self.clock.now();
        self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
            partial_commit(tx, &repo_id, &branch_id)?;
            let mut branch = self.read_branch_checked(tx, &repo_id, &branch_id)?;
            let new_commit = Commit::new(branch.workspace_root.clone(), vec![branch.commit_id.clone()], committer, message.clone(), now, metadata);
            tx.write_commit(&repo_id, &new_commit).map_err(IndexError::Store)?;
            let size = MerkleTree::new(new_commit.tree.clone()).total_size(tx, &repo_id)?;
            let root = crate::model::Root {
                address: new_commit.tree.clone(),
                repository_id: repo_id.clone(),
                creation_date: now,
                size,
            };
            tx.write_root(&repo_id, &root).map_err(IndexError::Store)?;
            branch.commit_id = new_commit.address.clone();
            branch.commit_root = new_commit.tree.clone();
            tx.write_branch(&branch).map_err(IndexError::Store)?;
            Ok(new_commit)
        })
    }

    #[instrument(skip(self))]
    pub fn revert_commit(&self, repo_id: &str, branch_id: &str, target_ref: &str, committer: String) -> Result<Commit, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let branch_id = validate_branch_id(branch_id)?;
        let now = self.clock.now();
        self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
            let mut branch = self.read_branch_checked(tx, &repo_id, &branch_id)?;
            if !branch.is_at_commit_root() {
                return Err(IndexError::DestinationNotCommitted);
            }
            let target = resolve_ref(tx, &repo_id, target_ref)?.commit().clone();
            let commit = Commit::new(
                target.tree.clone(),
                vec![branch.commit_id.clone()],
                committer,
                format!("Revert to {}", target.address.hex()),
                now,
                BTreeMap::new(),
            );
            tx.write_commit(&repo_id, &commit).map_err(IndexError::Store)?;
            branch.commit_id = commit.address.clone();
            branch.commit_root = target.tree.clone();
            branch.workspace_root = target.tree;
            tx.write_branch(&branch).map_err(IndexError::Store)?;
            Ok(commit)
        })
    }

    #[instrument(skip(self))]
    pub fn revert_path(&self, repo_id: &str, branch_id: &str, path: &str, target_ref: &str) -> Result<(), IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let branch_id = validate_branch_id(branch_id)?;

        // RevertPath(root) is ResetBranch under another name (spec.md
        // §4.8, §4.10): check before `ObjectPath::parse`, which rejects
        // the empty/root string outright.
        if TreePath::parse(path).is_root() {
            return self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
                self.reset_branch_in_tx(tx, &repo_id, &branch_id).map(|_| ())
            });
        }

        let object_path = ObjectPath::parse(path)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
            let branch = self.read_branch_checked(tx, &repo_id, &branch_id)?;
            let target = resolve_ref(tx, &repo_id, target_ref)?;
            let target_tree = Self::view_tree(&target, true);
            match MerkleTree::new(target_tree).get_entry(tx, &repo_id, &object_path, EntryType::Object) {
                Ok(entry) => {
                    let staged = WorkspaceEntry::insert(repo_id.clone(), branch_id.clone(), object_path, entry);
                    write_entry_to_workspace(tx, &staged)
                }
                Err(IndexError::NotFound) => {
                    MerkleTree::new(branch.workspace_root.clone()).get_entry(tx, &repo_id, &object_path, EntryType::Object)?;
                    let staged = WorkspaceEntry::tombstone(repo_id.clone(), branch_id.clone(), object_path);
                    write_entry_to_workspace(tx, &staged)
                }
                Err(other) => Err(other),
            }
        })
    }

    // ---- Diff & merge -------------------------------------------------

    #[instrument(skip(self))]
    pub fn diff_workspace(&self, repo_id: &str, branch_id: &str) -> Result<Vec<Difference>, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let branch_id = validate_branch_id(branch_id)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_only(), |tx| {
            let branch = self.read_branch_checked(tx, &repo_id, &branch_id)?;
            diff(tx, &repo_id, &branch.workspace_root, &branch.commit_root, &branch.commit_root)
        })
    }

    #[instrument(skip(self))]
    pub fn diff(&self, repo_id: &str, left_ref: &str, right_ref: &str) -> Result<Vec<Difference>, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_only(), |tx| {
            let left = resolve_ref(tx, &repo_id, left_ref)?;
            let right = resolve_ref(tx, &repo_id, right_ref)?;
            let base_id = crate::dag::find_lowest_common_ancestor(tx, &repo_id, &left.commit().address, &right.commit().address)?;
            let base_tree = tx.read_commit(&repo_id, &base_id).map_err(IndexError::Store)?.tree;
            let left_tree = Self::view_tree(&left, true);
            let right_tree = Self::view_tree(&right, true);
            diff(tx, &repo_id, &left_tree, &right_tree, &base_tree)
        })
    }

    #[instrument(skip(self, committer))]
    pub fn merge(&self, repo_id: &str, source_branch: &str, destination_branch: &str, committer: String) -> Result<Commit, IndexError> {
        let repo_id = RepoId::new(repo_id)?;
        let source_id = validate_branch_id(source_branch)?;
        let destination_id = validate_branch_id(destination_branch)?;
        self.store.repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
            merge(tx, &repo_id, &source_id, &destination_id, committer, self.clock.as_ref())
        })
    }
}
