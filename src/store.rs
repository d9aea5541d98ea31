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

//! The transactional key-value seam. Everything in this module is an
//! interface the index façade consumes; durability, physical encoding,
//! and networked replication are the collaborator's problem, not ours
//! (spec.md §1's "out of scope" list).

use std::fmt::Debug;

use crate::error::{IndexError, StoreError};
use crate::ids::{BranchId, CommitId, ObjectId, RepoId, TreeId};
use crate::merkle::TreeNode;
use crate::model::{Branch, Commit, Object, Repo, Root, WorkspaceEntry};
use crate::repo_path::ObjectPath;

pub type StoreResult<T> = Result<T, StoreError>;

/// One page of a range scan, with the `hasMore` flag spec.md requires on
/// every paginated endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Page { items, has_more }
    }
}

/// Hints passed down to `repo_transact`/`transact`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactOptions {
    pub read_only: bool,
}

impl TransactOptions {
    pub fn read_only() -> Self {
        TransactOptions { read_only: true }
    }

    pub fn read_write() -> Self {
        TransactOptions { read_only: false }
    }
}

/// Typed access to every record kind listed in spec.md §6, scoped to a
/// single in-flight transaction. Every method here is a plain CRUD or
/// range-scan call; `&mut dyn Transaction` is intentionally
/// object-safe so the index façade never needs to know which concrete
/// `Store` opened it.
pub trait Transaction {
    fn read_repo(&mut self, id: &RepoId) -> StoreResult<Repo>;
    fn write_repo(&mut self, repo: &Repo) -> StoreResult<()>;
    fn delete_repo(&mut self, id: &RepoId) -> StoreResult<()>;
    fn list_repos(&mut self, after: Option<&RepoId>, amount: usize) -> StoreResult<Page<Repo>>;

    fn read_branch(&mut self, repo_id: &RepoId, id: &BranchId) -> StoreResult<Branch>;
    fn write_branch(&mut self, branch: &Branch) -> StoreResult<()>;
    fn delete_branch(&mut self, repo_id: &RepoId, id: &BranchId) -> StoreResult<()>;
    fn list_branches(
        &mut self,
        repo_id: &RepoId,
        after: Option<&BranchId>,
        amount: usize,
    ) -> StoreResult<Page<Branch>>;

    fn read_commit(&mut self, repo_id: &RepoId, id: &CommitId) -> StoreResult<Commit>;
    fn write_commit(&mut self, repo_id: &RepoId, commit: &Commit) -> StoreResult<()>;

    fn read_root(&mut self, repo_id: &RepoId, address: &TreeId) -> StoreResult<Root>;
    fn write_root(&mut self, repo_id: &RepoId, root: &Root) -> StoreResult<()>;

    fn read_tree_node(&mut self, repo_id: &RepoId, address: &TreeId) -> StoreResult<TreeNode>;
    fn write_tree_node(&mut self, repo_id: &RepoId, node: &TreeNode) -> StoreResult<()>;

    fn read_object(&mut self, repo_id: &RepoId, address: &ObjectId) -> StoreResult<Object>;
    fn write_object(&mut self, repo_id: &RepoId, object: &Object) -> StoreResult<()>;

    /// Advisory, per-branch, held only inside the current transaction.
    /// Serializes concurrent `partial_commit` calls against each other
    /// (spec.md §5).
    fn lock_workspace(&mut self, repo_id: &RepoId, branch_id: &BranchId) -> StoreResult<()>;
    fn list_workspace(
        &mut self,
        repo_id: &RepoId,
        branch_id: &BranchId,
    ) -> StoreResult<Vec<WorkspaceEntry>>;
    fn read_workspace_entry(
        &mut self,
        repo_id: &RepoId,
        branch_id: &BranchId,
        path: &ObjectPath,
    ) -> StoreResult<Option<WorkspaceEntry>>;
    fn write_workspace_entry(&mut self, entry: &WorkspaceEntry) -> StoreResult<()>;
    fn delete_workspace_entry(
        &mut self,
        repo_id: &RepoId,
        branch_id: &BranchId,
        path: &ObjectPath,
    ) -> StoreResult<()>;
    fn clear_workspace(&mut self, repo_id: &RepoId, branch_id: &BranchId) -> StoreResult<()>;
}

/// The collaborator that hands out transactions. Generic rather than a
/// trait object: its `repo_transact`/`transact` methods are generic over
/// the closure's return type, which an object-safe `dyn Store` could not
/// express, so callers hold a concrete `S: Store` (typically behind an
/// `Arc`) the way `jj-lib` holds an `Arc<dyn Backend>` for its
/// non-generic `Backend` trait.
pub trait Store: Send + Sync + Debug {
    /// Runs `f` inside a serializable transaction scoped to `repo_id`.
    /// Transactions on different repos may run concurrently; two
    /// transactions on the same repo are linearized by the store.
    fn repo_transact<T>(
        &self,
        repo_id: &RepoId,
        options: TransactOptions,
        f: impl FnOnce(&mut dyn Transaction) -> Result<T, IndexError>,
    ) -> Result<T, IndexError>;

    /// Runs `f` inside a transaction that may touch repo-level records
    /// across the whole store (`ListRepos`, `GetRepo`, `DeleteRepo`).
    fn transact<T>(
        &self,
        options: TransactOptions,
        f: impl FnOnce(&mut dyn Transaction) -> Result<T, IndexError>,
    ) -> Result<T, IndexError>;
}
