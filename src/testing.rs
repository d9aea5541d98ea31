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

//! An in-memory [`Store`] used by this crate's own test suite, in the
//! spirit of `jj-lib`'s `local_backend.rs` and `testutils`: no
//! persistence, no real concurrency control, good enough to exercise the
//! index façade's logic against.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::clock::Timestamp;
use crate::error::{IndexError, StoreError};
use crate::ids::{BranchId, CommitId, ObjectId, RepoId, TreeId};
use crate::merkle::{MerkleTree, TreeNode};
use crate::model::{Branch, Commit, Object, Repo, Root, WorkspaceEntry, DEFAULT_PARTIAL_COMMIT_RATIO};
use crate::repo_path::ObjectPath;
use crate::store::{Page, Store, StoreResult, Transaction, TransactOptions};

#[derive(Debug, Default)]
struct MemoryState {
    repos: BTreeMap<RepoId, Repo>,
    branches: BTreeMap<(RepoId, BranchId), Branch>,
    commits: BTreeMap<(RepoId, CommitId), Commit>,
    roots: BTreeMap<(RepoId, TreeId), Root>,
    tree_nodes: BTreeMap<(RepoId, TreeId), TreeNode>,
    objects: BTreeMap<(RepoId, ObjectId), Object>,
    workspace: BTreeMap<(RepoId, BranchId, ObjectPath), WorkspaceEntry>,
}

/// A cheaply-cloneable handle to a shared, process-local store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn handle(&self) -> MemoryTransaction {
        MemoryTransaction {
            state: self.state.clone(),
        }
    }
}

impl Store for MemoryStore {
    fn repo_transact<T>(
        &self,
        _repo_id: &RepoId,
        _options: TransactOptions,
        f: impl FnOnce(&mut dyn Transaction) -> Result<T, IndexError>,
    ) -> Result<T, IndexError> {
        let mut handle = self.handle();
        f(&mut handle)
    }

    fn transact<T>(
        &self,
        _options: TransactOptions,
        f: impl FnOnce(&mut dyn Transaction) -> Result<T, IndexError>,
    ) -> Result<T, IndexError> {
        let mut handle = self.handle();
        f(&mut handle)
    }
}

/// A live handle into [`MemoryState`]. Each method call takes the lock
/// for just that call, so this gives no real transaction isolation; tests
/// run single-threaded against it, which is the only guarantee this
/// harness makes.
struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
}

impl Transaction for MemoryTransaction {
    fn read_repo(&mut self, id: &RepoId) -> StoreResult<Repo> {
        let state = self.state.lock().unwrap();
        state.repos.get(id).cloned().ok_or(StoreError::NotFound)
    }

    fn write_repo(&mut self, repo: &Repo) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.repos.insert(repo.id.clone(), repo.clone());
        Ok(())
    }

    fn delete_repo(&mut self, id: &RepoId) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.repos.remove(id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    fn list_repos(&mut self, after: Option<&RepoId>, amount: usize) -> StoreResult<Page<Repo>> {
        let state = self.state.lock().unwrap();
        let mut items: Vec<Repo> = state
            .repos
            .range((
                after.cloned().map_or(std::ops::Bound::Unbounded, std::ops::Bound::Excluded),
                std::ops::Bound::Unbounded,
            ))
            .map(|(_, v)| v.clone())
            .collect();
        let has_more = items.len() > amount;
        items.truncate(amount);
        Ok(Page::new(items, has_more))
    }

    fn read_branch(&mut self, repo_id: &RepoId, id: &BranchId) -> StoreResult<Branch> {
        let state = self.state.lock().unwrap();
        state
            .branches
            .get(&(repo_id.clone(), id.clone()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_branch(&mut self, branch: &Branch) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .branches
            .insert((branch.repository_id.clone(), branch.id.clone()), branch.clone());
        Ok(())
    }

    fn delete_branch(&mut self, repo_id: &RepoId, id: &BranchId) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .branches
            .remove(&(repo_id.clone(), id.clone()))
            .ok_or(StoreError::NotFound)?;
        Ok(())
    }

    fn list_branches(
        &mut self,
        repo_id: &RepoId,
        after: Option<&BranchId>,
        amount: usize,
    ) -> StoreResult<Page<Branch>> {
        let state = self.state.lock().unwrap();
        let mut items: Vec<Branch> = state
            .branches
            .iter()
            .filter(|((r, _), _)| r == repo_id)
            .filter(|((_, b), _)| after.map_or(true, |after| b > after))
            .map(|(_, v)| v.clone())
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        let has_more = items.len() > amount;
        items.truncate(amount);
        Ok(Page::new(items, has_more))
    }

    fn read_commit(&mut self, repo_id: &RepoId, id: &CommitId) -> StoreResult<Commit> {
        let state = self.state.lock().unwrap();
        state
            .commits
            .get(&(repo_id.clone(), id.clone()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_commit(&mut self, repo_id: &RepoId, commit: &Commit) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .commits
            .insert((repo_id.clone(), commit.address.clone()), commit.clone());
        Ok(())
    }

    fn read_root(&mut self, repo_id: &RepoId, address: &TreeId) -> StoreResult<Root> {
        let state = self.state.lock().unwrap();
        state
            .roots
            .get(&(repo_id.clone(), address.clone()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_root(&mut self, repo_id: &RepoId, root: &Root) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .roots
            .insert((repo_id.clone(), root.address.clone()), root.clone());
        Ok(())
    }

    fn read_tree_node(&mut self, repo_id: &RepoId, address: &TreeId) -> StoreResult<TreeNode> {
        let state = self.state.lock().unwrap();
        state
            .tree_nodes
            .get(&(repo_id.clone(), address.clone()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_tree_node(&mut self, repo_id: &RepoId, node: &TreeNode) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .tree_nodes
            .insert((repo_id.clone(), node.address.clone()), node.clone());
        Ok(())
    }

    fn read_object(&mut self, repo_id: &RepoId, address: &ObjectId) -> StoreResult<Object> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&(repo_id.clone(), address.clone()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_object(&mut self, repo_id: &RepoId, object: &Object) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .objects
            .insert((repo_id.clone(), object.address.clone()), object.clone());
        Ok(())
    }

    fn lock_workspace(&mut self, _repo_id: &RepoId, _branch_id: &BranchId) -> StoreResult<()> {
        // Single-threaded test harness: nothing to actually lock.
        Ok(())
    }

    fn list_workspace(&mut self, repo_id: &RepoId, branch_id: &BranchId) -> StoreResult<Vec<WorkspaceEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .workspace
            .iter()
            .filter(|((r, b, _), _)| r == repo_id && b == branch_id)
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn read_workspace_entry(
        &mut self,
        repo_id: &RepoId,
        branch_id: &BranchId,
        path: &ObjectPath,
    ) -> StoreResult<Option<WorkspaceEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .workspace
            .get(&(repo_id.clone(), branch_id.clone(), path.clone()))
            .cloned())
    }

    fn write_workspace_entry(&mut self, entry: &WorkspaceEntry) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.workspace.insert(
            (entry.repository_id.clone(), entry.branch_id.clone(), entry.path.clone()),
            entry.clone(),
        );
        Ok(())
    }

    fn delete_workspace_entry(
        &mut self,
        repo_id: &RepoId,
        branch_id: &BranchId,
        path: &ObjectPath,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .workspace
            .remove(&(repo_id.clone(), branch_id.clone(), path.clone()));
        Ok(())
    }

    fn clear_workspace(&mut self, repo_id: &RepoId, branch_id: &BranchId) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .workspace
            .retain(|(r, b, _), _| !(r == repo_id && b == branch_id));
        Ok(())
    }
}

/// Convenience wrapper for tests: builds a [`MemoryStore`] and a
/// ready-to-use repo/branch pair without going through the façade.
pub struct MemoryStoreHarness {
    pub store: MemoryStore,
}

impl MemoryStoreHarness {
    pub fn new() -> Self {
        MemoryStoreHarness {
            store: MemoryStore::new(),
        }
    }

    pub fn tx(&self) -> Box<dyn Transaction> {
        Box::new(self.store.handle())
    }

    /// Creates a repo and a branch pointing at a fresh empty root, and
    /// returns their ids.
    pub fn repo_and_branch(&mut self, repo: &str, branch: &str) -> (RepoId, BranchId) {
        let repo_id = RepoId::new(repo).unwrap();
        let branch_id = BranchId::new_unchecked(branch);
        let now = Timestamp::from_millis(0, 0);
        let empty_root = MerkleTree::empty().root().clone();
        let genesis = Commit::new(
            empty_root.clone(),
            Vec::new(),
            "system".to_string(),
            "genesis".to_string(),
            now,
            BTreeMap::new(),
        );
        let repo_record = Repo {
            id: repo_id.clone(),
            storage_namespace: format!("mem://{repo}"),
            creation_date: now,
            default_branch: branch_id.clone(),
            partial_commit_ratio: DEFAULT_PARTIAL_COMMIT_RATIO,
        };
        let branch_record = Branch {
            id: branch_id.clone(),
            repository_id: repo_id.clone(),
            commit_id: genesis.address.clone(),
            commit_root: empty_root.clone(),
            workspace_root: empty_root,
        };
        self.store
            .repo_transact(&repo_id, TransactOptions::read_write(), |tx| {
                tx.write_repo(&repo_record).map_err(IndexError::Store)?;
                tx.write_commit(&repo_id, &genesis).map_err(IndexError::Store)?;
                tx.write_branch(&branch_record).map_err(IndexError::Store)?;
                Ok(())
            })
            .expect("harness setup never fails");
        (repo_id, branch_id)
    }
}

impl Default for MemoryStoreHarness {
    fn default() -> Self {
        MemoryStoreHarness::new()
    }
}
