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

//! The workspace overlay: uncommitted staged entries and tombstones kept
//! separate from a branch's committed tree, and the background flush
//! ("partial commit") that periodically folds them in.

use rand::Rng;
use tracing::debug;

use crate::error::{IndexError, StoreError};
use crate::ids::{BranchId, RepoId};
use crate::merkle::MerkleTree;
use crate::model::{Repo, WorkspaceEntry};
use crate::store::Transaction;

/// Stages `entry` without touching the committed tree. Idempotent:
/// writing the same path twice just overwrites the staged record.
pub fn write_entry_to_workspace(tx: &mut dyn Transaction, entry: &WorkspaceEntry) -> Result<(), IndexError> {
    tx.write_workspace_entry(entry).map_err(IndexError::Store)
}

/// Draws one sample to decide whether this call should eagerly flush the
/// workspace instead of waiting for the next scheduled flush. Uses
/// `repo.partial_commit_ratio` as the probability, not a hardcoded
/// constant, so different repositories can tune flush frequency
/// independently.
pub fn should_partially_commit(repo: &Repo, rng: &mut dyn rand::RngCore) -> bool {
    rng.gen::<f64>() < repo.partial_commit_ratio
}

/// Folds every staged workspace entry into a new tree rooted at the
/// branch's current workspace root, then clears the overlay and advances
/// the branch to point at the result. A no-op if nothing is staged. The
/// branch's committed tree and head commit are untouched: this only
/// moves `workspace_root` forward.
pub fn partial_commit(
    tx: &mut dyn Transaction,
    repo_id: &RepoId,
    branch_id: &BranchId,
) -> Result<(), IndexError> {
    tx.lock_workspace(repo_id, branch_id).map_err(IndexError::Store)?;

    let entries = tx.list_workspace(repo_id, branch_id).map_err(IndexError::Store)?;
    if entries.is_empty() {
        return Ok(());
    }

    let mut branch = match tx.read_branch(repo_id, branch_id) {
        Ok(branch) => branch,
        Err(StoreError::NotFound) => {
            debug!(branch = branch_id.as_str(), "branch deleted concurrently, skipping flush");
            return Ok(());
        }
        Err(other) => return Err(IndexError::Store(other)),
    };

    let tree = MerkleTree::new(branch.workspace_root.clone());
    let updated = tree.update(tx, repo_id, &entries)?;

    tx.clear_workspace(repo_id, branch_id).map_err(IndexError::Store)?;
    branch.workspace_root = updated.root().clone();
    tx.write_branch(&branch).map_err(IndexError::Store)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::ids::ObjectId;
    use crate::model::{Entry, EntryAddress, EntryType};
    use crate::repo_path::ObjectPath;
    use crate::testing::MemoryStoreHarness;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn partial_commit_is_noop_when_workspace_empty() {
        let mut h = MemoryStoreHarness::new();
        let (repo, branch) = h.repo_and_branch("r1", "master");
        let mut tx = h.tx();
        let before = tx.read_branch(&repo, &branch).unwrap();
        partial_commit(&mut *tx, &repo, &branch).unwrap();
        let after = tx.read_branch(&repo, &branch).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn partial_commit_folds_staged_entries_and_clears_workspace() {
        let mut h = MemoryStoreHarness::new();
        let (repo, branch) = h.repo_and_branch("r1", "master");
        let mut tx = h.tx();
        let path = ObjectPath::parse("a.txt").unwrap();
        let entry = Entry {
            name: "a.txt".to_string(),
            address: EntryAddress::Object(ObjectId::from_bytes(vec![9; 4])),
            creation_date: Timestamp::from_millis(1, 0),
            size: 9,
            checksum: "c9".to_string(),
        };
        let staged = WorkspaceEntry::insert(repo.clone(), branch.clone(), path, entry);
        write_entry_to_workspace(&mut *tx, &staged).unwrap();

        partial_commit(&mut *tx, &repo, &branch).unwrap();

        assert!(tx.list_workspace(&repo, &branch).unwrap().is_empty());
        let after = tx.read_branch(&repo, &branch).unwrap();
        assert_ne!(after.workspace_root, after.commit_root);

        let tree = MerkleTree::new(after.workspace_root.clone());
        let found = tree
            .get_entry(&mut *tx, &repo, &ObjectPath::parse("a.txt").unwrap(), EntryType::Object)
            .unwrap();
        assert_eq!(found.name, "a.txt");
    }

    #[test]
    fn should_partially_commit_respects_ratio() {
        let repo = Repo {
            id: crate::ids::RepoId::new("r").unwrap(),
            storage_namespace: "mem://r".to_string(),
            creation_date: Timestamp::from_millis(0, 0),
            default_branch: BranchId::new_unchecked("master"),
            partial_commit_ratio: 0.0,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(!should_partially_commit(&repo, &mut rng));

        let always = Repo {
            partial_commit_ratio: 1.0,
            ..repo
        };
        assert!(should_partially_commit(&always, &mut rng));
    }
}
