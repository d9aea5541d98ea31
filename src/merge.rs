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

//! Three-way merge of one branch into another.

use std::collections::BTreeMap;

use tracing::instrument;

use crate::clock::Clock;
use crate::dag::{find_lowest_common_ancestor, AncestorIterator};
use crate::error::IndexError;
use crate::ids::{BranchId, RepoId};
use crate::merkle::diff::{diff, DifferenceKind, MergeDirection};
use crate::merkle::MerkleTree;
use crate::model::{Commit, EntryType};
use crate::repo_path::ObjectPath;
use crate::store::Transaction;

/// Merges `source` into `destination`:
///
/// 1. `destination` must be clean (no staged workspace changes).
/// 2. The merge base is the lowest common ancestor of the two branches'
///    head commits.
/// 3. A three-way diff of `source`'s commit tree against `destination`'s
///    commit tree, relative to the base, must contain no conflicts.
/// 4. Every change that originated on `source`'s side is replayed onto
///    `destination`'s commit tree: adds and changes are read from
///    `source`'s workspace tree (its most current state), removals are
///    synthesized as tombstones.
/// 5. A merge commit with both branches' heads as parents is written and
///    `destination` is advanced to it, clean.
#[instrument(skip(tx, clock), fields(repo = repo_id.as_str(), source = source_id.as_str(), destination = destination_id.as_str()))]
pub fn merge(
    tx: &mut dyn Transaction,
    repo_id: &RepoId,
    source_id: &BranchId,
    destination_id: &BranchId,
    committer: String,
    clock: &dyn Clock,
) -> Result<Commit, IndexError> {
    let mut destination = tx.read_branch(repo_id, destination_id).map_err(|e| match e {
        crate::error::StoreError::NotFound => IndexError::BranchNotFound,
        other => IndexError::Store(other),
    })?;
    if !destination.is_at_commit_root() {
        return Err(IndexError::DestinationNotCommitted);
    }
    let source = tx.read_branch(repo_id, source_id).map_err(|e| match e {
        crate::error::StoreError::NotFound => IndexError::BranchNotFound,
        other => IndexError::Store(other),
    })?;

    let base_commit_id = find_lowest_common_ancestor(tx, repo_id, &source.commit_id, &destination.commit_id)?;
    let base_commit = tx.read_commit(repo_id, &base_commit_id).map_err(IndexError::Store)?;

    let differences = diff(
        tx,
        repo_id,
        &source.commit_root,
        &destination.commit_root,
        &base_commit.tree,
    )?;

    if differences.iter().any(|d| d.kind == DifferenceKind::Conflict) {
        let merge_operations = differences
            .into_iter()
            .filter(|d| d.direction != MergeDirection::Right)
            .collect();
        return Err(IndexError::MergeConflict { differences: merge_operations });
    }

    let mut staged = Vec::new();
    for d in differences.into_iter().filter(|d| d.direction == MergeDirection::Left) {
        let path = ObjectPath::parse(&d.path).map_err(IndexError::Validation)?;
        match d.kind {
            DifferenceKind::Added | DifferenceKind::Changed => {
                let entry = MerkleTree::new(source.workspace_root.clone())
                    .get_entry(tx, repo_id, &path, EntryType::Object)
                    .map_err(|_| IndexError::MergeUpdateFailed)?;
                staged.push(crate::model::WorkspaceEntry::insert(
                    repo_id.clone(),
                    destination.id.clone(),
                    path,
                    entry,
                ));
            }
            DifferenceKind::Removed => {
                staged.push(crate::model::WorkspaceEntry::tombstone(
                    repo_id.clone(),
                    destination.id.clone(),
                    path,
                ));
            }
            DifferenceKind::Conflict => unreachable!("conflicts were rejected above"),
        }
    }

    let merged_tree = MerkleTree::new(destination.commit_root.clone()).update(tx, repo_id, &staged)?;

    // Parent order depends on whether destination's head is already in
    // source's ancestry.
    let mut destination_is_ancestor_of_source = false;
    for ancestor in AncestorIterator::new(tx, repo_id.clone(), source.commit_id.clone()) {
        if ancestor?.address == destination.commit_id {
            destination_is_ancestor_of_source = true;
            break;
        }
    }
    let parents = if destination_is_ancestor_of_source {
        vec![source.commit_id.clone(), destination.commit_id.clone()]
    } else {
        vec![destination.commit_id.clone(), source.commit_id.clone()]
    };

    let merge_commit = Commit::new(
        merged_tree.root().clone(),
        parents,
        committer,
        format!("Merge branch {} into {}", source_id.as_str(), destination_id.as_str()),
        clock.now(),
        BTreeMap::new(),
    );
    tx.write_commit(repo_id, &merge_commit).map_err(IndexError::Store)?;

    destination.commit_id = merge_commit.address.clone();
    destination.commit_root = merged_tree.root().clone();
    destination.workspace_root = merged_tree.root().clone();
    tx.write_branch(&destination).map_err(IndexError::Store)?;

    Ok(merge_commit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{SteppingClock, Timestamp};
    use crate::ids::ObjectId;
    use crate::model::{Entry, EntryAddress, WorkspaceEntry};
    use crate::testing::MemoryStoreHarness;

    fn entry(name: &str, seed: u8) -> Entry {
        Entry {
            name: name.to_string(),
            address: EntryAddress::Object(ObjectId::from_bytes(vec![seed; 4])),
            creation_date: Timestamp::from_millis(1, 0),
            size: seed as u64,
            checksum: format!("c{seed}"),
        }
    }

    fn commit_to_branch(
        h: &MemoryStoreHarness,
        repo: &RepoId,
        branch_id: &BranchId,
        changes: &[(&str, Option<u8>)],
        clock: &SteppingClock,
    ) {
        let mut tx = h.tx();
        let mut branch = tx.read_branch(repo, branch_id).unwrap();
        let mut we = Vec::new();
        for (path, seed) in changes {
            let p = ObjectPath::parse(path).unwrap();
            we.push(match seed {
                Some(s) => WorkspaceEntry::insert(repo.clone(), branch_id.clone(), p.clone(), entry(p.base_name().as_str(), *s)),
                None => WorkspaceEntry::tombstone(repo.clone(), branch_id.clone(), p),
            });
        }
        let new_tree = MerkleTree::new(branch.commit_root.clone()).update(&mut *tx, repo, &we).unwrap();
        let c = Commit::new(
            new_tree.root().clone(),
            vec![branch.commit_id.clone()],
            "tester".to_string(),
            "msg".to_string(),
            clock.now(),
            BTreeMap::new(),
        );
        tx.write_commit(repo, &c).unwrap();
        branch.commit_id = c.address;
        branch.commit_root = new_tree.root().clone();
        branch.workspace_root = new_tree.root().clone();
        tx.write_branch(&branch).unwrap();
    }

    fn create_branch_from(h: &MemoryStoreHarness, repo: &RepoId, from: &BranchId, new_name: &str) -> BranchId {
        let mut tx = h.tx();
        let source = tx.read_branch(repo, from).unwrap();
        let new_id = BranchId::new_unchecked(new_name);
        let new_branch = crate::model::Branch {
            id: new_id.clone(),
            repository_id: repo.clone(),
            commit_id: source.commit_id,
            commit_root: source.commit_root,
            workspace_root: source.workspace_root,
        };
        tx.write_branch(&new_branch).unwrap();
        new_id
    }

    #[test]
    fn merge_fast_forward_adds_new_paths() {
        let mut h = MemoryStoreHarness::new();
        let (repo, master) = h.repo_and_branch("r1", "master");
        let clock = SteppingClock::starting_at(10);
        let feature = create_branch_from(&h, &repo, &master, "feature");
        commit_to_branch(&h, &repo, &feature, &[("a.txt", Some(1))], &clock);

        let mut tx = h.tx();
        let merge_commit = merge(&mut *tx, &repo, &feature, &master, "merger".to_string(), &clock).unwrap();
        assert_eq!(merge_commit.parents.len(), 2);
        let dest = tx.read_branch(&repo, &master).unwrap();
        assert!(dest.is_at_commit_root());
        let found = MerkleTree::new(dest.commit_root.clone())
            .get_entry(&mut *tx, &repo, &ObjectPath::parse("a.txt").unwrap(), EntryType::Object)
            .unwrap();
        assert_eq!(found.name, "a.txt");
    }

    #[test]
    fn merge_rejects_dirty_destination() {
        let mut h = MemoryStoreHarness::new();
        let (repo, master) = h.repo_and_branch("r1", "master");
        let clock = SteppingClock::starting_at(10);
        let feature = create_branch_from(&h, &repo, &master, "feature");
        commit_to_branch(&h, &repo, &feature, &[("a.txt", Some(1))], &clock);

        let mut tx = h.tx();
        let we = WorkspaceEntry::insert(repo.clone(), master.clone(), ObjectPath::parse("dirty.txt").unwrap(), entry("dirty.txt", 5));
        tx.write_workspace_entry(&we).unwrap();
        let mut dest = tx.read_branch(&repo, &master).unwrap();
        dest.workspace_root = crate::ids::TreeId::from_bytes(vec![1, 2, 3]);
        tx.write_branch(&dest).unwrap();

        let err = merge(&mut *tx, &repo, &feature, &master, "merger".to_string(), &clock).unwrap_err();
        assert!(matches!(err, IndexError::DestinationNotCommitted));
    }

    #[test]
    fn merge_detects_conflicting_changes() {
        let mut h = MemoryStoreHarness::new();
        let (repo, master) = h.repo_and_branch("r1", "master");
        let clock = SteppingClock::starting_at(10);
        commit_to_branch(&h, &repo, &master, &[("a.txt", Some(1))], &clock);
        let feature = create_branch_from(&h, &repo, &master, "feature");
        commit_to_branch(&h, &repo, &feature, &[("a.txt", Some(2))], &clock);
        commit_to_branch(&h, &repo, &master, &[("a.txt", Some(3))], &clock);

        let mut tx = h.tx();
        let err = merge(&mut *tx, &repo, &feature, &master, "merger".to_string(), &clock).unwrap_err();
        assert!(matches!(err, IndexError::MergeConflict { .. }));
    }
}
