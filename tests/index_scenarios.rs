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

//! End-to-end scenarios against the [`Index`] façade over a
//! [`MemoryStore`], one per documented user-facing workflow.

use std::collections::BTreeMap;
use std::sync::Arc;

use assert_matches::assert_matches;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use reftree::clock::SteppingClock;
use reftree::error::IndexError;
use reftree::index::Index;
use reftree::testing::MemoryStore;

fn new_index() -> Index<MemoryStore> {
    let store = MemoryStore::new();
    let clock = Arc::new(SteppingClock::starting_at(1_000));
    let rng = Box::new(ChaCha8Rng::seed_from_u64(7));
    Index::new(store, clock, rng)
}

#[test]
fn create_write_read_staged() {
    let idx = new_index();
    idx.create_repo("r", "s3://b".to_string()).unwrap();
    idx.write_object("r", "master", "a.txt", 3, "c1".to_string(), "p1".to_string(), BTreeMap::new())
        .unwrap();

    let staged = idx.read_object("r", "master", "a.txt", true).unwrap();
    assert_eq!(staged.checksum, "c1");

    let err = idx.read_object("r", "master", "a.txt", false).unwrap_err();
    assert_matches!(err, IndexError::NotFound);
}

#[test]
fn commit_snapshot() {
    let idx = new_index();
    idx.create_repo("r", "s3://b".to_string()).unwrap();
    idx.write_object("r", "master", "a.txt", 3, "c1".to_string(), "p1".to_string(), BTreeMap::new())
        .unwrap();

    idx.commit("r", "master", "alice".to_string(), "m1".to_string(), BTreeMap::new()).unwrap();

    let object = idx.read_object("r", "master", "a.txt", false).unwrap();
    assert_eq!(object.checksum, "c1");

    let branch = idx.get_branch("r", "master").unwrap();
    assert_eq!(branch.commit_root, branch.workspace_root);
}

#[test]
fn delete_with_tombstone_then_reset() {
    let idx = new_index();
    idx.create_repo("r", "s3://b".to_string()).unwrap();
    idx.write_object("r", "master", "a.txt", 3, "c1".to_string(), "p1".to_string(), BTreeMap::new())
        .unwrap();
    idx.commit("r", "master", "alice".to_string(), "m1".to_string(), BTreeMap::new()).unwrap();

    idx.delete_object("r", "master", "a.txt").unwrap();
    let err = idx.read_entry("r", "master", "a.txt", true).unwrap_err();
    assert_matches!(err, IndexError::NotFound);

    // The tombstone only lives in the workspace overlay: reading the
    // purely-committed view still finds the entry.
    let still_there = idx.read_object("r", "master", "a.txt", false).unwrap();
    assert_eq!(still_there.checksum, "c1");

    idx.reset_branch("r", "master").unwrap();
    let restored = idx.read_entry("r", "master", "a.txt", true).unwrap();
    assert_eq!(restored.checksum, "c1");
}

#[test]
fn branch_and_merge_without_conflict() {
    let idx = new_index();
    idx.create_repo("r", "s3://b".to_string()).unwrap();
    idx.write_object("r", "master", "a.txt", 3, "c1".to_string(), "p1".to_string(), BTreeMap::new())
        .unwrap();
    idx.commit("r", "master", "alice".to_string(), "m1".to_string(), BTreeMap::new()).unwrap();

    idx.create_branch("r", "feat", "master").unwrap();
    idx.write_object("r", "feat", "b.txt", 4, "c2".to_string(), "p2".to_string(), BTreeMap::new())
        .unwrap();
    idx.commit("r", "feat", "alice".to_string(), "m2".to_string(), BTreeMap::new()).unwrap();

    let merge_commit = idx.merge("r", "feat", "master", "alice".to_string()).unwrap();
    assert_eq!(merge_commit.parents.len(), 2);

    let a = idx.read_object("r", "master", "a.txt", false).unwrap();
    let b = idx.read_object("r", "master", "b.txt", false).unwrap();
    assert_eq!(a.checksum, "c1");
    assert_eq!(b.checksum, "c2");
}

#[test]
fn merge_reports_conflict() {
    let idx = new_index();
    idx.create_repo("r", "s3://b".to_string()).unwrap();
    idx.write_object("r", "master", "a.txt", 3, "c1".to_string(), "p1".to_string(), BTreeMap::new())
        .unwrap();
    idx.commit("r", "master", "alice".to_string(), "m1".to_string(), BTreeMap::new()).unwrap();

    idx.create_branch("r", "feat", "master").unwrap();
    idx.write_object("r", "master", "a.txt", 3, "c2".to_string(), "p2".to_string(), BTreeMap::new())
        .unwrap();
    idx.commit("r", "master", "alice".to_string(), "m2".to_string(), BTreeMap::new()).unwrap();
    idx.write_object("r", "feat", "a.txt", 3, "c3".to_string(), "p3".to_string(), BTreeMap::new())
        .unwrap();
    idx.commit("r", "feat", "alice".to_string(), "m3".to_string(), BTreeMap::new()).unwrap();

    let err = idx.merge("r", "feat", "master", "alice".to_string()).unwrap_err();
    assert_matches!(err, IndexError::MergeConflict { ref differences } if {
        let conflict = differences.iter().find(|d| d.path == "a.txt").unwrap();
        conflict.direction == reftree::merkle::diff::MergeDirection::Conflict
    });
}

#[test]
fn revert_path_restores_committed_entry() {
    let idx = new_index();
    idx.create_repo("r", "s3://b".to_string()).unwrap();
    idx.write_object("r", "master", "a.txt", 3, "v1".to_string(), "p1".to_string(), BTreeMap::new())
        .unwrap();
    let c1 = idx.commit("r", "master", "alice".to_string(), "m1".to_string(), BTreeMap::new()).unwrap();

    idx.write_object("r", "master", "a.txt", 3, "v2".to_string(), "p2".to_string(), BTreeMap::new())
        .unwrap();
    let current = idx.read_object("r", "master", "a.txt", true).unwrap();
    assert_eq!(current.checksum, "v2");

    idx.revert_path("r", "master", "a.txt", &c1.address.hex()).unwrap();
    let reverted = idx.read_object("r", "master", "a.txt", true).unwrap();
    assert_eq!(reverted.checksum, "v1");
}

#[test]
fn revert_path_of_root_resets_branch() {
    let idx = new_index();
    idx.create_repo("r", "s3://b".to_string()).unwrap();
    idx.write_object("r", "master", "a.txt", 3, "v1".to_string(), "p1".to_string(), BTreeMap::new())
        .unwrap();
    idx.commit("r", "master", "alice".to_string(), "m1".to_string(), BTreeMap::new()).unwrap();

    idx.write_object("r", "master", "b.txt", 3, "v2".to_string(), "p2".to_string(), BTreeMap::new())
        .unwrap();
    idx.read_object("r", "master", "b.txt", true).unwrap();

    idx.revert_path("r", "master", "", "master").unwrap();

    let err = idx.read_object("r", "master", "b.txt", true).unwrap_err();
    assert_matches!(err, IndexError::NotFound);
    let branch = idx.get_branch("r", "master").unwrap();
    assert_eq!(branch.commit_root, branch.workspace_root);
}
