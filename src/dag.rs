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

//! Walking the commit DAG: paginated history scans, ancestor iteration,
//! and lowest-common-ancestor search. Grounded in the parent-walk shape of
//! `jj-lib`'s `dag_walk.rs`, adapted to work directly off `Store` reads
//! since this crate keeps no separate generation-number index.

use std::collections::{HashSet, VecDeque};

use crate::error::{IndexError, StoreError};
use crate::ids::{CommitId, RepoId};
use crate::model::Commit;
use crate::store::{Page, Transaction};

fn read_commit(tx: &mut dyn Transaction, repo_id: &RepoId, id: &CommitId) -> Result<Commit, IndexError> {
    tx.read_commit(repo_id, id).map_err(|e| match e {
        StoreError::NotFound => IndexError::NotFound,
        other => IndexError::Store(other),
    })
}

/// Walks a commit's ancestry, parents before grandparents, visiting each
/// commit at most once. Not restartable: once exhausted, build a new one.
pub struct AncestorIterator<'tx> {
    tx: &'tx mut dyn Transaction,
    repo_id: RepoId,
    queue: VecDeque<CommitId>,
    seen: HashSet<CommitId>,
}

impl<'tx> AncestorIterator<'tx> {
    pub fn new(tx: &'tx mut dyn Transaction, repo_id: RepoId, start: CommitId) -> Self {
        let mut seen = HashSet::new();
        seen.insert(start.clone());
        let mut queue = VecDeque::new();
        queue.push_back(start);
        AncestorIterator { tx, repo_id, queue, seen }
    }
}

impl Iterator for AncestorIterator<'_> {
    type Item = Result<Commit, IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.queue.pop_front()?;
        let commit = match read_commit(self.tx, &self.repo_id, &id) {
            Ok(c) => c,
            Err(e) => return Some(Err(e)),
        };
        for parent in &commit.parents {
            if self.seen.insert(parent.clone()) {
                self.queue.push_back(parent.clone());
            }
        }
        Some(Ok(commit))
    }
}

/// One page of `CommitScan`: commits reachable from `start` (inclusive),
/// most-recent-first by `(creation_date, address)`, resumable via
/// `after`.
pub fn commit_scan(
    tx: &mut dyn Transaction,
    repo_id: &RepoId,
    start: &CommitId,
    after: Option<&CommitId>,
    amount: usize,
) -> Result<Page<Commit>, IndexError> {
    let mut all: Vec<Commit> = Vec::new();
    let mut seen: HashSet<CommitId> = HashSet::new();
    let mut queue: VecDeque<CommitId> = VecDeque::new();
    queue.push_back(start.clone());
    seen.insert(start.clone());
    while let Some(id) = queue.pop_front() {
        let commit = read_commit(tx, repo_id, &id)?;
        for parent in &commit.parents {
            if seen.insert(parent.clone()) {
                queue.push_back(parent.clone());
            }
        }
        all.push(commit);
    }
    all.sort_by(|a, b| {
        b.creation_date
            .cmp(&a.creation_date)
            .then_with(|| b.address.cmp(&a.address))
    });

    let start_index = match after {
        None => 0,
        Some(after) => all
            .iter()
            .position(|c| &c.address == after)
            .map(|i| i + 1)
            .unwrap_or(all.len()),
    };
    let remaining = &all[start_index.min(all.len())..];
    let has_more = remaining.len() > amount;
    let items = remaining.iter().take(amount).cloned().collect();
    Ok(Page::new(items, has_more))
}

/// Finds a lowest common ancestor of `left` and `right` by expanding both
/// ancestries breadth-first in lockstep until a commit visited from one
/// side is found in the other's visited set. Returns [`IndexError::NoMergeBase`]
/// if the two commits share no ancestor (e.g. different repository
/// histories spliced together, which should not happen in practice).
pub fn find_lowest_common_ancestor(
    tx: &mut dyn Transaction,
    repo_id: &RepoId,
    left: &CommitId,
    right: &CommitId,
) -> Result<CommitId, IndexError> {
    if left == right {
        return Ok(left.clone());
    }

    let mut visited_left: HashSet<CommitId> = HashSet::new();
    let mut visited_right: HashSet<CommitId> = HashSet::new();
    let mut frontier_left: VecDeque<CommitId> = VecDeque::new();
    let mut frontier_right: VecDeque<CommitId> = VecDeque::new();
    visited_left.insert(left.clone());
    visited_right.insert(right.clone());
    frontier_left.push_back(left.clone());
    frontier_right.push_back(right.clone());

    while !frontier_left.is_empty() || !frontier_right.is_empty() {
        if let Some(id) = frontier_left.pop_front() {
            if visited_right.contains(&id) {
                return Ok(id);
            }
            let commit = read_commit(tx, repo_id, &id)?;
            for parent in commit.parents {
                if visited_left.insert(parent.clone()) {
                    frontier_left.push_back(parent);
                }
            }
        }
        if let Some(id) = frontier_right.pop_front() {
            if visited_left.contains(&id) {
                return Ok(id);
            }
            let commit = read_commit(tx, repo_id, &id)?;
            for parent in commit.parents {
                if visited_right.insert(parent.clone()) {
                    frontier_right.push_back(parent);
                }
            }
        }
    }

    Err(IndexError::NoMergeBase)
}
