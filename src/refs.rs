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

//! Resolving a user-supplied ref string to a commit or a branch, and
//! validating branch ids before they are ever written.

use crate::content_hash::looks_like_hash;
use crate::error::{IndexError, StoreError, ValidationError};
use crate::ids::{BranchId, CommitId, RepoId};
use crate::model::Reference;
use crate::store::Transaction;

const MAX_BRANCH_ID_LENGTH: usize = 512;

/// Accepts lowercase letters, digits, `-`, `_`, and `/` (for
/// namespacing), matching the restricted alphabet `jj-lib` uses for
/// workspace and remote names.
fn is_valid_branch_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '/')
}

pub fn validate_branch_id(value: &str) -> Result<BranchId, ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::InvalidBranchId(
            value.to_string(),
            "must not be empty",
        ));
    }
    if value.len() > MAX_BRANCH_ID_LENGTH {
        return Err(ValidationError::InvalidBranchId(value.to_string(), "too long"));
    }
    if value.starts_with('/') || value.ends_with('/') || value.contains("//") {
        return Err(ValidationError::InvalidBranchId(
            value.to_string(),
            "must not have empty path segments",
        ));
    }
    if !value.chars().all(is_valid_branch_char) {
        return Err(ValidationError::InvalidBranchId(
            value.to_string(),
            "must contain only lowercase letters, digits, '-', '_', '/'",
        ));
    }
    Ok(BranchId::new_unchecked(value))
}

/// Resolves a ref string to a commit or a branch. A hash-shaped string is
/// tried as a commit address first; anything else (or a hash-shaped
/// string that does not resolve to a commit) is looked up as a branch
/// name.
pub fn resolve_ref(
    tx: &mut dyn Transaction,
    repo_id: &RepoId,
    reference: &str,
) -> Result<Reference, IndexError> {
    if looks_like_hash(reference) {
        if let Ok(commit_id) = CommitId::from_hex(reference) {
            match tx.read_commit(repo_id, &commit_id) {
                Ok(commit) => return Ok(Reference::Commit(commit)),
                Err(StoreError::NotFound) => {}
                Err(other) => return Err(IndexError::Store(other)),
            }
        }
    }

    let branch_id = validate_branch_id(reference)?;
    let branch = tx.read_branch(repo_id, &branch_id).map_err(|e| match e {
        StoreError::NotFound => IndexError::BranchNotFound,
        other => IndexError::Store(other),
    })?;
    let commit = tx.read_commit(repo_id, &branch.commit_id).map_err(|e| match e {
        StoreError::NotFound => IndexError::NotFound,
        other => IndexError::Store(other),
    })?;
    Ok(Reference::Branch { branch, commit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::testing::MemoryStoreHarness;
    use std::collections::BTreeMap;

    #[test]
    fn rejects_empty_and_malformed_branch_ids() {
        assert!(validate_branch_id("").is_err());
        assert!(validate_branch_id("/leading").is_err());
        assert!(validate_branch_id("trailing/").is_err());
        assert!(validate_branch_id("a//b").is_err());
        assert!(validate_branch_id("Has-Upper").is_err());
        assert!(validate_branch_id("feature/login").is_ok());
    }

    #[test]
    fn resolve_ref_finds_branch() {
        let mut h = MemoryStoreHarness::new();
        let (repo, branch) = h.repo_and_branch("r1", "master");
        let mut tx = h.tx();
        let resolved = resolve_ref(&mut *tx, &repo, branch.as_str()).unwrap();
        assert!(resolved.is_branch());
    }

    #[test]
    fn resolve_ref_finds_commit_by_hash() {
        let mut h = MemoryStoreHarness::new();
        let (repo, _branch) = h.repo_and_branch("r1", "master");
        let mut tx = h.tx();
        let commit = crate::model::Commit::new(
            crate::merkle::MerkleTree::empty().root().clone(),
            vec![],
            "tester".to_string(),
            "msg".to_string(),
            Timestamp::from_millis(1, 0),
            BTreeMap::new(),
        );
        tx.write_commit(&repo, &commit).unwrap();
        let resolved = resolve_ref(&mut *tx, &repo, &commit.address.hex()).unwrap();
        assert!(!resolved.is_branch());
        assert_eq!(resolved.commit().address, commit.address);
    }

    #[test]
    fn resolve_ref_unknown_branch_not_found() {
        let mut h = MemoryStoreHarness::new();
        let (repo, _branch) = h.repo_and_branch("r1", "master");
        let mut tx = h.tx();
        let err = resolve_ref(&mut *tx, &repo, "nonexistent").unwrap_err();
        assert!(matches!(err, IndexError::BranchNotFound));
    }
}
