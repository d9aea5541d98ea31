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

use thiserror::Error;

use crate::merkle::diff::Difference;

/// Validation failures. Returned before any transaction is opened, per
/// the propagation policy in the design notes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("{0} is not a valid hex content address")]
    MalformedId(String),
    #[error("invalid branch id {0:?}: {1}")]
    InvalidBranchId(String, &'static str),
    #[error("invalid path {0:?}: {1}")]
    InvalidPath(String, &'static str),
    #[error("commit message must not be empty")]
    EmptyCommitMessage,
}

/// Errors surfaced by a [`crate::store::Store`] implementation. Opaque by
/// design: the index treats every store failure as either "not found" or
/// "something went wrong down there", mirroring `jj-lib`'s own
/// `BackendError::{NotFound, Other}` split.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,
    #[error("store error: {0}")]
    Other(String),
}

impl StoreError {
    pub fn other(msg: impl std::fmt::Display) -> Self {
        StoreError::Other(msg.to_string())
    }
}

/// The full error taxonomy of the index façade (spec.md §7).
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("not found")]
    NotFound,
    #[error("branch already exists")]
    BranchAlreadyExists,
    #[error("branch not found")]
    BranchNotFound,
    #[error("no merge base between the given commits")]
    NoMergeBase,
    #[error("destination branch has uncommitted changes")]
    DestinationNotCommitted,
    /// The only error that also carries data: the merge operations (every
    /// difference except those that only touched the destination side), so
    /// a client can present them.
    #[error("merge conflict on {} path(s)", .differences.len())]
    MergeConflict { differences: Vec<Difference> },
    #[error("failed to apply merge operations to the destination tree")]
    MergeUpdateFailed,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
