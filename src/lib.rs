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

//! A versioned metadata index: branches, commits, and content-addressed
//! Merkle trees layered over a transactional key-value [`store`]. See
//! [`index`] for the façade most callers actually use.

pub mod clock;
pub mod content_hash;
pub mod dag;
pub mod error;
pub mod ids;
pub mod index;
pub mod merge;
pub mod merkle;
pub mod model;
pub mod refs;
pub mod repo_path;
pub mod store;
pub mod workspace;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
