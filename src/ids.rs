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

//! Content-addressed identifiers. Each kind of addressed record gets its
//! own newtype so the compiler catches a `TreeId` handed where a
//! `CommitId` is expected, even though both are just hex digests
//! underneath.

use std::fmt::{self, Debug, Formatter};

use crate::content_hash::{self, ContentHash};
use crate::error::ValidationError;

macro_rules! content_address {
    ($name:ident) => {
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(Vec<u8>);

        impl $name {
            pub fn from_bytes(bytes: Vec<u8>) -> Self {
                $name(bytes)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn hex(&self) -> String {
                hex::encode(&self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, ValidationError> {
                hex::decode(s)
                    .map($name)
                    .map_err(|_| ValidationError::MalformedId(s.to_string()))
            }

            pub fn of(value: &(impl ContentHash + ?Sized)) -> Self {
                $name(content_hash::blake2b_hash(value))
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.hex()).finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str(&self.hex())
            }
        }

        impl ContentHash for $name {
            fn hash(&self, state: &mut impl content_hash::DigestUpdate) {
                self.0.hash(state);
            }
        }
    };
}

content_address!(CommitId);
content_address!(TreeId);
content_address!(ObjectId);

/// A repository identifier, chosen by the caller at `CreateRepo` time.
/// Not content-addressed.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct RepoId(String);

impl RepoId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::EmptyField("repoId"));
        }
        Ok(RepoId(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A branch identifier. Validated by [`crate::refs::validate_ref`] before
/// use: non-empty, restricted alphabet, length-bounded.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct BranchId(String);

impl BranchId {
    /// Constructs a `BranchId` without validation, for use by code that
    /// has already validated (or trusts) the string, such as a `Store`
    /// reading back a previously written record.
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        BranchId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let id = TreeId::from_bytes(vec![1, 2, 3, 255]);
        assert_eq!(TreeId::from_hex(&id.hex()).unwrap(), id);
    }

    #[test]
    fn content_address_is_deterministic() {
        let a = CommitId::of(&vec![1u8, 2, 3]);
        let b = CommitId::of(&vec![1u8, 2, 3]);
        assert_eq!(a, b);
        let c = CommitId::of(&vec![1u8, 2, 4]);
        assert_ne!(a, c);
    }
}
