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

//! Portable, stable hashing used to compute the content address of a
//! record. Two records with equal canonical fields hash to the same
//! address regardless of field declaration order or how they were
//! constructed.

use std::collections::BTreeMap;

use blake2::Blake2b512;
use digest::Digest;
pub use digest::Update as DigestUpdate;
use itertools::Itertools as _;

/// The length, in bytes, of a content address produced by [`blake2b_hash`].
pub const HASH_LENGTH: usize = 64;

/// Implemented by every value that can be part of a content-addressed
/// record. Variable-length sequences hash a little-endian length prefix
/// followed by their elements in order; unordered containers sort by key
/// first so that equal logical contents always produce equal hashes.
pub trait ContentHash {
    fn hash(&self, state: &mut impl DigestUpdate);
}

/// Hashes `value`'s canonical content and returns the raw digest bytes.
pub fn blake2b_hash(value: &(impl ContentHash + ?Sized)) -> Vec<u8> {
    let mut hasher = Blake2b512::default();
    value.hash(&mut hasher);
    hasher.finalize().to_vec()
}

/// Returns `true` iff `s` has the shape of a content address produced by
/// this module: lowercase hex, exactly [`HASH_LENGTH`] bytes wide.
pub fn looks_like_hash(s: &str) -> bool {
    s.len() == HASH_LENGTH * 2 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

impl ContentHash for () {
    fn hash(&self, _state: &mut impl DigestUpdate) {}
}

impl ContentHash for bool {
    fn hash(&self, state: &mut impl DigestUpdate) {
        u8::from(*self).hash(state);
    }
}

impl ContentHash for u8 {
    fn hash(&self, state: &mut impl DigestUpdate) {
        state.update(&[*self]);
    }
}

impl ContentHash for u32 {
    fn hash(&self, state: &mut impl DigestUpdate) {
        state.update(&self.to_le_bytes());
    }
}

impl ContentHash for u64 {
    fn hash(&self, state: &mut impl DigestUpdate) {
        state.update(&self.to_le_bytes());
    }
}

impl ContentHash for i32 {
    fn hash(&self, state: &mut impl DigestUpdate) {
        state.update(&self.to_le_bytes());
    }
}

impl ContentHash for i64 {
    fn hash(&self, state: &mut impl DigestUpdate) {
        state.update(&self.to_le_bytes());
    }
}

impl<T: ContentHash> ContentHash for [T] {
    fn hash(&self, state: &mut impl DigestUpdate) {
        state.update(&(self.len() as u64).to_le_bytes());
        for x in self {
            x.hash(state);
        }
    }
}

impl<T: ContentHash> ContentHash for Vec<T> {
    fn hash(&self, state: &mut impl DigestUpdate) {
        self.as_slice().hash(state);
    }
}

impl ContentHash for str {
    fn hash(&self, state: &mut impl DigestUpdate) {
        self.as_bytes().hash(state);
    }
}

impl ContentHash for String {
    fn hash(&self, state: &mut impl DigestUpdate) {
        self.as_str().hash(state);
    }
}

impl<T: ContentHash> ContentHash for Option<T> {
    fn hash(&self, state: &mut impl DigestUpdate) {
        match self {
            None => state.update(&0u32.to_le_bytes()),
            Some(x) => {
                state.update(&1u32.to_le_bytes());
                x.hash(state);
            }
        }
    }
}

/// `BTreeMap` is already key-ordered, so no extra sort is needed before
/// hashing its entries in order.
impl<K, V> ContentHash for BTreeMap<K, V>
where
    K: ContentHash + Ord,
    V: ContentHash,
{
    fn hash(&self, state: &mut impl DigestUpdate) {
        state.update(&(self.len() as u64).to_le_bytes());
        for (k, v) in self {
            k.hash(state);
            v.hash(state);
        }
    }
}

/// `HashMap` has no stable iteration order, so entries are sorted by key
/// before hashing.
impl<K, V> ContentHash for std::collections::HashMap<K, V>
where
    K: ContentHash + Ord,
    V: ContentHash,
{
    fn hash(&self, state: &mut impl DigestUpdate) {
        state.update(&(self.len() as u64).to_le_bytes());
        let mut kv = self.iter().collect_vec();
        kv.sort_unstable_by(|a, b| a.0.cmp(b.0));
        for (k, v) in kv {
            k.hash(state);
            v.hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = vec![1u8, 2, 3];
        let b = vec![1u8, 2, 3];
        assert_eq!(blake2b_hash(&a), blake2b_hash(&b));
    }

    #[test]
    fn hash_distinguishes_length() {
        assert_ne!(blake2b_hash(&vec![1u8]), blake2b_hash(&vec![1u8, 1]));
    }

    #[test]
    fn hashmap_order_independent() {
        let mut a = std::collections::HashMap::new();
        a.insert("x".to_string(), 1u32);
        a.insert("y".to_string(), 2u32);
        let mut b = std::collections::HashMap::new();
        b.insert("y".to_string(), 2u32);
        b.insert("x".to_string(), 1u32);
        assert_eq!(blake2b_hash(&a), blake2b_hash(&b));
    }

    #[test]
    fn looks_like_hash_checks_shape() {
        assert!(looks_like_hash(&"ab".repeat(HASH_LENGTH)));
        assert!(!looks_like_hash("not-a-hash"));
        assert!(!looks_like_hash(&"ab".repeat(HASH_LENGTH - 1)));
    }
}
