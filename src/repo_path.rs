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

//! Slash-delimited paths, split into object paths (no trailing slash) and
//! tree paths (always a trailing slash, possibly empty for the root).

use std::fmt::{self, Debug, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::content_hash::{ContentHash, DigestUpdate};
use crate::error::ValidationError;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathComponent(String);

impl PathComponent {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PathComponent {
    fn from(value: &str) -> Self {
        assert!(!value.contains('/'), "path component must not contain '/'");
        assert!(!value.is_empty(), "path component must not be empty");
        PathComponent(value.to_owned())
    }
}

impl Debug for PathComponent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl ContentHash for PathComponent {
    fn hash(&self, state: &mut impl DigestUpdate) {
        self.0.hash(state);
    }
}

/// A path to an object: no trailing slash, at least one component.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectPath {
    components: Vec<PathComponent>,
}

impl Debug for ObjectPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectPath({:?})", self.as_internal_string())
    }
}

/// Stored records serialize a path as its canonical slash-joined string
/// rather than the internal component vector.
impl Serialize for ObjectPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_internal_string())
    }
}

impl<'de> Deserialize<'de> for ObjectPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ObjectPath::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl ObjectPath {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        if value.is_empty() {
            return Err(ValidationError::InvalidPath(
                value.to_string(),
                "object path must not be empty",
            ));
        }
        if value.ends_with('/') {
            return Err(ValidationError::InvalidPath(
                value.to_string(),
                "object path must not end with '/'",
            ));
        }
        Ok(ObjectPath {
            components: value.split('/').map(PathComponent::from).collect(),
        })
    }

    pub fn as_internal_string(&self) -> String {
        self.components
            .iter()
            .map(PathComponent::as_str)
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn base_name(&self) -> &PathComponent {
        self.components.last().expect("object path has a basename")
    }

    /// The tree path of the directory containing this object.
    pub fn parent_path(&self) -> TreePath {
        TreePath {
            components: self.components[..self.components.len() - 1].to_vec(),
        }
    }

    pub fn components(&self) -> &[PathComponent] {
        &self.components
    }
}

/// A path to a directory: always a trailing slash, possibly zero
/// components (the root).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TreePath {
    components: Vec<PathComponent>,
}

impl Debug for TreePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TreePath({:?})", self.as_internal_string())
    }
}

impl TreePath {
    pub fn root() -> Self {
        TreePath { components: Vec::new() }
    }

    /// Normalizes `value` to a tree path: a trailing slash is added if
    /// missing, per spec.md §4.2 ("type=tree normalizes to one").
    pub fn parse(value: &str) -> Self {
        let trimmed = value.strip_suffix('/').unwrap_or(value);
        if trimmed.is_empty() {
            return TreePath::root();
        }
        TreePath {
            components: trimmed.split('/').map(PathComponent::from).collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn as_internal_string(&self) -> String {
        if self.is_root() {
            return String::new();
        }
        let mut s = self
            .components
            .iter()
            .map(PathComponent::as_str)
            .collect::<Vec<_>>()
            .join("/");
        s.push('/');
        s
    }

    pub fn base_name(&self) -> Option<&PathComponent> {
        self.components.last()
    }

    pub fn parent_path(&self) -> Option<TreePath> {
        if self.is_root() {
            return None;
        }
        Some(TreePath {
            components: self.components[..self.components.len() - 1].to_vec(),
        })
    }

    pub fn join_object(&self, name: &PathComponent) -> ObjectPath {
        let mut components = self.components.clone();
        components.push(name.clone());
        ObjectPath { components }
    }

    pub fn join_tree(&self, name: &PathComponent) -> TreePath {
        let mut components = self.components.clone();
        components.push(name.clone());
        TreePath { components }
    }

    pub fn components(&self) -> &[PathComponent] {
        &self.components
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("a/b/" ; "trailing slash")]
    #[test_case("" ; "empty")]
    fn object_path_rejects(input: &str) {
        assert!(ObjectPath::parse(input).is_err());
    }

    #[test]
    fn object_path_accepts_well_formed() {
        assert!(ObjectPath::parse("a/b").is_ok());
    }

    #[test_case("a/b", "a/b/" ; "no trailing slash")]
    #[test_case("a/b/", "a/b/" ; "already has trailing slash")]
    fn tree_path_normalizes_trailing_slash(input: &str, expected: &str) {
        assert_eq!(TreePath::parse(input).as_internal_string(), expected);
    }

    #[test]
    fn tree_path_empty_and_root_slash_are_root() {
        assert!(TreePath::parse("").is_root());
        assert!(TreePath::parse("/").is_root());
    }

    #[test]
    fn object_parent_and_basename() {
        let p = ObjectPath::parse("dir/sub/file.txt").unwrap();
        assert_eq!(p.parent_path().as_internal_string(), "dir/sub/");
        assert_eq!(p.base_name().as_str(), "file.txt");

        let root_level = ObjectPath::parse("file.txt").unwrap();
        assert!(root_level.parent_path().is_root());
    }

    #[test]
    fn tree_path_parent_and_join() {
        let root = TreePath::root();
        assert_eq!(root.parent_path(), None);
        let dir = root.join_tree(&PathComponent::from("dir"));
        assert_eq!(dir.as_internal_string(), "dir/");
        assert_eq!(dir.parent_path(), Some(root.clone()));
        let file = dir.join_object(&PathComponent::from("file"));
        assert_eq!(file.as_internal_string(), "dir/file");
    }

    #[test]
    fn ordering_is_lexicographic_by_component() {
        assert!(TreePath::parse("dir/") < TreePath::parse("dirx/"));
        assert!(TreePath::parse("dir/") < TreePath::parse("dir/sub/"));
    }
}
