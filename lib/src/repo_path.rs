// Copyright 2024 The Muse Authors
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

//! Repo-relative POSIX paths.
//!
//! Manifest keys are always normalized: no leading `/`, no `.` or `..`
//! components, forward slashes only. This lets `compute_snapshot_id` treat
//! paths as plain bytes without worrying about platform path quirks.

use std::fmt;
use std::path::Component;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidRepoPath {
    #[error("path {0:?} is absolute")]
    Absolute(String),
    #[error("path {0:?} contains a `..` component")]
    ParentComponent(String),
    #[error("path {0:?} contains an empty component")]
    EmptyComponent(String),
    #[error("path {0:?} is not valid UTF-8")]
    NotUtf8(String),
}

/// A normalized, repo-relative POSIX path. Cheap to clone; stored as an
/// owned `String` rather than jj's borrowed/owned component split because
/// manifests never need component-wise tree traversal -- just byte-exact
/// map keys.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepoPath(String);

impl RepoPath {
    /// Normalizes and validates `value` as a repo path. Rejects absolute
    /// paths, `..` components, and backslashes (always treated as a
    /// literal character, never a separator, so behaviour is identical on
    /// every platform).
    pub fn parse(value: &str) -> Result<Self, InvalidRepoPath> {
        if value.starts_with('/') {
            return Err(InvalidRepoPath::Absolute(value.to_string()));
        }
        for component in value.split('/') {
            match component {
                "" => return Err(InvalidRepoPath::EmptyComponent(value.to_string())),
                "." => continue,
                ".." => return Err(InvalidRepoPath::ParentComponent(value.to_string())),
                _ => {}
            }
        }
        let normalized: Vec<&str> = value.split('/').filter(|c| *c != ".").collect();
        Ok(Self(normalized.join("/")))
    }

    /// Builds a `RepoPath` from a filesystem path relative to the working
    /// tree root, converting platform separators to `/`.
    pub fn from_fs_relative(path: &Path) -> Result<Self, InvalidRepoPath> {
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    let part = part
                        .to_str()
                        .ok_or_else(|| InvalidRepoPath::NotUtf8(path.to_string_lossy().into_owned()))?;
                    parts.push(part.to_string());
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(InvalidRepoPath::ParentComponent(path.to_string_lossy().into_owned()));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(InvalidRepoPath::Absolute(path.to_string_lossy().into_owned()));
                }
            }
        }
        Self::parse(&parts.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoPath({:?})", self.0)
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_absolute_and_parent_dir() {
        assert!(matches!(RepoPath::parse("/a/b"), Err(InvalidRepoPath::Absolute(_))));
        assert!(matches!(RepoPath::parse("a/../b"), Err(InvalidRepoPath::ParentComponent(_))));
        assert!(matches!(RepoPath::parse("a//b"), Err(InvalidRepoPath::EmptyComponent(_))));
    }

    #[test]
    fn normalizes_current_dir_components() {
        let p = RepoPath::parse("./tracks/./beat.mid").unwrap();
        assert_eq!(p.as_str(), "tracks/beat.mid");
    }
}
