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

//! The snapshot manifest (§4.2): an ordered `path -> object_id` mapping and
//! the handful of pure functions the rest of the engine builds on
//! (`diff`, `apply_delta`, `compute_snapshot_id`).

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::content_hash::CanonicalHasher;
use crate::file_util::IoResultExt as _;
use crate::object_id::ObjectId;
use crate::object_store::ObjectStore;
use crate::repo_path::RepoPath;

/// The engine's own metadata directory, always excluded from
/// `build_from_tree` walks.
pub const MUSE_DIR_NAME: &str = ".muse";

/// Id of a [`Manifest`], computed by [`compute_snapshot_id`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn from_hex_unchecked(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SnapshotId({})", self.0)
    }
}

impl serde::Serialize for SnapshotId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for SnapshotId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

/// An ordered mapping from repo-relative path to object id. `BTreeMap`
/// keeps entries sorted by path for free, which is exactly the order
/// `compute_snapshot_id` needs.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Manifest {
    entries: BTreeMap<String, ObjectId>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, ObjectId)>) -> Self {
        Self { entries: entries.into_iter().collect() }
    }

    pub fn get(&self, path: &str) -> Option<&ObjectId> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn insert(&mut self, path: String, object_id: ObjectId) {
        self.entries.insert(path, object_id);
    }

    pub fn remove(&mut self, path: &str) -> Option<ObjectId> {
        self.entries.remove(path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectId)> {
        self.entries.iter().map(|(p, id)| (p.as_str(), id))
    }
}

/// Walks `root`, hashing every regular file into `store` and collecting a
/// manifest of the result. `exclude_dirs` (by directory name, matched at
/// any depth) is applied the way the engine always excludes `.muse`.
pub fn build_from_tree(
    root: &Path,
    store: &dyn ObjectStore,
    exclude_dirs: &[&str],
) -> Result<Manifest, BuildManifestError> {
    let mut manifest = Manifest::new();
    walk_dir(root, root, store, exclude_dirs, &mut manifest)?;
    Ok(manifest)
}

fn walk_dir(
    root: &Path,
    dir: &Path,
    store: &dyn ObjectStore,
    exclude_dirs: &[&str],
    manifest: &mut Manifest,
) -> Result<(), BuildManifestError> {
    let mut read_dir: Vec<_> = fs::read_dir(dir).context(dir)?.collect::<Result<_, _>>().context(dir)?;
    read_dir.sort_by_key(|entry| entry.file_name());
    for entry in read_dir {
        let path = entry.path();
        let file_type = entry.file_type().context(&path)?;
        if file_type.is_dir() {
            let name = entry.file_name();
            if exclude_dirs.iter().any(|excluded| name.to_str() == Some(*excluded)) {
                continue;
            }
            walk_dir(root, &path, store, exclude_dirs, manifest)?;
        } else if file_type.is_file() {
            let relative = path.strip_prefix(root).expect("walked path is under root");
            let repo_path = RepoPath::from_fs_relative(relative)
                .map_err(|source| BuildManifestError::InvalidPath { path: relative.display().to_string(), source })?;
            let bytes = fs::read(&path).context(&path)?;
            let object_id = store.put(&bytes)?;
            manifest.insert(repo_path.into_string(), object_id);
        }
        // Symlinks and other special files are skipped: the spec treats the
        // working tree as a flat bag of musical artifacts.
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum BuildManifestError {
    #[error(transparent)]
    Io(#[from] crate::file_util::PathError),
    #[error("invalid path {path:?}: {source}")]
    InvalidPath { path: String, source: crate::repo_path::InvalidRepoPath },
    #[error(transparent)]
    Store(#[from] crate::object_store::ObjectStoreError),
}

/// The snapshot id is the SHA-256 of entries sorted by path, each encoded
/// as `path\0object_id\n` (§3). `Manifest` already stores entries sorted,
/// so this is a single linear pass.
pub fn compute_snapshot_id(manifest: &Manifest) -> SnapshotId {
    let mut hasher = CanonicalHasher::new();
    for (path, object_id) in manifest.iter() {
        hasher.update(path.as_bytes());
        hasher.update(&[0u8]);
        hasher.update(object_id.as_hex().as_bytes());
        hasher.update(&[b'\n']);
    }
    SnapshotId::from_hex_unchecked(hasher.finalize_hex())
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManifestDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub modified: BTreeSet<String>,
}

impl ManifestDiff {
    /// All paths touched by this diff, in any direction.
    pub fn changed_paths(&self) -> BTreeSet<String> {
        self.added
            .iter()
            .chain(self.removed.iter())
            .chain(self.modified.iter())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Three-way classification of paths between `a` and `b`: `added` are in
/// `b` only, `removed` are in `a` only, `modified` are in both with
/// differing object ids. Comparison is byte-exact (object id equality).
pub fn diff(a: &Manifest, b: &Manifest) -> ManifestDiff {
    let mut result = ManifestDiff::default();
    for (path, b_id) in b.iter() {
        match a.get(path) {
            None => {
                result.added.insert(path.to_string());
            }
            Some(a_id) if a_id != b_id => {
                result.modified.insert(path.to_string());
            }
            Some(_) => {}
        }
    }
    for path in a.paths() {
        if !b.contains(path) {
            result.removed.insert(path.to_string());
        }
    }
    result
}

/// Produces a new manifest with `additions` merged in (inserted or
/// overwritten) and `deletions` removed. Pure: `onto` is not modified.
pub fn apply_delta(
    onto: &Manifest,
    additions: impl IntoIterator<Item = (String, ObjectId)>,
    deletions: impl IntoIterator<Item = String>,
) -> Manifest {
    let mut result = onto.clone();
    for path in deletions {
        result.remove(&path);
    }
    for (path, id) in additions {
        result.insert(path, id);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryObjectStore;

    fn oid(store: &MemoryObjectStore, content: &[u8]) -> ObjectId {
        store.put(content).unwrap()
    }

    #[test]
    fn snapshot_id_is_deterministic_and_order_independent() {
        let store = MemoryObjectStore::new();
        let a = oid(&store, b"a");
        let b = oid(&store, b"b");
        let m1 = Manifest::from_entries([("b.mid".to_string(), b.clone()), ("a.mid".to_string(), a.clone())]);
        let m2 = Manifest::from_entries([("a.mid".to_string(), a), ("b.mid".to_string(), b)]);
        assert_eq!(compute_snapshot_id(&m1).as_hex(), compute_snapshot_id(&m2).as_hex());
    }

    #[test]
    fn empty_manifest_has_canonical_empty_id() {
        let m = Manifest::new();
        let id = compute_snapshot_id(&m);
        assert_eq!(id.as_hex(), compute_snapshot_id(&Manifest::new()).as_hex());
        assert_eq!(id.as_hex().len(), 64);
    }

    #[test]
    fn diff_classifies_added_removed_modified() {
        let store = MemoryObjectStore::new();
        let v1 = oid(&store, b"v1");
        let v2 = oid(&store, b"v2");
        let base = Manifest::from_entries([
            ("keep.mid".to_string(), v1.clone()),
            ("gone.mid".to_string(), v1.clone()),
            ("change.mid".to_string(), v1.clone()),
        ]);
        let next = Manifest::from_entries([
            ("keep.mid".to_string(), v1.clone()),
            ("change.mid".to_string(), v2.clone()),
            ("new.mid".to_string(), v2),
        ]);
        let d = diff(&base, &next);
        assert_eq!(d.added, BTreeSet::from(["new.mid".to_string()]));
        assert_eq!(d.removed, BTreeSet::from(["gone.mid".to_string()]));
        assert_eq!(d.modified, BTreeSet::from(["change.mid".to_string()]));
    }

    #[test]
    fn same_object_id_on_both_sides_is_not_modified() {
        let store = MemoryObjectStore::new();
        let v1 = oid(&store, b"v1");
        let base = Manifest::from_entries([("x.mid".to_string(), v1.clone())]);
        let next = Manifest::from_entries([("x.mid".to_string(), v1)]);
        assert!(diff(&base, &next).is_empty());
    }

    #[test]
    fn apply_delta_is_inverse_of_diff() {
        let store = MemoryObjectStore::new();
        let v1 = oid(&store, b"v1");
        let v2 = oid(&store, b"v2");
        let m = Manifest::from_entries([("a".to_string(), v1.clone()), ("b".to_string(), v1.clone())]);
        let m2 = Manifest::from_entries([("b".to_string(), v2.clone()), ("c".to_string(), v2)]);
        let d = diff(&m, &m2);
        let additions: Vec<_> = d
            .added
            .iter()
            .chain(d.modified.iter())
            .map(|p| (p.clone(), m2.get(p).unwrap().clone()))
            .collect();
        let rebuilt = apply_delta(&m, additions, d.removed.clone());
        assert_eq!(rebuilt, m2);
    }
}
