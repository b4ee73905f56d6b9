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

//! The working tree (§4 "Working Tree" component): the filesystem
//! projection of a snapshot, and the inverse operation of writing
//! individual objects back out to disk during merge/rebase conflict
//! handling and `--abort`.

use std::fs;
use std::path::Path;

use crate::manifest::Manifest;
use crate::manifest::build_from_tree;
use crate::object_store::ObjectStore;
use crate::object_store::ObjectStoreResult;
use crate::persistence::Persistence;
use crate::persistence::PersistenceResult;

/// Reads the current state of the working tree at `root` into a manifest,
/// hashing and storing every file's content along the way.
pub fn snapshot_working_tree(
    root: &Path,
    store: &dyn ObjectStore,
) -> Result<Manifest, crate::manifest::BuildManifestError> {
    build_from_tree(root, store, &[crate::manifest::MUSE_DIR_NAME])
}

/// Writes every entry of `manifest` to disk under `root`, creating parent
/// directories as needed. Used for checkout after a fast-forward, and
/// after `merge --abort` / `rebase --abort` restore a manifest to disk.
pub fn write_manifest_to_tree(root: &Path, manifest: &Manifest, objects: &dyn ObjectStore) -> ObjectStoreResult<()> {
    for (path, object_id) in manifest.iter() {
        let bytes = objects.get(object_id)?;
        let dest = root.join(path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, bytes)?;
    }
    Ok(())
}

/// Writes a single path's content out using the persisted object
/// referenced by `manifest`. Used to materialize "theirs" copies of
/// conflicted files for inspection, and to rewrite an individual file
/// during `merge --abort`.
pub fn write_path(root: &Path, path: &str, manifest: &Manifest, store: &dyn Persistence) -> PersistenceResult<()> {
    let dest = root.join(path);
    match manifest.get(path) {
        Some(object_id) => {
            let bytes = store.get_object(object_id)?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dest, bytes)?;
        }
        None => {
            let _ = fs::remove_file(&dest);
        }
    }
    Ok(())
}

/// Removes `path` from the working tree if present. Used by
/// `merge --abort` to delete files that only `theirs` added.
pub fn remove_path(root: &Path, path: &str) -> std::io::Result<()> {
    match fs::remove_file(root.join(path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryObjectStore;

    #[test]
    fn write_then_snapshot_round_trips() {
        let store = MemoryObjectStore::new();
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::new();
        let id = store.put(b"note data").unwrap();
        manifest.insert("tracks/beat.mid".to_string(), id);
        write_manifest_to_tree(dir.path(), &manifest, &store).unwrap();
        assert!(dir.path().join("tracks/beat.mid").is_file());
        let read_back = snapshot_working_tree(dir.path(), &store).unwrap();
        assert_eq!(read_back, manifest);
    }

    #[test]
    fn build_from_tree_excludes_muse_dir() {
        let store = MemoryObjectStore::new();
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".muse")).unwrap();
        fs::write(dir.path().join(".muse").join("HEAD"), b"refs/heads/main\n").unwrap();
        fs::write(dir.path().join("song.json"), b"{}").unwrap();
        let manifest = snapshot_working_tree(dir.path(), &store).unwrap();
        assert_eq!(manifest.paths().collect::<Vec<_>>(), vec!["song.json"]);
    }
}
