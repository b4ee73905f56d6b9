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

//! The object store: content-addressed storage for immutable blobs (§4.1).
//!
//! `put` is idempotent by construction -- the id is derived from the bytes,
//! so writing the same content twice is a no-op the second time. The
//! filesystem backend uses a write-to-temp-then-rename dance so a crash
//! mid-write never leaves a partial file visible under its final name.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::content_hash::sha256_hex;
use crate::file_util::IoResultExt as _;
use crate::file_util::create_or_reuse_dir_all;
use crate::file_util::persist_content_addressed_temp_file;
use crate::object_id::ObjectId;
use crate::persistence::Persistence;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object {id} not found")]
    NotFound { id: ObjectId },
    #[error("I/O error accessing object store: {0}")]
    Io(#[from] io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

pub trait ObjectStore: Send + Sync {
    /// Computes `object_id = sha256(bytes)`, stores the bytes under that id
    /// if not already present, and returns the id either way.
    fn put(&self, bytes: &[u8]) -> ObjectStoreResult<ObjectId>;

    fn get(&self, id: &ObjectId) -> ObjectStoreResult<Vec<u8>>;

    fn exists(&self, id: &ObjectId) -> ObjectStoreResult<bool>;

    fn size(&self, id: &ObjectId) -> ObjectStoreResult<u64> {
        Ok(self.get(id)?.len() as u64)
    }
}

/// Filesystem-backed object store, laid out as `objects/<first-two>/<rest>`
/// the way git and jj's `SimpleBackend` shard their object directories.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn init(root: &Path) -> io::Result<Self> {
        create_or_reuse_dir_all(root)?;
        Ok(Self { root: root.to_path_buf() })
    }

    pub fn load(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }

    fn path_for(&self, id: &ObjectId) -> PathBuf {
        let hex = id.as_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, bytes: &[u8]) -> ObjectStoreResult<ObjectId> {
        let id = ObjectId::from_hex_unchecked(sha256_hex(bytes));
        let path = self.path_for(&id);
        if path.is_file() {
            return Ok(id);
        }
        let dir = path.parent().expect("object path always has a parent");
        create_or_reuse_dir_all(dir).context(dir)?;
        let mut temp = NamedTempFile::new_in(dir).context(dir)?;
        {
            use std::io::Write as _;
            temp.write_all(bytes).context(dir)?;
        }
        persist_content_addressed_temp_file(temp, &path).context(&path)?;
        Ok(id)
    }

    fn get(&self, id: &ObjectId) -> ObjectStoreResult<Vec<u8>> {
        let path = self.path_for(id);
        fs::read(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ObjectStoreError::NotFound { id: id.clone() }
            } else {
                ObjectStoreError::Io(e)
            }
        })
    }

    fn exists(&self, id: &ObjectId) -> ObjectStoreResult<bool> {
        Ok(self.path_for(id).is_file())
    }
}

/// In-memory object store backing engine tests; see [`crate::memory_store`].
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: std::sync::RwLock<hashbrown::HashMap<ObjectId, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, bytes: &[u8]) -> ObjectStoreResult<ObjectId> {
        let id = ObjectId::from_hex_unchecked(sha256_hex(bytes));
        let mut objects = self.objects.write().unwrap();
        objects.entry(id.clone()).or_insert_with(|| bytes.to_vec());
        Ok(id)
    }

    fn get(&self, id: &ObjectId) -> ObjectStoreResult<Vec<u8>> {
        self.objects
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound { id: id.clone() })
    }

    fn exists(&self, id: &ObjectId) -> ObjectStoreResult<bool> {
        Ok(self.objects.read().unwrap().contains_key(id))
    }
}

/// Adapts any [`Persistence`] to [`ObjectStore`], for working-tree code
/// (`snapshot_working_tree`, `write_manifest_to_tree`) that only needs the
/// object-level subset of the interface. `Repository` holds a single boxed
/// `Persistence` rather than a separate object store handle, so this is the
/// seam between the two traits.
pub struct PersistenceAsObjectStore<'a>(pub &'a dyn Persistence);

impl ObjectStore for PersistenceAsObjectStore<'_> {
    fn put(&self, bytes: &[u8]) -> ObjectStoreResult<ObjectId> {
        self.0.put_object(bytes).map_err(|e| ObjectStoreError::Io(io::Error::other(e.to_string())))
    }

    fn get(&self, id: &ObjectId) -> ObjectStoreResult<Vec<u8>> {
        self.0.get_object(id).map_err(|e| ObjectStoreError::Io(io::Error::other(e.to_string())))
    }

    fn exists(&self, id: &ObjectId) -> ObjectStoreResult<bool> {
        self.0.object_exists(id).map_err(|e| ObjectStoreError::Io(io::Error::other(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_idempotent() {
        let store = MemoryObjectStore::new();
        let a = store.put(b"beat.mid contents").unwrap();
        let b = store.put(b"beat.mid contents").unwrap();
        assert_eq!(a, b);
        assert!(store.exists(&a).unwrap());
    }

    #[test]
    fn get_missing_fails() {
        let store = MemoryObjectStore::new();
        let id = ObjectId::from_hex_unchecked(sha256_hex(b"nope"));
        assert!(matches!(store.get(&id), Err(ObjectStoreError::NotFound { .. })));
    }

    #[test]
    fn fs_store_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::init(dir.path()).unwrap();
        let id = store.put(b"hello world").unwrap();
        assert_eq!(store.get(&id).unwrap(), b"hello world");
        let id2 = store.put(b"hello world").unwrap();
        assert_eq!(id, id2);
    }
}
