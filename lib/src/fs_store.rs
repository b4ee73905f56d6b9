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

//! The filesystem-backed [`Persistence`] implementation: the on-disk
//! repository layout described in §6.
//!
//! `FsPersistence` is rooted at one repository's `.muse/` directory.
//! Unlike a multi-tenant database backend, it doesn't need `repo_id` to
//! pick a shard -- the directory already scopes it to a single
//! repository -- but every method still takes the parameter so callers
//! can't tell the two implementations apart.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use tempfile::NamedTempFile;

use crate::commit::Commit;
use crate::commit::CommitId;
use crate::file_util::IoResultExt as _;
use crate::file_util::create_or_reuse_dir_all;
use crate::file_util::persist_content_addressed_temp_file;
use crate::manifest::Manifest;
use crate::manifest::SnapshotId;
use crate::manifest::compute_snapshot_id;
use crate::object_id::ObjectId;
use crate::object_store::FsObjectStore;
use crate::object_store::ObjectStore as _;
use crate::persistence::CommitPredicate;
use crate::persistence::Persistence;
use crate::persistence::PersistenceError;
use crate::persistence::PersistenceResult;
use crate::refs::FsRefStore;
use crate::refs::RefStore as _;

/// Rooted at `<muse_dir>`; lays out `objects/`, `snapshots/`, `commits/`
/// and `refs/heads/` underneath it as described in §6. Branch refs are
/// delegated to [`FsRefStore`], the same plain-text format the working
/// tree's `HEAD` uses.
pub struct FsPersistence {
    muse_dir: PathBuf,
    objects: FsObjectStore,
    refs: FsRefStore,
}

impl FsPersistence {
    /// Creates the directory layout for a brand-new repository.
    pub fn init(muse_dir: &Path, initial_branch: &str) -> io::Result<Self> {
        create_or_reuse_dir_all(muse_dir)?;
        let objects = FsObjectStore::init(&muse_dir.join("objects"))?;
        create_or_reuse_dir_all(&muse_dir.join("snapshots"))?;
        create_or_reuse_dir_all(&muse_dir.join("commits"))?;
        let refs = FsRefStore::init(muse_dir, initial_branch).map_err(io::Error::other)?;
        Ok(Self { muse_dir: muse_dir.to_path_buf(), objects, refs })
    }

    /// Opens an existing repository's `.muse/` directory.
    pub fn load(muse_dir: &Path) -> Self {
        Self {
            muse_dir: muse_dir.to_path_buf(),
            objects: FsObjectStore::load(&muse_dir.join("objects")),
            refs: FsRefStore::load(muse_dir),
        }
    }

    fn snapshot_path(&self, id: &SnapshotId) -> PathBuf {
        let hex = id.as_hex();
        self.muse_dir.join("snapshots").join(&hex[..2]).join(format!("{}.json", &hex[2..]))
    }

    fn commit_path(&self, id: &CommitId) -> PathBuf {
        let hex = id.as_hex();
        self.muse_dir.join("commits").join(&hex[..2]).join(format!("{}.json", &hex[2..]))
    }

    fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> io::Result<()> {
        let dir = path.parent().expect("sharded path always has a parent");
        create_or_reuse_dir_all(dir)?;
        let body = serde_json::to_vec(value).expect("muse records always serialize");
        let mut temp = NamedTempFile::new_in(dir)?;
        {
            use std::io::Write as _;
            temp.write_all(&body)?;
        }
        persist_content_addressed_temp_file(temp, path)
    }

    fn iter_commit_files(&self) -> io::Result<Vec<PathBuf>> {
        let commits_dir = self.muse_dir.join("commits");
        let mut out = Vec::new();
        if !commits_dir.is_dir() {
            return Ok(out);
        }
        for shard in fs::read_dir(&commits_dir)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    out.push(entry.path());
                }
            }
        }
        Ok(out)
    }
}

impl Persistence for FsPersistence {
    fn put_object(&self, bytes: &[u8]) -> PersistenceResult<ObjectId> {
        Ok(self.objects.put(bytes)?)
    }

    fn get_object(&self, id: &ObjectId) -> PersistenceResult<Vec<u8>> {
        Ok(self.objects.get(id)?)
    }

    fn object_exists(&self, id: &ObjectId) -> PersistenceResult<bool> {
        Ok(self.objects.exists(id)?)
    }

    fn put_snapshot(&self, manifest: &Manifest) -> PersistenceResult<SnapshotId> {
        let id = compute_snapshot_id(manifest);
        let path = self.snapshot_path(&id);
        if !path.is_file() {
            Self::write_json_atomic(&path, manifest).context(&path)?;
        }
        Ok(id)
    }

    fn get_snapshot(&self, id: &SnapshotId) -> PersistenceResult<Option<Manifest>> {
        let path = self.snapshot_path(id);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| PersistenceError::Corrupt(format!("snapshot {id}: {e}"))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::Io(e)),
        }
    }

    fn put_commit(&self, commit: &Commit) -> PersistenceResult<()> {
        let path = self.commit_path(&commit.commit_id);
        if path.is_file() {
            return Err(PersistenceError::DuplicateCommit { id: commit.commit_id.clone() });
        }
        Self::write_json_atomic(&path, commit).context(&path)?;
        Ok(())
    }

    fn get_commit(&self, id: &CommitId) -> PersistenceResult<Option<Commit>> {
        let path = self.commit_path(id);
        match fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map(Some).map_err(|e| PersistenceError::Corrupt(format!("commit {id}: {e}")))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::Io(e)),
        }
    }

    fn latest_commit_on(&self, _repo_id: &str, branch: &str) -> PersistenceResult<Option<CommitId>> {
        Ok(self.refs.get_branch(branch)?)
    }

    fn set_latest_commit_on(&self, _repo_id: &str, branch: &str, commit_id: &CommitId) -> PersistenceResult<()> {
        self.refs.set_branch(branch, commit_id)?;
        Ok(())
    }

    fn commits_by_prefix(&self, repo_id: &str, prefix: &str) -> PersistenceResult<Vec<Commit>> {
        let mut out = Vec::new();
        for path in self.iter_commit_files()? {
            let bytes = fs::read(&path)?;
            let commit: Commit =
                serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Corrupt(format!("{}: {e}", path.display())))?;
            if commit.repo_id == repo_id && commit.commit_id.starts_with(prefix) {
                out.push(commit);
            }
        }
        Ok(out)
    }

    fn commits_matching(
        &self,
        repo_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        predicate: &CommitPredicate<'_>,
        limit: usize,
    ) -> PersistenceResult<Vec<Commit>> {
        let mut matched = Vec::new();
        for path in self.iter_commit_files()? {
            let bytes = fs::read(&path)?;
            let commit: Commit =
                serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Corrupt(format!("{}: {e}", path.display())))?;
            if commit.repo_id != repo_id {
                continue;
            }
            if since.is_some_and(|s| commit.committed_at < s) {
                continue;
            }
            if until.is_some_and(|u| commit.committed_at > u) {
                continue;
            }
            if predicate(&commit) {
                matched.push(commit);
            }
        }
        matched.sort_by(|a, b| b.committed_at.cmp(&a.committed_at));
        matched.truncate(limit);
        Ok(matched)
    }

    fn flush(&self) -> PersistenceResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(parents: Vec<CommitId>, snapshot_id: SnapshotId, message: &str) -> Commit {
        Commit::new("repo".into(), "main".into(), parents, snapshot_id, message.into(), "me".into(), Utc::now())
    }

    #[test]
    fn put_commit_twice_fails_like_the_memory_backend() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPersistence::init(dir.path(), "main").unwrap();
        let snapshot_id = store.put_snapshot(&Manifest::new()).unwrap();
        let c = commit(vec![], snapshot_id, "init");
        store.put_commit(&c).unwrap();
        assert!(matches!(store.put_commit(&c), Err(PersistenceError::DuplicateCommit { .. })));
    }

    #[test]
    fn ref_and_commit_round_trip_across_fresh_handle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPersistence::init(dir.path(), "main").unwrap();
        let snapshot_id = store.put_snapshot(&Manifest::new()).unwrap();
        let c = commit(vec![], snapshot_id, "init");
        store.put_commit(&c).unwrap();
        store.set_latest_commit_on("repo", "main", &c.commit_id).unwrap();
        drop(store);

        let reopened = FsPersistence::load(dir.path());
        assert_eq!(reopened.latest_commit_on("repo", "main").unwrap(), Some(c.commit_id.clone()));
        assert_eq!(reopened.get_commit(&c.commit_id).unwrap().unwrap().message, "init");
    }

    #[test]
    fn commits_by_prefix_resolves_short_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPersistence::init(dir.path(), "main").unwrap();
        let snapshot_id = store.put_snapshot(&Manifest::new()).unwrap();
        let c = commit(vec![], snapshot_id, "init");
        store.put_commit(&c).unwrap();
        let prefix = &c.commit_id.as_hex()[..8];
        let matches = store.commits_by_prefix("repo", prefix).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].commit_id, c.commit_id);
    }
}
