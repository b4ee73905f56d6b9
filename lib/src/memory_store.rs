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

//! In-memory [`Persistence`] implementation. This is what every engine
//! test runs against (§9 design notes: "all engine tests run against the
//! in-memory backend"); a production deployment would swap in a
//! database-backed implementation without the engine noticing.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::DateTime;
use chrono::Utc;

use crate::commit::Commit;
use crate::commit::CommitId;
use crate::manifest::Manifest;
use crate::manifest::SnapshotId;
use crate::manifest::compute_snapshot_id;
use crate::object_id::ObjectId;
use crate::object_store::MemoryObjectStore;
use crate::object_store::ObjectStore as _;
use crate::persistence::CommitPredicate;
use crate::persistence::Persistence;
use crate::persistence::PersistenceError;
use crate::persistence::PersistenceResult;

#[derive(Default)]
struct Inner {
    objects: MemoryObjectStore,
    snapshots: RwLock<HashMap<String, Manifest>>,
    commits: RwLock<HashMap<String, Commit>>,
    refs: RwLock<HashMap<(String, String), CommitId>>,
}

/// A single process-wide store, shared by every repository opened against
/// it. Cheap to construct; tests typically create one per test.
#[derive(Default)]
pub struct MemoryPersistence {
    inner: Inner,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn put_object(&self, bytes: &[u8]) -> PersistenceResult<ObjectId> {
        Ok(self.inner.objects.put(bytes)?)
    }

    fn get_object(&self, id: &ObjectId) -> PersistenceResult<Vec<u8>> {
        Ok(self.inner.objects.get(id)?)
    }

    fn object_exists(&self, id: &ObjectId) -> PersistenceResult<bool> {
        Ok(self.inner.objects.exists(id)?)
    }

    fn put_snapshot(&self, manifest: &Manifest) -> PersistenceResult<SnapshotId> {
        let id = compute_snapshot_id(manifest);
        self.inner.snapshots.write().unwrap().entry(id.as_hex().to_string()).or_insert_with(|| manifest.clone());
        Ok(id)
    }

    fn get_snapshot(&self, id: &SnapshotId) -> PersistenceResult<Option<Manifest>> {
        Ok(self.inner.snapshots.read().unwrap().get(id.as_hex()).cloned())
    }

    fn put_commit(&self, commit: &Commit) -> PersistenceResult<()> {
        let mut commits = self.inner.commits.write().unwrap();
        if commits.contains_key(commit.commit_id.as_hex()) {
            return Err(PersistenceError::DuplicateCommit { id: commit.commit_id.clone() });
        }
        commits.insert(commit.commit_id.as_hex().to_string(), commit.clone());
        Ok(())
    }

    fn get_commit(&self, id: &CommitId) -> PersistenceResult<Option<Commit>> {
        Ok(self.inner.commits.read().unwrap().get(id.as_hex()).cloned())
    }

    fn latest_commit_on(&self, repo_id: &str, branch: &str) -> PersistenceResult<Option<CommitId>> {
        Ok(self.inner.refs.read().unwrap().get(&(repo_id.to_string(), branch.to_string())).cloned())
    }

    fn set_latest_commit_on(&self, repo_id: &str, branch: &str, commit_id: &CommitId) -> PersistenceResult<()> {
        self.inner.refs.write().unwrap().insert((repo_id.to_string(), branch.to_string()), commit_id.clone());
        Ok(())
    }

    fn commits_by_prefix(&self, repo_id: &str, prefix: &str) -> PersistenceResult<Vec<Commit>> {
        Ok(self
            .inner
            .commits
            .read()
            .unwrap()
            .values()
            .filter(|c| c.repo_id == repo_id && c.commit_id.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn commits_matching(
        &self,
        repo_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        predicate: &CommitPredicate<'_>,
        limit: usize,
    ) -> PersistenceResult<Vec<Commit>> {
        let commits = self.inner.commits.read().unwrap();
        let mut matched: Vec<Commit> = commits
            .values()
            .filter(|c| c.repo_id == repo_id)
            .filter(|c| since.is_none_or(|s| c.committed_at >= s))
            .filter(|c| until.is_none_or(|u| c.committed_at <= u))
            .filter(|c| predicate(c))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.committed_at.cmp(&a.committed_at));
        matched.truncate(limit);
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_commit_twice_is_a_programming_error() {
        let store = MemoryPersistence::new();
        let snapshot = Manifest::new();
        let snapshot_id = store.put_snapshot(&snapshot).unwrap();
        let commit = Commit::new(
            "repo".into(),
            "main".into(),
            vec![],
            snapshot_id,
            "init".into(),
            "me".into(),
            Utc::now(),
        );
        store.put_commit(&commit).unwrap();
        assert!(matches!(store.put_commit(&commit), Err(PersistenceError::DuplicateCommit { .. })));
    }

    #[test]
    fn ref_updates_are_read_back() {
        let store = MemoryPersistence::new();
        let snapshot_id = store.put_snapshot(&Manifest::new()).unwrap();
        let commit =
            Commit::new("repo".into(), "main".into(), vec![], snapshot_id, "init".into(), "me".into(), Utc::now());
        store.put_commit(&commit).unwrap();
        store.set_latest_commit_on("repo", "main", &commit.commit_id).unwrap();
        assert_eq!(store.latest_commit_on("repo", "main").unwrap(), Some(commit.commit_id));
    }
}
