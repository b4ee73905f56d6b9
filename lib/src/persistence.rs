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

//! The persistence interface (§4.3, §4.6 of the design notes): the narrow
//! abstraction every other component in this crate is built against.
//!
//! The engine never talks to a database or a filesystem directly -- it
//! calls this trait. Two implementations exist: [`crate::memory_store`]
//! (used by every engine test) and [`crate::fs_store`] (the on-disk
//! repository layout in §6). A production hub server would supply a
//! third, database-backed implementation; nothing in this crate assumes
//! which one it's talking to.

use chrono::DateTime;
use chrono::Utc;
use thiserror::Error;

use crate::commit::Commit;
use crate::commit::CommitId;
use crate::manifest::Manifest;
use crate::manifest::SnapshotId;
use crate::object_id::ObjectId;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("duplicate commit id {id}: PutCommit must not be called twice for the same id")]
    DuplicateCommit { id: CommitId },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] crate::object_store::ObjectStoreError),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// A predicate over commit messages, used by `CommitsMatching`. Kept as a
/// closure rather than a query AST: a database-backed implementation is
/// free to push down whatever subset it can (plain substrings, per §4.7)
/// and fall back to calling the predicate for the rest.
pub type CommitPredicate<'a> = dyn Fn(&Commit) -> bool + Send + Sync + 'a;

/// The persistence interface the engine consumes. All operations are
/// upserts or pure reads except `PutCommit`, which the design calls out
/// as an insert -- calling it twice with the same id is a programming
/// error in the engine, not a condition callers need to handle.
pub trait Persistence: Send + Sync {
    fn put_object(&self, bytes: &[u8]) -> PersistenceResult<ObjectId>;
    fn get_object(&self, id: &ObjectId) -> PersistenceResult<Vec<u8>>;
    fn object_exists(&self, id: &ObjectId) -> PersistenceResult<bool>;

    fn put_snapshot(&self, manifest: &Manifest) -> PersistenceResult<SnapshotId>;
    fn get_snapshot(&self, id: &SnapshotId) -> PersistenceResult<Option<Manifest>>;

    fn put_commit(&self, commit: &Commit) -> PersistenceResult<()>;
    fn get_commit(&self, id: &CommitId) -> PersistenceResult<Option<Commit>>;

    fn latest_commit_on(&self, repo_id: &str, branch: &str) -> PersistenceResult<Option<CommitId>>;
    fn set_latest_commit_on(&self, repo_id: &str, branch: &str, commit_id: &CommitId) -> PersistenceResult<()>;

    /// Short-id resolution: every stored commit whose id starts with
    /// `prefix`.
    fn commits_by_prefix(&self, repo_id: &str, prefix: &str) -> PersistenceResult<Vec<Commit>>;

    /// Find-engine support (§4.7): commits in `repo_id` matching
    /// `predicate`, most recent `committed_at` first, capped at `limit`.
    /// `since`/`until` bound `committed_at` and may be pushed down by a
    /// database-backed implementation.
    fn commits_matching(
        &self,
        repo_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        predicate: &CommitPredicate<'_>,
        limit: usize,
    ) -> PersistenceResult<Vec<Commit>>;

    /// Called after a logically complete unit of work (snapshot
    /// persisted, commit persisted, ref updated) so a backend with
    /// buffered writes can make them durable before the next step
    /// proceeds. The in-memory backend's implementation is a no-op.
    fn flush(&self) -> PersistenceResult<()> {
        Ok(())
    }
}
