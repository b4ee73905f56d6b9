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

//! Commits: the immutable DAG nodes (§3, §4.3).
//!
//! A commit's id is derived from its content, not assigned. This gives
//! retries and push/pull free idempotence: replaying the exact same commit
//! twice produces the same id, so callers can always upsert rather than
//! worry about duplicates.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::content_hash::CanonicalHasher;
use crate::manifest::SnapshotId;
use crate::object_id::hex_id_type;

hex_id_type!(
    /// Id of a [`Commit`], the SHA-256 of its canonical serialization.
    pub CommitId
);

/// An immutable commit record. `parent_ids` has 0 (root), 1 (linear), or 2
/// (merge) entries; for a merge, `parent_ids[0]` is "ours" and
/// `parent_ids[1]` is "theirs" -- first-parent traversal depends on this
/// order being preserved exactly as given at construction time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Commit {
    pub commit_id: CommitId,
    pub repo_id: String,
    pub branch: String,
    pub parent_ids: Vec<CommitId>,
    pub snapshot_id: SnapshotId,
    pub message: String,
    pub author: String,
    pub committed_at: DateTime<Utc>,
}

impl Commit {
    /// Builds a commit, computing `commit_id` from the other fields. The
    /// caller supplies everything else; this is the only constructor so a
    /// `Commit` can never exist with a stale or mismatched id.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo_id: String,
        branch: String,
        parent_ids: Vec<CommitId>,
        snapshot_id: SnapshotId,
        message: String,
        author: String,
        committed_at: DateTime<Utc>,
    ) -> Self {
        let commit_id = compute_commit_id(&parent_ids, &snapshot_id, &message, committed_at);
        Self { commit_id, repo_id, branch, parent_ids, snapshot_id, message, author, committed_at }
    }

    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() == 2
    }

    /// The "mainline" parent for first-parent traversal (`CommitsBetween`,
    /// rebase, `log --first-parent`). `None` for a root commit.
    pub fn first_parent(&self) -> Option<&CommitId> {
        self.parent_ids.first()
    }

    /// For a merge commit, the integrated side ("theirs").
    pub fn second_parent(&self) -> Option<&CommitId> {
        self.parent_ids.get(1)
    }

    /// Recomputes the id from the current fields and checks it matches
    /// `commit_id`. Used when loading a commit from untrusted storage to
    /// detect corruption without a separate checksum field.
    pub fn verify_id(&self) -> bool {
        compute_commit_id(&self.parent_ids, &self.snapshot_id, &self.message, self.committed_at) == self.commit_id
    }
}

/// `commit_id = sha256(parent_ids, snapshot_id, message, committed_at)`
/// (§3). Two commits with identical parents, snapshot, message, and
/// timestamp collide by construction -- that's intentional, not a bug: it
/// makes commit creation idempotent under retry.
fn compute_commit_id(
    parent_ids: &[CommitId],
    snapshot_id: &SnapshotId,
    message: &str,
    committed_at: DateTime<Utc>,
) -> CommitId {
    let mut hasher = CanonicalHasher::new();
    hasher.update_field(&parent_ids.len().to_string());
    for parent in parent_ids {
        hasher.update_field(parent.as_hex());
    }
    hasher.update_field(snapshot_id.as_hex());
    hasher.update_field(message);
    hasher.update_field(&committed_at.timestamp_nanos_opt().unwrap_or(committed_at.timestamp()).to_string());
    CommitId::from_hex_unchecked(hasher.finalize_hex())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(hex: &str) -> SnapshotId {
        SnapshotId::from_hex_unchecked(hex.repeat(64).chars().take(64).collect::<String>())
    }

    #[test]
    fn identical_inputs_collide_by_construction() {
        let ts = Utc::now();
        let c1 = Commit::new("repo".into(), "main".into(), vec![], snap("a"), "msg".into(), "me".into(), ts);
        let c2 = Commit::new("repo".into(), "main".into(), vec![], snap("a"), "msg".into(), "me".into(), ts);
        assert_eq!(c1.commit_id, c2.commit_id);
    }

    #[test]
    fn differing_message_changes_id() {
        let ts = Utc::now();
        let c1 = Commit::new("repo".into(), "main".into(), vec![], snap("a"), "msg1".into(), "me".into(), ts);
        let c2 = Commit::new("repo".into(), "main".into(), vec![], snap("a"), "msg2".into(), "me".into(), ts);
        assert_ne!(c1.commit_id, c2.commit_id);
    }

    #[test]
    fn verify_id_detects_tampering() {
        let ts = Utc::now();
        let mut c = Commit::new("repo".into(), "main".into(), vec![], snap("a"), "msg".into(), "me".into(), ts);
        assert!(c.verify_id());
        c.message = "tampered".into();
        assert!(!c.verify_id());
    }
}
