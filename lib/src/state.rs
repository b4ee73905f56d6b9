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

//! `MergeState` and `RebaseState` (§3, §6): on-disk records describing an
//! interrupted operation. Each carries everything `--continue` and
//! `--abort` need; nothing is recovered from reflogs or other side
//! channels, per the design notes.
//!
//! Both are written by rename-from-temp so a reader never observes a
//! half-written file, and both are read defensively: an unparseable file
//! is treated as "no operation in progress" rather than a crash, because
//! the user's recovery path is to delete the file and retry (§7).

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::commit::CommitId;
use crate::file_util::persist_temp_file;

pub const MERGE_STATE_FILE: &str = "MERGE_STATE.json";
pub const REBASE_STATE_FILE: &str = "REBASE_STATE.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeState {
    pub base_commit: Option<CommitId>,
    pub ours_commit: CommitId,
    pub theirs_commit: CommitId,
    pub conflict_paths: Vec<String>,
    pub other_branch: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RebaseState {
    pub upstream_commit: CommitId,
    pub base_commit: Option<CommitId>,
    pub original_branch: String,
    pub original_head: CommitId,
    pub commits_to_replay: Vec<CommitId>,
    pub current_onto: CommitId,
    pub completed_pairs: Vec<(CommitId, CommitId)>,
    pub current_commit: Option<CommitId>,
    pub conflict_paths: Vec<String>,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let dir = path.parent().expect("state file path has a parent");
    let body = serde_json::to_vec_pretty(value).expect("state records always serialize");
    let mut temp = NamedTempFile::new_in(dir)?;
    {
        use std::io::Write as _;
        temp.write_all(&body)?;
    }
    persist_temp_file(temp, path)?;
    Ok(())
}

/// Reads and parses a state file. Returns `Ok(None)` both when the file is
/// absent and when it fails to parse -- callers turn both into
/// `NoMergeInProgress` / `NoRebaseInProgress` rather than surfacing a
/// parse error, matching §7's "read their state files defensively".
fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> io::Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub struct StateFiles {
    muse_dir: PathBuf,
}

impl StateFiles {
    pub fn new(muse_dir: &Path) -> Self {
        Self { muse_dir: muse_dir.to_path_buf() }
    }

    fn merge_path(&self) -> PathBuf {
        self.muse_dir.join(MERGE_STATE_FILE)
    }

    fn rebase_path(&self) -> PathBuf {
        self.muse_dir.join(REBASE_STATE_FILE)
    }

    pub fn read_merge(&self) -> io::Result<Option<MergeState>> {
        read_json(&self.merge_path())
    }

    pub fn write_merge(&self, state: &MergeState) -> io::Result<()> {
        write_json(&self.merge_path(), state)
    }

    pub fn clear_merge(&self) -> io::Result<()> {
        remove_if_present(&self.merge_path())
    }

    pub fn read_rebase(&self) -> io::Result<Option<RebaseState>> {
        read_json(&self.rebase_path())
    }

    pub fn write_rebase(&self, state: &RebaseState) -> io::Result<()> {
        write_json(&self.rebase_path(), state)
    }

    pub fn clear_rebase(&self) -> io::Result<()> {
        remove_if_present(&self.rebase_path())
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(c: char) -> CommitId {
        CommitId::from_hex_unchecked(c.to_string().repeat(64))
    }

    #[test]
    fn merge_state_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let files = StateFiles::new(dir.path());
        let state = MergeState {
            base_commit: Some(cid('a')),
            ours_commit: cid('b'),
            theirs_commit: cid('c'),
            conflict_paths: vec!["beat.mid".to_string()],
            other_branch: Some("exp".to_string()),
        };
        files.write_merge(&state).unwrap();
        let read_back = files.read_merge().unwrap().unwrap();
        assert_eq!(read_back.conflict_paths, vec!["beat.mid".to_string()]);
        files.clear_merge().unwrap();
        assert!(files.read_merge().unwrap().is_none());
    }

    #[test]
    fn unparseable_state_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let files = StateFiles::new(dir.path());
        fs::write(dir.path().join(MERGE_STATE_FILE), b"not json").unwrap();
        assert!(files.read_merge().unwrap().is_none());
    }
}
