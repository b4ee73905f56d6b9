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

//! Fixture builders for `muse-lib`'s engine tests. All engine tests run
//! against the in-memory backend, so every fixture here wires up a
//! `Repository::init_memory` over a real temp directory for the working
//! tree (files still have to live somewhere on disk to be snapshotted)
//! without touching `.muse` on disk at all.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::TimeZone as _;
use chrono::Utc;
use muse_lib::CommitId;
use muse_lib::Repository;
use muse_lib::Revision;

pub const TEST_AUTHOR: &str = "Test Author <test@example.invalid>";

/// A fixed clock so fixtures don't depend on wall-clock time: advances by
/// one second per call so successive commits in a test sort the way a
/// human would expect.
pub struct TestClock {
    next: i64,
}

impl TestClock {
    pub fn new() -> Self {
        Self { next: 1_700_000_000 }
    }

    pub fn tick(&mut self) -> DateTime<Utc> {
        let ts = Utc.timestamp_opt(self.next, 0).single().expect("valid fixture timestamp");
        self.next += 1;
        ts
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

/// An in-memory repository with a real working-tree directory backing it,
/// plus a monotonic clock so commit ordering in assertions is deterministic.
pub struct TestRepo {
    pub repo: Repository,
    pub working_tree: tempfile::TempDir,
    pub clock: TestClock,
}

impl TestRepo {
    pub fn init(initial_branch: &str) -> Self {
        let working_tree = tempfile::tempdir().expect("tempdir");
        let state_dir = working_tree.path().join(".muse-state");
        let repo = Repository::init_memory(working_tree.path(), &state_dir, "test-repo".to_string(), initial_branch);
        Self { repo, working_tree, clock: TestClock::new() }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.working_tree.path().join(relative)
    }

    /// Writes `contents` to `relative` under the working tree, creating
    /// parent directories as needed.
    pub fn write_file(&self, relative: &str, contents: &[u8]) {
        let dest = self.path(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(dest, contents).expect("write fixture file");
    }

    pub fn remove_file(&self, relative: &str) {
        fs::remove_file(self.path(relative)).expect("remove fixture file");
    }

    /// Snapshots the working tree and commits it on the current branch.
    pub fn commit(&mut self, message: &str) -> CommitId {
        let at = self.clock.tick();
        self.repo.commit(message, TEST_AUTHOR, at).expect("fixture commit should not conflict with nothing-to-commit")
    }

    pub fn tip(&self, branch: &str) -> CommitId {
        self.repo.resolve(Revision::Branch(branch)).expect("branch should have a tip")
    }
}

/// Writes `contents` at `path` in an already-checked-out working tree `root`.
pub fn write_artifact(root: &Path, relative: &str, contents: &[u8]) {
    let dest = root.join(relative);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(dest, contents).expect("write fixture file");
}
