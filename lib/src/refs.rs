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

//! The ref store (§4.3 data model, §6 on-disk layout): named branch
//! pointers and `HEAD`. Updates are atomic with respect to concurrent
//! readers -- a filesystem implementation renames a temp file into place;
//! an in-memory implementation takes a lock.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::RwLock;

use tempfile::NamedTempFile;

use crate::commit::CommitId;
use crate::file_util::IoResultExt as _;
use crate::file_util::PathError;
use crate::file_util::create_or_reuse_dir_all;
use crate::file_util::persist_temp_file;

/// What `HEAD` currently points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Head {
    /// `HEAD` follows a branch; the branch ref is authoritative.
    Branch(String),
    /// `HEAD` is detached at a specific commit.
    Detached(CommitId),
}

pub trait RefStore: Send + Sync {
    fn get_branch(&self, name: &str) -> io::Result<Option<CommitId>>;
    fn set_branch(&self, name: &str, commit_id: &CommitId) -> io::Result<()>;
    fn delete_branch(&self, name: &str) -> io::Result<()>;
    fn list_branches(&self) -> io::Result<Vec<String>>;

    fn get_head(&self) -> io::Result<Head>;
    fn set_head(&self, head: &Head) -> io::Result<()>;

    /// Resolves `HEAD` through a followed branch to a commit id, if any
    /// commit has been made yet.
    fn head_commit(&self) -> io::Result<Option<CommitId>> {
        match self.get_head()? {
            Head::Branch(name) => self.get_branch(&name),
            Head::Detached(id) => Ok(Some(id)),
        }
    }
}

const DETACHED_PREFIX_LEN: usize = 64;

fn format_head(head: &Head) -> String {
    match head {
        Head::Branch(name) => format!("refs/heads/{name}\n"),
        Head::Detached(id) => format!("{id}\n"),
    }
}

fn parse_head(contents: &str) -> Head {
    let trimmed = contents.trim_end_matches('\n');
    if let Some(branch) = trimmed.strip_prefix("refs/heads/") {
        Head::Branch(branch.to_string())
    } else if trimmed.len() == DETACHED_PREFIX_LEN {
        Head::Detached(CommitId::from_hex_unchecked(trimmed.to_string()))
    } else {
        // Not yet pointing at a real commit (fresh repo before the first
        // commit); treat as following `main` so the first commit creates it.
        Head::Branch("main".to_string())
    }
}

/// Filesystem-backed ref store rooted at `.muse/`, matching §6's on-disk
/// layout exactly (`HEAD`, `refs/heads/<branch>`).
#[derive(Debug, Clone)]
pub struct FsRefStore {
    muse_dir: PathBuf,
}

impl FsRefStore {
    pub fn init(muse_dir: &Path, initial_branch: &str) -> Result<Self, PathError> {
        create_or_reuse_dir_all(&muse_dir.join("refs").join("heads")).context(muse_dir)?;
        let store = Self { muse_dir: muse_dir.to_path_buf() };
        store.set_head(&Head::Branch(initial_branch.to_string())).context(muse_dir)?;
        Ok(store)
    }

    pub fn load(muse_dir: &Path) -> Self {
        Self { muse_dir: muse_dir.to_path_buf() }
    }

    fn branch_path(&self, name: &str) -> PathBuf {
        self.muse_dir.join("refs").join("heads").join(name)
    }

    fn head_path(&self) -> PathBuf {
        self.muse_dir.join("HEAD")
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> io::Result<()> {
        let dir = path.parent().expect("ref path has a parent");
        create_or_reuse_dir_all(dir)?;
        let mut temp = NamedTempFile::new_in(dir)?;
        {
            use std::io::Write as _;
            temp.write_all(contents.as_bytes())?;
        }
        persist_temp_file(temp, path)?;
        Ok(())
    }
}

impl RefStore for FsRefStore {
    fn get_branch(&self, name: &str) -> io::Result<Option<CommitId>> {
        match fs::read_to_string(self.branch_path(name)) {
            Ok(contents) => {
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(CommitId::from_hex_unchecked(trimmed.to_string())))
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set_branch(&self, name: &str, commit_id: &CommitId) -> io::Result<()> {
        self.write_atomic(&self.branch_path(name), &format!("{commit_id}\n"))
    }

    fn delete_branch(&self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.branch_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn list_branches(&self) -> io::Result<Vec<String>> {
        let dir = self.muse_dir.join("refs").join("heads");
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn get_head(&self) -> io::Result<Head> {
        match fs::read_to_string(self.head_path()) {
            Ok(contents) => Ok(parse_head(&contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Head::Branch("main".to_string())),
            Err(e) => Err(e),
        }
    }

    fn set_head(&self, head: &Head) -> io::Result<()> {
        self.write_atomic(&self.head_path(), &format_head(head))
    }
}

/// In-memory ref store for engine tests.
#[derive(Default)]
pub struct MemoryRefStore {
    branches: RwLock<HashMap<String, CommitId>>,
    head: RwLock<Option<Head>>,
}

impl MemoryRefStore {
    pub fn new(initial_branch: &str) -> Self {
        Self { branches: RwLock::new(HashMap::new()), head: RwLock::new(Some(Head::Branch(initial_branch.to_string()))) }
    }
}

impl RefStore for MemoryRefStore {
    fn get_branch(&self, name: &str) -> io::Result<Option<CommitId>> {
        Ok(self.branches.read().unwrap().get(name).cloned())
    }

    fn set_branch(&self, name: &str, commit_id: &CommitId) -> io::Result<()> {
        self.branches.write().unwrap().insert(name.to_string(), commit_id.clone());
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> io::Result<()> {
        self.branches.write().unwrap().remove(name);
        Ok(())
    }

    fn list_branches(&self) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = self.branches.read().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn get_head(&self) -> io::Result<Head> {
        Ok(self.head.read().unwrap().clone().unwrap_or(Head::Branch("main".to_string())))
    }

    fn set_head(&self, head: &Head) -> io::Result<()> {
        *self.head.write().unwrap() = Some(head.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_round_trips_through_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        let muse_dir = dir.path().join(".muse");
        let store = FsRefStore::init(&muse_dir, "main").unwrap();
        assert_eq!(store.get_head().unwrap(), Head::Branch("main".to_string()));
        let id = CommitId::from_hex_unchecked("a".repeat(64));
        store.set_branch("main", &id).unwrap();
        assert_eq!(store.get_branch("main").unwrap(), Some(id.clone()));
        store.set_head(&Head::Detached(id.clone())).unwrap();
        assert_eq!(store.get_head().unwrap(), Head::Detached(id));
    }

    #[test]
    fn list_branches_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let muse_dir = dir.path().join(".muse");
        let store = FsRefStore::init(&muse_dir, "main").unwrap();
        let id = CommitId::from_hex_unchecked("b".repeat(64));
        store.set_branch("zeta", &id).unwrap();
        store.set_branch("alpha", &id).unwrap();
        assert_eq!(store.list_branches().unwrap(), vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
