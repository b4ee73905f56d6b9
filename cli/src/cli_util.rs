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

//! Glue between `clap` and the engine: locating the repository root from
//! the current directory and mapping [`MuseError`] to process exit codes.

use std::env;
use std::path::Path;
use std::path::PathBuf;

use muse_lib::MuseError;
use muse_lib::Repository;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_USER_ERROR: i32 = 1;
pub const EXIT_NOT_IN_REPOSITORY: i32 = 2;
pub const EXIT_INTERNAL_ERROR: i32 = 3;

pub fn exit_code(err: &MuseError) -> i32 {
    match err {
        MuseError::NotInRepository => EXIT_NOT_IN_REPOSITORY,
        MuseError::CorruptState(_) | MuseError::IoError(_) => EXIT_INTERNAL_ERROR,
        _ => EXIT_USER_ERROR,
    }
}

/// Walks up from the current directory looking for `.muse`, the way git
/// and jj locate a repository root from any subdirectory.
pub fn find_repo_root() -> Option<PathBuf> {
    let mut dir = env::current_dir().ok()?;
    loop {
        if dir.join(muse_lib::manifest::MUSE_DIR_NAME).is_dir() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

pub fn open_repo(root_override: Option<&Path>) -> Result<Repository, MuseError> {
    let root = match root_override {
        Some(root) => root.to_path_buf(),
        None => find_repo_root().ok_or(MuseError::NotInRepository)?,
    };
    Repository::open_fs(&root)
}
