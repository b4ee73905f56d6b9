// Copyright 2021 The Jujutsu Authors
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

//! Small filesystem helpers shared by the object store, ref store, and the
//! merge/rebase state files.

use std::fs;
use std::fs::File;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tempfile::PersistError;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Cannot access {path}")]
pub struct PathError {
    pub path: PathBuf,
    pub source: io::Error,
}

pub trait IoResultExt<T> {
    fn context(self, path: impl AsRef<Path>) -> Result<T, PathError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn context(self, path: impl AsRef<Path>) -> Result<T, PathError> {
        self.map_err(|error| PathError {
            path: path.as_ref().to_path_buf(),
            source: error,
        })
    }
}

/// Creates a directory or does nothing if the directory already exists.
pub fn create_or_reuse_dir(dirname: &Path) -> io::Result<()> {
    match fs::create_dir(dirname) {
        Ok(()) => Ok(()),
        Err(_) if dirname.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

pub fn create_or_reuse_dir_all(dirname: &Path) -> io::Result<()> {
    match fs::create_dir_all(dirname) {
        Ok(()) => Ok(()),
        Err(_) if dirname.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Persists the temporary file after synchronizing the content.
///
/// After a system crash, the persisted file has a valid content if it exists
/// at all; the directory entry that makes it visible under its final name is
/// the only thing that can be lost. Used for ref updates, where callers don't
/// need content-addressed no-clobber semantics.
pub fn persist_temp_file<P: AsRef<Path>>(temp_file: NamedTempFile, new_path: P) -> io::Result<File> {
    temp_file.as_file().sync_data()?;
    temp_file
        .persist(new_path)
        .map_err(|PersistError { error, file: _ }| error)
}

/// Like [`persist_temp_file`], but treats an existing target as success
/// instead of racing to overwrite it. Used by the object store: two writers
/// racing to store the same content should both succeed, and whichever file
/// ends up on disk has identical bytes.
pub fn persist_content_addressed_temp_file<P: AsRef<Path>>(
    temp_file: NamedTempFile,
    new_path: P,
) -> io::Result<()> {
    temp_file.as_file().sync_data()?;
    if cfg!(windows) {
        match temp_file.persist_noclobber(&new_path) {
            Ok(_file) => Ok(()),
            Err(PersistError { error, file: _ }) => {
                if new_path.as_ref().is_file() {
                    Ok(())
                } else {
                    Err(error)
                }
            }
        }
    } else {
        // On Unix, rename() is atomic and succeeds even if the destination
        // exists; checking existence first would be racy, so don't bother.
        temp_file
            .persist(new_path)
            .map(|_file| ())
            .map_err(|PersistError { error, file: _ }| error)
    }
}
