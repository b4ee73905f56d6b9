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

//! `.muse/repo.json` (§6): the one piece of repository identity that isn't
//! derivable from content -- a stable `repo_id` used to scope persistence
//! backends that serve more than one repository, plus a schema version for
//! future on-disk format changes.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::file_util::IoResultExt as _;
use crate::file_util::PathError;
use crate::file_util::persist_temp_file;

pub const REPO_CONFIG_FILE: &str = "repo.json";
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepoConfig {
    pub repo_id: String,
    pub schema_version: u32,
}

impl RepoConfig {
    pub fn new(repo_id: String) -> Self {
        Self { repo_id, schema_version: CURRENT_SCHEMA_VERSION }
    }

    pub fn write(&self, muse_dir: &Path) -> Result<(), PathError> {
        let path = muse_dir.join(REPO_CONFIG_FILE);
        write_atomic(&path, self).context(&path)
    }

    pub fn read(muse_dir: &Path) -> Result<Self, ConfigError> {
        let path = muse_dir.join(REPO_CONFIG_FILE);
        let bytes = fs::read(&path).map_err(|source| ConfigError::Io(PathError { path: path.clone(), source }))?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse { path, source })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] PathError),
    #[error("repo config at {path:?} is not valid JSON: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let dir = path.parent().expect("config path always has a parent");
    let body = serde_json::to_vec_pretty(value).expect("repo config always serializes");
    let mut temp = NamedTempFile::new_in(dir)?;
    {
        use std::io::Write as _;
        temp.write_all(&body)?;
    }
    persist_temp_file(temp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = RepoConfig::new("a1b2c3".to_string());
        config.write(dir.path()).unwrap();
        let read_back = RepoConfig::read(dir.path()).unwrap();
        assert_eq!(read_back.repo_id, "a1b2c3");
        assert_eq!(read_back.schema_version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn missing_config_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(RepoConfig::read(dir.path()), Err(ConfigError::Io(_))));
    }
}
