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

//! The engine-facing error taxonomy. Every operation in this crate returns
//! [`MuseError`] (or a type that converts into it); callers map variants to
//! exit codes or HTTP statuses.

use thiserror::Error;

use crate::commit::CommitId;
use crate::persistence::PersistenceError;

/// Errors surfaced by the engine to its callers (CLI, hub API, tests).
///
/// Variants are grouped loosely by the recovery categories in the design:
/// user errors, state violations, conflicts, corruption and I/O. See each
/// variant's doc comment for the condition that raises it.
#[derive(Debug, Error)]
pub enum MuseError {
    #[error("not a muse repository (or any parent up to the filesystem root)")]
    NotInRepository,

    #[error("unknown branch {name:?}")]
    UnknownBranch { name: String },

    #[error("unknown commit {id}")]
    UnknownCommit { id: String },

    #[error("commit id prefix {prefix:?} is ambiguous ({count} matches)")]
    AmbiguousPrefix { prefix: String, count: usize },

    #[error("nothing to commit, working tree matches HEAD")]
    NothingToCommit,

    #[error("nothing to rebase, no commits between base and head")]
    NothingToRebase,

    #[error("already up to date")]
    AlreadyUpToDate,

    #[error("merge conflict in {} path(s)", paths.len())]
    MergeConflict { paths: Vec<String> },

    #[error("conflict replaying {commit} onto new base, in {} path(s)", paths.len())]
    RebaseConflict { commit: CommitId, paths: Vec<String> },

    #[error("a merge is already in progress; run `merge --continue` or `merge --abort`")]
    MergeInProgress,

    #[error("a rebase is already in progress; run `rebase --continue` or `rebase --abort`")]
    RebaseInProgress,

    #[error("no merge in progress")]
    NoMergeInProgress,

    #[error("no rebase in progress")]
    NoRebaseInProgress,

    #[error("branches have disjoint histories (no common ancestor)")]
    DisjointHistories,

    #[error("invalid repository path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("usage error: {0}")]
    Usage(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("corrupt state: {0}")]
    CorruptState(String),
}

pub type MuseResult<T> = Result<T, MuseError>;

impl From<PersistenceError> for MuseError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::DuplicateCommit { id } => {
                MuseError::CorruptState(format!("attempted to insert duplicate commit {id}"))
            }
            other => MuseError::IoError(std::io::Error::other(other.to_string())),
        }
    }
}

impl MuseError {
    /// Returns the offending id for a [`MuseError::CorruptState`] raised
    /// because a manifest entry or commit parent pointed at a missing
    /// object. Engine code always constructs the variant with the id
    /// embedded in the message so that callers can display it without a
    /// second lookup; this accessor is for tests that want to assert on it.
    pub fn corrupt_state(what: impl std::fmt::Display, id: impl std::fmt::Display) -> Self {
        Self::CorruptState(format!("{what} references missing object {id}"))
    }
}
