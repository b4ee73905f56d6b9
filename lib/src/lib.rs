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

//! Muse: a version control system for music-production artifacts.
//!
//! This crate is the engine -- content-addressed storage, the commit DAG,
//! merge and rebase, divergence reporting, and commit search -- consumed
//! by the CLI binary in the sibling `muse-cli` crate and, eventually, by
//! a hub server. It never touches a terminal or a network socket itself;
//! every operation is a plain function or method that takes its
//! dependencies (a [`persistence::Persistence`] backend, a working tree
//! root) as arguments and returns an [`error::MuseError`].

pub mod commit;
pub mod config;
pub mod content_hash;
pub mod dag;
pub mod divergence;
pub mod error;
pub mod file_util;
pub mod find;
pub mod fs_store;
pub mod manifest;
pub mod memory_store;
pub mod merge;
pub mod object_id;
pub mod object_store;
pub mod persistence;
pub mod refs;
pub mod repo;
pub mod repo_path;
pub mod rewrite;
pub mod state;
pub mod working_tree;

pub use commit::Commit;
pub use commit::CommitId;
pub use error::MuseError;
pub use error::MuseResult;
pub use object_id::ObjectId;
pub use repo::Repository;
pub use repo::Revision;
