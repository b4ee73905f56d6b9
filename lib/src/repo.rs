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

//! `Repository`: the single handle the CLI and hub call into. It wires the
//! persistence backend, the working tree, refs, and state files together
//! and exposes one method per operation in §4 -- nothing in here
//! implements VCS logic itself, that all lives in `merge`, `rewrite`,
//! `divergence` and `find`. This module's job is resolving names
//! (branches, `HEAD`, short ids) to commit ids and keeping the ref
//! registry in sync with the branch tips those engines advance.

use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;

use crate::commit::Commit;
use crate::commit::CommitId;
use crate::config::RepoConfig;
use crate::divergence::DivergenceReport;
use crate::error::MuseError;
use crate::find::FindQuery;
use crate::fs_store::FsPersistence;
use crate::manifest::Manifest;
use crate::manifest::diff as manifest_diff;
use crate::memory_store::MemoryPersistence;
use crate::merge::MergeOptions;
use crate::merge::MergeOutcome;
use crate::merge::ResolveSide;
use crate::object_store::PersistenceAsObjectStore;
use crate::persistence::Persistence;
use crate::refs::FsRefStore;
use crate::refs::Head;
use crate::refs::MemoryRefStore;
use crate::refs::RefStore;
use crate::rewrite::PlanEntry;
use crate::rewrite::RebaseOutcome;
use crate::state::StateFiles;
use crate::working_tree::snapshot_working_tree;
use crate::working_tree::write_manifest_to_tree;

pub const WORKING_TREE_DIR_NAME: &str = "muse-work";

/// A name-resolved commit reference, as accepted by any operation that
/// takes a branch, `HEAD`, or commit id on the command line.
pub enum Revision<'a> {
    Head,
    Branch(&'a str),
    CommitIdOrPrefix(&'a str),
}

/// A snapshot of repository state for `status`.
pub struct RepoStatus {
    pub head: Head,
    pub head_commit: Option<CommitId>,
    pub working_tree_diff: crate::manifest::ManifestDiff,
    pub merge_in_progress: bool,
    pub rebase_in_progress: bool,
}

pub struct Repository {
    repo_id: String,
    muse_dir: PathBuf,
    working_tree_root: PathBuf,
    store: Box<dyn Persistence>,
    refs: Box<dyn RefStore>,
    state_files: StateFiles,
}

impl Repository {
    /// Creates a brand-new repository rooted at `root` (so `root/.muse` and
    /// `root/muse-work` are created) on the filesystem backend.
    pub fn init_fs(root: &Path, repo_id: String, initial_branch: &str) -> Result<Self, MuseError> {
        let muse_dir = root.join(crate::manifest::MUSE_DIR_NAME);
        let working_tree_root = root.join(WORKING_TREE_DIR_NAME);
        std::fs::create_dir_all(&working_tree_root).map_err(MuseError::IoError)?;
        let store = FsPersistence::init(&muse_dir, initial_branch).map_err(MuseError::IoError)?;
        let refs = FsRefStore::load(&muse_dir);
        let config = RepoConfig::new(repo_id.clone());
        config.write(&muse_dir).map_err(|e| MuseError::IoError(std::io::Error::other(e.to_string())))?;
        let state_files = StateFiles::new(&muse_dir);
        Ok(Self { repo_id, muse_dir, working_tree_root, store: Box::new(store), refs: Box::new(refs), state_files })
    }

    /// Opens an existing filesystem-backed repository rooted at `root`.
    pub fn open_fs(root: &Path) -> Result<Self, MuseError> {
        let muse_dir = root.join(crate::manifest::MUSE_DIR_NAME);
        if !muse_dir.is_dir() {
            return Err(MuseError::NotInRepository);
        }
        let working_tree_root = root.join(WORKING_TREE_DIR_NAME);
        let config = RepoConfig::read(&muse_dir).map_err(|e| MuseError::IoError(std::io::Error::other(e.to_string())))?;
        let store = FsPersistence::load(&muse_dir);
        let refs = FsRefStore::load(&muse_dir);
        Ok(Self {
            repo_id: config.repo_id,
            muse_dir: muse_dir.clone(),
            working_tree_root,
            store: Box::new(store),
            refs: Box::new(refs),
            state_files: StateFiles::new(&muse_dir),
        })
    }

    /// Builds a repository over the in-memory backend, for tests that want
    /// to exercise `Repository`'s name resolution without touching disk.
    pub fn init_memory(working_tree_root: &Path, state_dir: &Path, repo_id: String, initial_branch: &str) -> Self {
        Self {
            repo_id,
            muse_dir: state_dir.to_path_buf(),
            working_tree_root: working_tree_root.to_path_buf(),
            store: Box::new(MemoryPersistence::new()),
            refs: Box::new(MemoryRefStore::new(initial_branch)),
            state_files: StateFiles::new(state_dir),
        }
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn working_tree_root(&self) -> &Path {
        &self.working_tree_root
    }

    fn objects(&self) -> PersistenceAsObjectStore<'_> {
        PersistenceAsObjectStore(self.store.as_ref())
    }

    fn current_branch(&self) -> Result<String, MuseError> {
        match self.refs.get_head().map_err(MuseError::IoError)? {
            Head::Branch(name) => Ok(name),
            Head::Detached(id) => Err(MuseError::Usage(format!("HEAD is detached at {id}; checkout a branch first"))),
        }
    }

    fn branch_tip(&self, branch: &str) -> Result<CommitId, MuseError> {
        self.store
            .latest_commit_on(&self.repo_id, branch)?
            .ok_or_else(|| MuseError::UnknownBranch { name: branch.to_string() })
    }

    fn manifest_of(&self, id: &CommitId) -> Result<Manifest, MuseError> {
        let commit = self.store.get_commit(id)?.ok_or_else(|| MuseError::CorruptState(format!("missing commit {id}")))?;
        self.store
            .get_snapshot(&commit.snapshot_id)?
            .ok_or_else(|| MuseError::CorruptState(format!("missing snapshot {}", commit.snapshot_id)))
    }

    /// Resolves a revision the way the CLI accepts it on the command line:
    /// `HEAD`, a known branch name, or a (possibly abbreviated) commit id.
    pub fn resolve(&self, rev: Revision<'_>) -> Result<CommitId, MuseError> {
        match rev {
            Revision::Head => self
                .refs
                .head_commit()
                .map_err(MuseError::IoError)?
                .ok_or(MuseError::UnknownCommit { id: "HEAD".to_string() }),
            Revision::Branch(name) => self.branch_tip(name),
            Revision::CommitIdOrPrefix(text) => self.resolve_commit_text(text),
        }
    }

    fn resolve_commit_text(&self, text: &str) -> Result<CommitId, MuseError> {
        if text == "HEAD" {
            return self.resolve(Revision::Head);
        }
        if let Ok(id) = CommitId::parse(text) {
            return self.store.get_commit(&id)?.map(|c| c.commit_id).ok_or(MuseError::UnknownCommit { id: text.to_string() });
        }
        if let Ok(Some(id)) = self.store.latest_commit_on(&self.repo_id, text) {
            return Ok(id);
        }
        let matches = self.store.commits_by_prefix(&self.repo_id, text)?;
        match matches.len() {
            0 => Err(MuseError::UnknownCommit { id: text.to_string() }),
            1 => Ok(matches.into_iter().next().unwrap().commit_id),
            count => Err(MuseError::AmbiguousPrefix { prefix: text.to_string(), count }),
        }
    }

    /// Snapshots the working tree and, if it differs from `HEAD`, creates a
    /// new commit on the current branch.
    #[tracing::instrument(skip(self, message, author))]
    pub fn commit(&self, message: &str, author: &str, committed_at: DateTime<Utc>) -> Result<CommitId, MuseError> {
        if self.state_files.read_merge().map_err(MuseError::IoError)?.is_some() {
            return Err(MuseError::MergeInProgress);
        }
        if self.state_files.read_rebase().map_err(MuseError::IoError)?.is_some() {
            return Err(MuseError::RebaseInProgress);
        }
        let branch = self.current_branch()?;
        let parent = self.store.latest_commit_on(&self.repo_id, &branch)?;
        let parent_manifest = match &parent {
            Some(id) => self.manifest_of(id)?,
            None => Manifest::new(),
        };
        let objects = self.objects();
        let manifest = snapshot_working_tree(&self.working_tree_root, &objects)
            .map_err(|e| MuseError::IoError(std::io::Error::other(e.to_string())))?;
        if manifest == parent_manifest {
            return Err(MuseError::NothingToCommit);
        }

        let snapshot_id = self.store.put_snapshot(&manifest)?;
        self.store.flush()?;
        let parent_ids = parent.into_iter().collect();
        let commit = Commit::new(
            self.repo_id.clone(),
            branch.clone(),
            parent_ids,
            snapshot_id,
            message.to_string(),
            author.to_string(),
            committed_at,
        );
        self.store.put_commit(&commit)?;
        self.store.flush()?;
        self.store.set_latest_commit_on(&self.repo_id, &branch, &commit.commit_id)?;
        self.refs.set_branch(&branch, &commit.commit_id).map_err(MuseError::IoError)?;
        tracing::debug!(commit_id = %commit.commit_id, %branch, "committed");
        Ok(commit.commit_id)
    }

    /// Creates `name` pointing at `at` (defaults to the current `HEAD`
    /// commit). Does not switch to it.
    pub fn create_branch(&self, name: &str, at: Option<&CommitId>) -> Result<CommitId, MuseError> {
        let target = match at {
            Some(id) => id.clone(),
            None => self.resolve(Revision::Head)?,
        };
        self.store.set_latest_commit_on(&self.repo_id, name, &target)?;
        self.refs.set_branch(name, &target).map_err(MuseError::IoError)?;
        Ok(target)
    }

    pub fn delete_branch(&self, name: &str) -> Result<(), MuseError> {
        self.refs.delete_branch(name).map_err(MuseError::IoError)
    }

    pub fn list_branches(&self) -> Result<Vec<String>, MuseError> {
        self.refs.list_branches().map_err(MuseError::IoError)
    }

    /// Switches `HEAD` to `branch` and projects its snapshot onto the
    /// working tree.
    pub fn checkout(&self, branch: &str) -> Result<(), MuseError> {
        let tip = self.branch_tip(branch)?;
        let manifest = self.manifest_of(&tip)?;
        write_manifest_to_tree(&self.working_tree_root, &manifest, &self.objects())
            .map_err(|e| MuseError::IoError(std::io::Error::other(e.to_string())))?;
        self.refs.set_head(&Head::Branch(branch.to_string())).map_err(MuseError::IoError)?;
        tracing::debug!(%branch, "checked out");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip(self, options, author, message))]
    pub fn merge(
        &self,
        other_branch: &str,
        options: &MergeOptions,
        author: &str,
        message: &str,
        committed_at: DateTime<Utc>,
    ) -> Result<MergeOutcome, MuseError> {
        let branch = self.current_branch()?;
        let ours = self.branch_tip(&branch)?;
        let theirs = self.branch_tip(other_branch)?;
        let outcome = crate::merge::merge(
            self.store.as_ref(),
            &self.objects(),
            &self.working_tree_root,
            &self.state_files,
            &self.repo_id,
            &branch,
            &ours,
            &theirs,
            other_branch,
            author,
            message,
            committed_at,
            options,
        )?;
        self.sync_branch_after(&branch, &outcome)?;
        tracing::info!(?outcome, %branch, "merge finished");
        Ok(outcome)
    }

    fn sync_branch_after(&self, branch: &str, outcome: &MergeOutcome) -> Result<(), MuseError> {
        match outcome {
            MergeOutcome::FastForward { new_tip } | MergeOutcome::Merged { commit_id: new_tip } => {
                self.refs.set_branch(branch, new_tip).map_err(MuseError::IoError)
            }
            MergeOutcome::AlreadyUpToDate | MergeOutcome::Conflicted { .. } => Ok(()),
        }
    }

    pub fn continue_merge(&self, author: &str, message: &str, committed_at: DateTime<Utc>) -> Result<CommitId, MuseError> {
        let branch = self.current_branch()?;
        let commit_id = crate::merge::continue_merge(
            self.store.as_ref(),
            &self.objects(),
            &self.working_tree_root,
            &self.state_files,
            &self.repo_id,
            &branch,
            author,
            message,
            committed_at,
        )?;
        self.refs.set_branch(&branch, &commit_id).map_err(MuseError::IoError)?;
        Ok(commit_id)
    }

    pub fn abort_merge(&self) -> Result<(), MuseError> {
        crate::merge::abort_merge(self.store.as_ref(), &self.working_tree_root, &self.state_files)
    }

    pub fn resolve_conflict(&self, path: &str, side: ResolveSide) -> Result<(), MuseError> {
        crate::merge::resolve_conflict(self.store.as_ref(), &self.working_tree_root, &self.state_files, path, side)
    }

    /// Builds the default (all-`pick`) plan for rebasing the current
    /// branch onto `upstream`, optionally autosquashed.
    pub fn rebase_plan(&self, upstream: &str, autosquash: bool) -> Result<Vec<PlanEntry>, MuseError> {
        let branch = self.current_branch()?;
        let head = self.branch_tip(&branch)?;
        let upstream_id = self.branch_tip(upstream)?;
        let plan = crate::rewrite::build_plan(self.store.as_ref(), &head, &upstream_id)?;
        Ok(if autosquash { crate::rewrite::autosquash(plan) } else { plan })
    }

    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip(self, plan, author))]
    pub fn rebase(
        &self,
        upstream: &str,
        plan: Vec<PlanEntry>,
        author: &str,
        committed_at: DateTime<Utc>,
    ) -> Result<RebaseOutcome, MuseError> {
        let branch = self.current_branch()?;
        let head = self.branch_tip(&branch)?;
        let upstream_id = self.branch_tip(upstream)?;
        let base = crate::dag::lca(self.store.as_ref(), &head, &upstream_id)?;
        let outcome = crate::rewrite::rebase(
            self.store.as_ref(),
            &self.state_files,
            &self.repo_id,
            &branch,
            &head,
            &upstream_id,
            base.as_ref(),
            &branch,
            plan,
            author,
            committed_at,
        )?;
        if let RebaseOutcome::Completed { new_tip, .. } = &outcome {
            self.refs.set_branch(&branch, new_tip).map_err(MuseError::IoError)?;
        }
        tracing::info!(?outcome, %branch, "rebase finished");
        Ok(outcome)
    }

    pub fn continue_rebase(&self, author: &str, committed_at: DateTime<Utc>) -> Result<RebaseOutcome, MuseError> {
        let branch = self.current_branch()?;
        let outcome = crate::rewrite::continue_rebase(
            self.store.as_ref(),
            &self.objects(),
            &self.working_tree_root,
            &self.state_files,
            &self.repo_id,
            &branch,
            author,
            committed_at,
        )?;
        if let RebaseOutcome::Completed { new_tip, .. } = &outcome {
            self.refs.set_branch(&branch, new_tip).map_err(MuseError::IoError)?;
        }
        Ok(outcome)
    }

    pub fn abort_rebase(&self) -> Result<(), MuseError> {
        let branch = self.current_branch()?;
        crate::rewrite::abort_rebase(self.store.as_ref(), &self.state_files, &self.repo_id, &branch)?;
        let restored = self.branch_tip(&branch)?;
        self.refs.set_branch(&branch, &restored).map_err(MuseError::IoError)?;
        Ok(())
    }

    pub fn divergence(&self, branch_a: &str, branch_b: &str) -> Result<DivergenceReport, MuseError> {
        let a = self.branch_tip(branch_a)?;
        let b = self.branch_tip(branch_b)?;
        crate::divergence::divergence(self.store.as_ref(), &a, &b)
    }

    pub fn find(&self, query: &FindQuery) -> Result<Vec<Commit>, MuseError> {
        if query.filters.is_empty() && query.since.is_none() && query.until.is_none() {
            return Err(MuseError::Usage("find requires at least one filter or date bound".to_string()));
        }
        crate::find::find(self.store.as_ref(), &self.repo_id, query)
    }

    pub fn status(&self) -> Result<RepoStatus, MuseError> {
        let head = self.refs.get_head().map_err(MuseError::IoError)?;
        let head_commit = self.refs.head_commit().map_err(MuseError::IoError)?;
        let head_manifest = match &head_commit {
            Some(id) => self.manifest_of(id)?,
            None => Manifest::new(),
        };
        let objects = self.objects();
        let working_manifest = snapshot_working_tree(&self.working_tree_root, &objects)
            .map_err(|e| MuseError::IoError(std::io::Error::other(e.to_string())))?;
        Ok(RepoStatus {
            head,
            head_commit,
            working_tree_diff: manifest_diff(&head_manifest, &working_manifest),
            merge_in_progress: self.state_files.read_merge().map_err(MuseError::IoError)?.is_some(),
            rebase_in_progress: self.state_files.read_rebase().map_err(MuseError::IoError)?.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_commit_and_checkout_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init_fs(dir.path(), "repo-1".to_string(), "main").unwrap();
        repo.checkout("main").unwrap_err(); // no commits yet, branch tip unknown

        std::fs::write(repo.working_tree_root().join("beat.mid"), b"v1").unwrap();
        let c1 = repo.commit("first beat", "me", Utc::now()).unwrap();
        assert_eq!(repo.resolve(Revision::Head).unwrap(), c1);
        assert_eq!(repo.resolve(Revision::Branch("main")).unwrap(), c1);

        // No-op commit is rejected.
        assert!(matches!(repo.commit("noop", "me", Utc::now()), Err(MuseError::NothingToCommit)));

        repo.create_branch("exp", None).unwrap();
        std::fs::write(repo.working_tree_root().join("beat.mid"), b"v2").unwrap();
        let c2 = repo.commit("second beat", "me", Utc::now()).unwrap();
        assert_ne!(c1, c2);

        repo.checkout("exp").unwrap();
        let contents = std::fs::read(repo.working_tree_root().join("beat.mid")).unwrap();
        assert_eq!(contents, b"v1");
    }

    #[test]
    fn short_prefix_resolves_to_commit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init_fs(dir.path(), "repo-1".to_string(), "main").unwrap();
        std::fs::write(repo.working_tree_root().join("a.mid"), b"1").unwrap();
        let c1 = repo.commit("c1", "me", Utc::now()).unwrap();
        let prefix = &c1.as_hex()[..8];
        assert_eq!(repo.resolve(Revision::CommitIdOrPrefix(prefix)).unwrap(), c1);
    }

    #[test]
    fn find_with_no_filters_is_a_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init_fs(dir.path(), "repo-1".to_string(), "main").unwrap();
        let query = FindQuery::default();
        assert!(matches!(repo.find(&query), Err(MuseError::Usage(_))));
    }
}
