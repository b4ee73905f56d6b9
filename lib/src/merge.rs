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

//! The merge engine (§4.4): fast-forward detection, three-way merge with
//! path-level conflict detection, and the resume/abort halves of the
//! `IDLE -> CONFLICTED -> READY -> IDLE` state machine.
//!
//! This engine never attempts a byte-level merge of file content -- that's
//! an explicit non-goal. A "conflict" is a path both sides touched and
//! disagree on; resolution is take-ours, take-theirs, or the user editing
//! the working tree and running `--continue`.

use std::path::Path;

use chrono::DateTime;
use chrono::Utc;

use crate::commit::Commit;
use crate::commit::CommitId;
use crate::dag::is_ancestor;
use crate::dag::lca;
use crate::error::MuseError;
use crate::manifest::Manifest;
use crate::manifest::apply_delta;
use crate::manifest::diff as manifest_diff;
use crate::object_store::ObjectStore;
use crate::persistence::Persistence;
use crate::state::MergeState;
use crate::state::StateFiles;
use crate::working_tree::remove_path;
use crate::working_tree::write_path;

#[derive(Clone, Debug, Default)]
pub struct MergeOptions {
    pub no_ff: bool,
    pub strategy: MergeStrategyOpt,
    pub squash: bool,
}

/// Which side wins an overlapping path when `--strategy` bypasses normal
/// conflict detection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergeStrategyOpt {
    #[default]
    Default,
    Ours,
    Theirs,
}

/// What happened as a result of `merge`.
#[derive(Debug)]
pub enum MergeOutcome {
    /// The branch ref moved to `theirs` with no new commit.
    FastForward { new_tip: CommitId },
    /// `theirs` was already reachable from `ours`; nothing changed.
    AlreadyUpToDate,
    /// A merge commit was created and the branch ref advanced.
    Merged { commit_id: CommitId },
    /// Conflicts were found; `MergeState` was written and the branch ref
    /// was *not* moved.
    Conflicted { paths: Vec<String> },
}

#[allow(clippy::too_many_arguments)]
pub fn merge(
    store: &dyn Persistence,
    objects: &dyn ObjectStore,
    working_tree_root: &Path,
    state_files: &StateFiles,
    repo_id: &str,
    branch: &str,
    ours: &CommitId,
    theirs: &CommitId,
    other_branch_name: &str,
    author: &str,
    message: &str,
    committed_at: DateTime<Utc>,
    options: &MergeOptions,
) -> Result<MergeOutcome, MuseError> {
    if state_files.read_merge().map_err(MuseError::IoError)?.is_some() {
        return Err(MuseError::MergeInProgress);
    }
    if state_files.read_rebase().map_err(MuseError::IoError)?.is_some() {
        return Err(MuseError::RebaseInProgress);
    }

    let base = lca(store, ours, theirs)?;

    if !options.no_ff && base.as_ref() == Some(ours) {
        store.set_latest_commit_on(repo_id, branch, theirs)?;
        return Ok(MergeOutcome::FastForward { new_tip: theirs.clone() });
    }
    if base.as_ref() == Some(theirs) {
        return Ok(MergeOutcome::AlreadyUpToDate);
    }

    let base_id = base.clone();
    let base_manifest = match &base_id {
        Some(id) => load_manifest(store, id)?,
        None => Manifest::new(),
    };
    let ours_commit = load_commit(store, ours)?;
    let theirs_commit = load_commit(store, theirs)?;
    let ours_manifest = load_manifest(store, &ours_commit.snapshot_id)?;
    let theirs_manifest = load_manifest(store, &theirs_commit.snapshot_id)?;

    let ours_diff = manifest_diff(&base_manifest, &ours_manifest);
    let theirs_diff = manifest_diff(&base_manifest, &theirs_manifest);
    let ours_changed = ours_diff.changed_paths();
    let theirs_changed = theirs_diff.changed_paths();

    let overlap: Vec<String> = ours_changed.intersection(&theirs_changed).cloned().collect();
    let mut conflicts: Vec<String> = overlap
        .iter()
        .filter(|path| ours_manifest.get(path) != theirs_manifest.get(path))
        .cloned()
        .collect();
    conflicts.sort();

    match options.strategy {
        MergeStrategyOpt::Default => {}
        MergeStrategyOpt::Ours | MergeStrategyOpt::Theirs => conflicts.clear(),
    }

    if !conflicts.is_empty() {
        for path in &conflicts {
            write_path(working_tree_root, path, &theirs_manifest, store)
                .map_err(|e| MuseError::IoError(std::io::Error::other(e.to_string())))?;
        }
        state_files
            .write_merge(&MergeState {
                base_commit: base_id,
                ours_commit: ours.clone(),
                theirs_commit: theirs.clone(),
                conflict_paths: conflicts.clone(),
                other_branch: Some(other_branch_name.to_string()),
            })
            .map_err(MuseError::IoError)?;
        return Ok(MergeOutcome::Conflicted { paths: conflicts });
    }

    let merged_manifest = build_merged_manifest(
        &base_manifest,
        &ours_manifest,
        &theirs_manifest,
        &ours_changed,
        &theirs_changed,
        &overlap,
        options.strategy,
    );

    let parents = if options.squash { vec![ours.clone()] } else { vec![ours.clone(), theirs.clone()] };
    let commit_id = create_commit(
        store, repo_id, branch, parents, &merged_manifest, message, author, committed_at,
    )?;
    store.set_latest_commit_on(repo_id, branch, &commit_id)?;
    Ok(MergeOutcome::Merged { commit_id })
}

#[allow(clippy::too_many_arguments)]
fn build_merged_manifest(
    base: &Manifest,
    ours: &Manifest,
    theirs: &Manifest,
    ours_changed: &std::collections::BTreeSet<String>,
    theirs_changed: &std::collections::BTreeSet<String>,
    overlap: &[String],
    strategy: MergeStrategyOpt,
) -> Manifest {
    let mut result = base.clone();
    let only_ours = ours_changed.difference(theirs_changed);
    let only_theirs = theirs_changed.difference(ours_changed);
    for path in only_ours {
        apply_side(&mut result, ours, path);
    }
    for path in only_theirs {
        apply_side(&mut result, theirs, path);
    }
    for path in overlap {
        let side = match strategy {
            MergeStrategyOpt::Theirs => theirs,
            // Default here only covers the "same object id on both sides"
            // case that `merge` never routes into the conflict branch for;
            // `Ours` is also handled here for symmetry with `Theirs`.
            MergeStrategyOpt::Default | MergeStrategyOpt::Ours => ours,
        };
        apply_side(&mut result, side, path);
    }
    result
}

fn apply_side(result: &mut Manifest, side: &Manifest, path: &str) {
    match side.get(path) {
        Some(id) => result.insert(path.to_string(), id.clone()),
        None => {
            result.remove(path);
        }
    };
}

/// `merge --continue`: rebuilds the manifest from the user's edited
/// working tree (their edits are now the truth for conflicted paths),
/// persists a snapshot and commit, and clears `MergeState`.
pub fn continue_merge(
    store: &dyn Persistence,
    objects: &dyn ObjectStore,
    working_tree_root: &Path,
    state_files: &StateFiles,
    repo_id: &str,
    branch: &str,
    author: &str,
    message: &str,
    committed_at: DateTime<Utc>,
) -> Result<CommitId, MuseError> {
    let state = state_files
        .read_merge()
        .map_err(MuseError::IoError)?
        .ok_or(MuseError::NoMergeInProgress)?;
    if !state.conflict_paths.is_empty() {
        return Err(MuseError::MergeConflict { paths: state.conflict_paths });
    }

    let manifest = crate::working_tree::snapshot_working_tree(working_tree_root, objects)
        .map_err(|e| MuseError::IoError(std::io::Error::other(e.to_string())))?;

    let parents = vec![state.ours_commit.clone(), state.theirs_commit.clone()];
    let commit_id = create_commit(store, repo_id, branch, parents, &manifest, message, author, committed_at)?;
    store.set_latest_commit_on(repo_id, branch, &commit_id)?;
    state_files.clear_merge().map_err(MuseError::IoError)?;
    Ok(commit_id)
}

/// `merge --abort`: restores the working tree to `ours`'s manifest (files
/// only `theirs` added are removed; modified files are rewritten from the
/// `ours` object) and deletes `MergeState`. The branch ref was never
/// moved, so nothing needs restoring there.
pub fn abort_merge(
    store: &dyn Persistence,
    working_tree_root: &Path,
    state_files: &StateFiles,
) -> Result<(), MuseError> {
    let state = state_files
        .read_merge()
        .map_err(MuseError::IoError)?
        .ok_or(MuseError::NoMergeInProgress)?;

    let ours_commit = load_commit(store, &state.ours_commit)?;
    let theirs_commit = load_commit(store, &state.theirs_commit)?;
    let ours_manifest = load_manifest(store, &ours_commit.snapshot_id)?;
    let theirs_manifest = load_manifest(store, &theirs_commit.snapshot_id)?;

    for path in state.conflict_paths.iter() {
        if ours_manifest.contains(path) {
            write_path(working_tree_root, path, &ours_manifest, store)?;
        } else if theirs_manifest.contains(path) {
            remove_path(working_tree_root, path).map_err(MuseError::IoError)?;
        }
    }
    state_files.clear_merge().map_err(MuseError::IoError)?;
    Ok(())
}

/// Which side of a conflicted path `resolve` accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveSide {
    Ours,
    Theirs,
}

/// `resolve <path> --ours|--theirs`: removes `path` from the in-progress
/// merge's conflict list. `--ours` leaves the working tree untouched (it
/// already holds ours' content from checkout); `--theirs` overwrites it with
/// theirs' object for that path, or deletes it if theirs removed the path.
/// Fails if no merge is in progress or `path` isn't currently conflicted.
pub fn resolve_conflict(
    store: &dyn Persistence,
    working_tree_root: &Path,
    state_files: &StateFiles,
    path: &str,
    side: ResolveSide,
) -> Result<(), MuseError> {
    let mut state = state_files.read_merge().map_err(MuseError::IoError)?.ok_or(MuseError::NoMergeInProgress)?;
    if !state.conflict_paths.iter().any(|p| p == path) {
        return Err(MuseError::InvalidPath {
            path: path.to_string(),
            reason: format!("not listed as a conflict; current conflicts: {:?}", state.conflict_paths),
        });
    }

    if side == ResolveSide::Theirs {
        let theirs_commit = load_commit(store, &state.theirs_commit)?;
        let theirs_manifest = load_manifest(store, &theirs_commit.snapshot_id)?;
        write_path(working_tree_root, path, &theirs_manifest, store)?;
    }

    state.conflict_paths.retain(|p| p != path);
    state_files.write_merge(&state).map_err(MuseError::IoError)?;
    Ok(())
}

fn load_commit(store: &dyn Persistence, id: &CommitId) -> Result<Commit, MuseError> {
    store.get_commit(id)?.ok_or_else(|| MuseError::CorruptState(format!("missing commit {id}")))
}

fn load_manifest(store: &dyn Persistence, id: &crate::manifest::SnapshotId) -> Result<Manifest, MuseError> {
    store.get_snapshot(id)?.ok_or_else(|| MuseError::CorruptState(format!("missing snapshot {id}")))
}

#[allow(clippy::too_many_arguments)]
fn create_commit(
    store: &dyn Persistence,
    repo_id: &str,
    branch: &str,
    parent_ids: Vec<CommitId>,
    manifest: &Manifest,
    message: &str,
    author: &str,
    committed_at: DateTime<Utc>,
) -> Result<CommitId, MuseError> {
    let snapshot_id = store.put_snapshot(manifest)?;
    store.flush()?;
    let commit = Commit::new(
        repo_id.to_string(),
        branch.to_string(),
        parent_ids,
        snapshot_id,
        message.to_string(),
        author.to_string(),
        committed_at,
    );
    store.put_commit(&commit)?;
    store.flush()?;
    Ok(commit.commit_id)
}

/// Whether merging `theirs` into `ours` would be a plain fast-forward,
/// without performing the merge. Used by callers that want to preview.
pub fn would_fast_forward(store: &dyn Persistence, ours: &CommitId, theirs: &CommitId) -> Result<bool, MuseError> {
    is_ancestor(store, ours, theirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::compute_snapshot_id;
    use crate::memory_store::MemoryPersistence;
    use crate::object_store::ObjectStore as _;

    fn make_commit(
        store: &MemoryPersistence,
        parents: Vec<CommitId>,
        manifest: Manifest,
        message: &str,
    ) -> CommitId {
        let snapshot_id = store.put_snapshot(&manifest).unwrap();
        assert_eq!(snapshot_id.as_hex(), compute_snapshot_id(&manifest).as_hex());
        let commit = Commit::new("repo".into(), "main".into(), parents, snapshot_id, message.into(), "me".into(), Utc::now());
        store.put_commit(&commit).unwrap();
        commit.commit_id
    }

    fn manifest_with(store: &MemoryPersistence, entries: &[(&str, &[u8])]) -> Manifest {
        let mut m = Manifest::new();
        for (path, content) in entries {
            let id = store.put_object(content).unwrap();
            m.insert(path.to_string(), id);
        }
        m
    }

    #[test]
    fn same_object_both_sides_is_not_a_conflict() {
        let store = MemoryPersistence::new();
        let state_files = StateFiles::new(&tempfile::tempdir().unwrap().into_path());
        let dir = tempfile::tempdir().unwrap();

        let base_manifest = manifest_with(&store, &[("beat.mid", b"v1")]);
        let base = make_commit(&store, vec![], base_manifest.clone(), "c1");
        let side_manifest = manifest_with(&store, &[("beat.mid", b"v2")]);
        let ours = make_commit(&store, vec![base.clone()], side_manifest.clone(), "c2");
        let theirs = make_commit(&store, vec![base], side_manifest, "c3");

        let outcome = merge(
            &store,
            &store_as_objects(&store),
            dir.path(),
            &state_files,
            "repo",
            "main",
            &ours,
            &theirs,
            "exp",
            "me",
            "merge",
            Utc::now(),
            &MergeOptions::default(),
        )
        .unwrap();
        assert!(matches!(outcome, MergeOutcome::Merged { .. }));
    }

    #[test]
    fn diverging_edits_to_same_path_conflict() {
        let store = MemoryPersistence::new();
        let state_dir = tempfile::tempdir().unwrap().into_path();
        let state_files = StateFiles::new(&state_dir);
        let dir = tempfile::tempdir().unwrap();

        let base_manifest = manifest_with(&store, &[("beat.mid", b"v1")]);
        let base = make_commit(&store, vec![], base_manifest, "c1");
        let ours_manifest = manifest_with(&store, &[("beat.mid", b"v2")]);
        let ours = make_commit(&store, vec![base.clone()], ours_manifest, "c2");
        let theirs_manifest = manifest_with(&store, &[("beat.mid", b"v3")]);
        let theirs = make_commit(&store, vec![base], theirs_manifest, "c3");

        let outcome = merge(
            &store,
            &store_as_objects(&store),
            dir.path(),
            &state_files,
            "repo",
            "main",
            &ours,
            &theirs,
            "exp",
            "me",
            "merge",
            Utc::now(),
            &MergeOptions::default(),
        )
        .unwrap();
        match outcome {
            MergeOutcome::Conflicted { paths } => assert_eq!(paths, vec!["beat.mid".to_string()]),
            _ => panic!("expected conflict"),
        }
        assert!(state_files.read_merge().unwrap().is_some());
    }

    #[test]
    fn ancestor_merge_is_fast_forward() {
        let store = MemoryPersistence::new();
        let state_files = StateFiles::new(&tempfile::tempdir().unwrap().into_path());
        let dir = tempfile::tempdir().unwrap();
        let base = make_commit(&store, vec![], Manifest::new(), "c1");
        let theirs = make_commit(&store, vec![base.clone()], Manifest::new(), "c2");

        let outcome = merge(
            &store,
            &store_as_objects(&store),
            dir.path(),
            &state_files,
            "repo",
            "main",
            &base,
            &theirs,
            "exp",
            "me",
            "merge",
            Utc::now(),
            &MergeOptions::default(),
        )
        .unwrap();
        assert!(matches!(outcome, MergeOutcome::FastForward { new_tip } if new_tip == theirs));
    }

    fn store_as_objects(store: &MemoryPersistence) -> PersistenceObjectStore<'_> {
        PersistenceObjectStore(store)
    }

    struct PersistenceObjectStore<'a>(&'a MemoryPersistence);

    impl ObjectStore for PersistenceObjectStore<'_> {
        fn put(&self, bytes: &[u8]) -> crate::object_store::ObjectStoreResult<crate::object_id::ObjectId> {
            self.0.put_object(bytes).map_err(|e| crate::object_store::ObjectStoreError::Io(std::io::Error::other(e.to_string())))
        }
        fn get(&self, id: &crate::object_id::ObjectId) -> crate::object_store::ObjectStoreResult<Vec<u8>> {
            self.0.get_object(id).map_err(|e| crate::object_store::ObjectStoreError::Io(std::io::Error::other(e.to_string())))
        }
        fn exists(&self, id: &crate::object_id::ObjectId) -> crate::object_store::ObjectStoreResult<bool> {
            self.0.object_exists(id).map_err(|e| crate::object_store::ObjectStoreError::Io(std::io::Error::other(e.to_string())))
        }
    }
}
