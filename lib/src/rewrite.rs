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

//! The rebase engine (§4.5): replaying a range of commits onto a new
//! base, with autosquash, interactive squash/fixup groups, and
//! resume/abort.
//!
//! Merge commits in the replayed range are collapsed to their first
//! parent -- `--rebase-merges` is not implemented, matching the known
//! limitation carried over from the source system (see DESIGN.md).

use chrono::DateTime;
use chrono::Utc;

use crate::commit::Commit;
use crate::commit::CommitId;
use crate::dag::commits_between;
use crate::dag::lca;
use crate::error::MuseError;
use crate::manifest::Manifest;
use crate::manifest::ManifestDiff;
use crate::manifest::apply_delta;
use crate::manifest::diff as manifest_diff;
use crate::persistence::Persistence;
use crate::state::RebaseState;
use crate::state::StateFiles;

/// One step of an interactive rebase plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanAction {
    Pick,
    Squash,
    Fixup,
    Drop,
    Reword(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanEntry {
    pub action: PlanAction,
    pub commit_id: CommitId,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanParseError {
    #[error("line {line}: unknown action {action:?}")]
    UnknownAction { line: usize, action: String },
    #[error("line {line}: expected `action short_sha message`, got {text:?}")]
    Malformed { line: usize, text: String },
    #[error("line {line}: short id {short_sha:?} does not resolve to exactly one commit")]
    UnresolvedShortId { line: usize, short_sha: String },
}

/// Parses an interactive rebase plan. Lines starting with `#` and blank
/// lines are ignored; an unknown action aborts the whole parse (§4.5).
/// `resolve_short_id` maps a short hex prefix (as it would appear in an
/// editor-authored plan) to a full commit id.
pub fn parse_plan(
    text: &str,
    resolve_short_id: impl Fn(&str) -> Option<CommitId>,
) -> Result<Vec<PlanEntry>, PlanParseError> {
    let mut entries = Vec::new();
    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(3, char::is_whitespace);
        let action_word = parts.next().unwrap_or("");
        let short_sha = parts.next().unwrap_or("");
        let message = parts.next().unwrap_or("").to_string();
        if action_word.is_empty() || short_sha.is_empty() {
            return Err(PlanParseError::Malformed { line: idx + 1, text: line.to_string() });
        }
        let action = match action_word {
            "pick" | "p" => PlanAction::Pick,
            "squash" | "s" => PlanAction::Squash,
            "fixup" | "f" => PlanAction::Fixup,
            "drop" | "d" => PlanAction::Drop,
            "reword" | "r" => PlanAction::Reword(message.clone()),
            other => return Err(PlanParseError::UnknownAction { line: idx + 1, action: other.to_string() }),
        };
        let commit_id = resolve_short_id(short_sha)
            .ok_or_else(|| PlanParseError::UnresolvedShortId { line: idx + 1, short_sha: short_sha.to_string() })?;
        entries.push(PlanEntry { action, commit_id, message });
    }
    Ok(entries)
}

/// Builds the default plan (all `pick`, oldest first) for the commits on
/// `head` beyond `lca(head, upstream)`.
pub fn build_plan(store: &dyn Persistence, head: &CommitId, upstream: &CommitId) -> Result<Vec<PlanEntry>, MuseError> {
    let base = lca(store, head, upstream)?;
    let Some(base) = base else {
        return Err(MuseError::DisjointHistories);
    };
    let ids = commits_between(store, head, &base)?;
    let mut plan = Vec::with_capacity(ids.len());
    for id in ids {
        let commit = load_commit(store, &id)?;
        plan.push(PlanEntry { action: PlanAction::Pick, commit_id: id, message: commit.message });
    }
    Ok(plan)
}

/// Reorders `fixup! <prefix>` commits to follow the first earlier entry
/// whose message starts with `<prefix>`. Unmatched fixups move to the end
/// (§4.5). All other entries keep their relative order.
pub fn autosquash(plan: Vec<PlanEntry>) -> Vec<PlanEntry> {
    let mut result: Vec<PlanEntry> = Vec::with_capacity(plan.len());
    let mut unmatched_fixups = Vec::new();

    for entry in plan {
        if let Some(prefix) = entry.message.strip_prefix("fixup! ") {
            if let Some(target_idx) = result.iter().position(|e| e.message.starts_with(prefix)) {
                let mut fixup = entry;
                fixup.action = PlanAction::Fixup;
                result.insert(target_idx + 1, fixup);
                continue;
            }
            unmatched_fixups.push(entry);
            continue;
        }
        result.push(entry);
    }
    result.extend(unmatched_fixups);
    result
}

/// One replayed commit, paired with the original it was replayed from.
#[derive(Clone, Debug)]
pub struct RebasedCommit {
    pub original_id: CommitId,
    pub new_id: CommitId,
}

#[derive(Debug)]
pub enum RebaseOutcome {
    /// Nothing was replayed because the plan was empty.
    NothingToRebase,
    /// Every step replayed cleanly; the branch ref now points at the tip.
    Completed { new_tip: CommitId, replayed: Vec<RebasedCommit> },
    /// Replay stopped at `current_commit` because it touched paths the
    /// onto side had also changed; `RebaseState` was written.
    Conflicted { commit: CommitId, paths: Vec<String> },
}

struct SquashGroup {
    leader_message: String,
    additions: std::collections::BTreeMap<String, crate::object_id::ObjectId>,
    deletions: std::collections::BTreeSet<String>,
    original_ids: Vec<CommitId>,
}

impl SquashGroup {
    fn new(leader_message: String) -> Self {
        Self {
            leader_message,
            additions: Default::default(),
            deletions: Default::default(),
            original_ids: Vec::new(),
        }
    }

    fn absorb(&mut self, diff: &crate::manifest::ManifestDiff, commit_manifest: &Manifest, original_id: CommitId) {
        for path in diff.added.iter().chain(diff.modified.iter()) {
            self.deletions.remove(path);
            self.additions.insert(path.clone(), commit_manifest.get(path).expect("diff path exists in commit_manifest").clone());
        }
        for path in &diff.removed {
            self.additions.remove(path);
            self.deletions.insert(path.clone());
        }
        self.original_ids.push(original_id);
    }
}

/// Runs the replay loop for `plan` starting at `upstream`, rewriting
/// `branch` in place on success. `committer` supplies author/timestamp for
/// each replayed commit (the message is inherited from the original,
/// except for `reword` and `fixup`-folded groups, per §4.5).
#[allow(clippy::too_many_arguments)]
pub fn rebase(
    store: &dyn Persistence,
    state_files: &StateFiles,
    repo_id: &str,
    branch: &str,
    original_head: &CommitId,
    upstream: &CommitId,
    base: Option<&CommitId>,
    original_branch: &str,
    plan: Vec<PlanEntry>,
    author: &str,
    committed_at: DateTime<Utc>,
) -> Result<RebaseOutcome, MuseError> {
    if state_files.read_rebase().map_err(MuseError::IoError)?.is_some() {
        return Err(MuseError::RebaseInProgress);
    }
    if state_files.read_merge().map_err(MuseError::IoError)?.is_some() {
        return Err(MuseError::MergeInProgress);
    }
    if plan.is_empty() {
        return Ok(RebaseOutcome::NothingToRebase);
    }

    let mut onto_id = upstream.clone();
    let mut onto_manifest = load_manifest_for(store, upstream)?;
    let mut prev_onto_manifest = match base {
        Some(b) => load_manifest_for(store, b)?,
        None => Manifest::new(),
    };

    let mut replayed = Vec::new();
    let mut pending_group: Option<SquashGroup> = None;
    let mut remaining = plan.clone();

    while let Some(entry) = next_entry(&mut remaining) {
        match entry.action {
            PlanAction::Drop => continue,
            PlanAction::Squash | PlanAction::Fixup => {
                let original_manifest = commit_manifest(store, &entry.commit_id)?;
                let parent_manifest = parent_manifest_of(store, &entry.commit_id)?;
                let d = manifest_diff(&parent_manifest, &original_manifest);

                let overlap = replay_conflicts(&d.changed_paths(), &prev_onto_manifest, &onto_manifest);
                if !overlap.is_empty() {
                    return conflict_and_persist(
                        state_files, original_head, upstream, base, original_branch,
                        &onto_id, &replayed, &remaining_with_current(&entry, &remaining), &entry.commit_id, overlap,
                    );
                }

                let leader_message = if matches!(entry.action, PlanAction::Fixup) {
                    pending_group.as_ref().map(|g| g.leader_message.clone()).unwrap_or_else(|| entry.message.clone())
                } else {
                    entry.message.clone()
                };
                let group = pending_group.get_or_insert_with(|| SquashGroup::new(leader_message));
                group.absorb(&d, &original_manifest, entry.commit_id.clone());
            }
            PlanAction::Pick | PlanAction::Reword(_) => {
                if let Some(group) = pending_group.take() {
                    flush_group(store, group, &mut prev_onto_manifest, &mut onto_manifest, &mut onto_id, repo_id, branch, author, committed_at, &mut replayed)?;
                }

                let original_manifest = commit_manifest(store, &entry.commit_id)?;
                let parent_manifest = parent_manifest_of(store, &entry.commit_id)?;
                let d = manifest_diff(&parent_manifest, &original_manifest);

                let overlap = replay_conflicts(&d.changed_paths(), &prev_onto_manifest, &onto_manifest);
                if !overlap.is_empty() {
                    return conflict_and_persist(
                        state_files, original_head, upstream, base, original_branch,
                        &onto_id, &replayed, &remaining_with_current(&entry, &remaining), &entry.commit_id, overlap,
                    );
                }

                let message = match &entry.action {
                    PlanAction::Reword(new_message) => new_message.clone(),
                    _ => entry.message.clone(),
                };
                let additions: Vec<_> = d
                    .added
                    .iter()
                    .chain(d.modified.iter())
                    .map(|p| (p.clone(), original_manifest.get(p).unwrap().clone()))
                    .collect();
                let new_manifest = apply_delta(&onto_manifest, additions, d.removed.iter().cloned());
                let new_id = create_commit(store, repo_id, branch, vec![onto_id.clone()], &new_manifest, &message, author, committed_at)?;

                prev_onto_manifest = std::mem::replace(&mut onto_manifest, new_manifest);
                replayed.push(RebasedCommit { original_id: entry.commit_id.clone(), new_id: new_id.clone() });
                onto_id = new_id;
            }
        }
    }

    if let Some(group) = pending_group.take() {
        flush_group(store, group, &mut prev_onto_manifest, &mut onto_manifest, &mut onto_id, repo_id, branch, author, committed_at, &mut replayed)?;
    }

    store.set_latest_commit_on(repo_id, branch, &onto_id)?;
    state_files.clear_rebase().map_err(MuseError::IoError)?;
    Ok(RebaseOutcome::Completed { new_tip: onto_id, replayed })
}

fn next_entry(remaining: &mut Vec<PlanEntry>) -> Option<PlanEntry> {
    if remaining.is_empty() { None } else { Some(remaining.remove(0)) }
}

fn remaining_with_current(current: &PlanEntry, rest: &[PlanEntry]) -> Vec<PlanEntry> {
    std::iter::once(current.clone()).chain(rest.iter().cloned()).collect()
}

/// A path conflicts if it was changed both by the commit being replayed
/// (`commit_changed`, relative to its own original parent) and by the onto
/// side since the replay's last step (`diff(prev_onto_manifest,
/// onto_manifest)`). This is a plain set intersection, not a
/// value-disagreement check -- unlike merge's three-way rule (§4.4), two
/// sides touching the same path during a rebase replay conflict even if
/// they happen to land on the same value.
fn replay_conflicts(
    commit_changed: &std::collections::BTreeSet<String>,
    prev_onto_manifest: &Manifest,
    onto_manifest: &Manifest,
) -> Vec<String> {
    let onto_changed = manifest_diff(prev_onto_manifest, onto_manifest).changed_paths();
    let mut paths: Vec<String> = commit_changed.intersection(&onto_changed).cloned().collect();
    paths.sort();
    paths
}

#[allow(clippy::too_many_arguments)]
fn conflict_and_persist(
    state_files: &StateFiles,
    original_head: &CommitId,
    upstream: &CommitId,
    base: Option<&CommitId>,
    original_branch: &str,
    current_onto: &CommitId,
    replayed: &[RebasedCommit],
    remaining_plan: &[PlanEntry],
    current_commit: &CommitId,
    conflict_paths: Vec<String>,
) -> Result<RebaseOutcome, MuseError> {
    state_files
        .write_rebase(&RebaseState {
            upstream_commit: upstream.clone(),
            base_commit: base.cloned(),
            original_branch: original_branch.to_string(),
            original_head: original_head.clone(),
            commits_to_replay: remaining_plan.iter().map(|e| e.commit_id.clone()).collect(),
            current_onto: current_onto.clone(),
            completed_pairs: replayed.iter().map(|r| (r.original_id.clone(), r.new_id.clone())).collect(),
            current_commit: Some(current_commit.clone()),
            conflict_paths: conflict_paths.clone(),
        })
        .map_err(MuseError::IoError)?;
    Ok(RebaseOutcome::Conflicted { commit: current_commit.clone(), paths: conflict_paths })
}

#[allow(clippy::too_many_arguments)]
fn flush_group(
    store: &dyn Persistence,
    group: SquashGroup,
    prev_onto_manifest: &mut Manifest,
    onto_manifest: &mut Manifest,
    onto_id: &mut CommitId,
    repo_id: &str,
    branch: &str,
    author: &str,
    committed_at: DateTime<Utc>,
    replayed: &mut Vec<RebasedCommit>,
) -> Result<(), MuseError> {
    let new_manifest = apply_delta(onto_manifest, group.additions.clone(), group.deletions.iter().cloned());
    let new_id = create_commit(store, repo_id, branch, vec![onto_id.clone()], &new_manifest, &group.leader_message, author, committed_at)?;
    *prev_onto_manifest = std::mem::replace(onto_manifest, new_manifest);
    for original_id in group.original_ids {
        replayed.push(RebasedCommit { original_id, new_id: new_id.clone() });
    }
    *onto_id = new_id;
    Ok(())
}

/// `rebase --continue`: treats the working tree as the resolved snapshot
/// for `current_commit`, replays it, and resumes the remaining plan.
pub fn continue_rebase(
    store: &dyn Persistence,
    objects: &dyn crate::object_store::ObjectStore,
    working_tree_root: &std::path::Path,
    state_files: &StateFiles,
    repo_id: &str,
    branch: &str,
    author: &str,
    committed_at: DateTime<Utc>,
) -> Result<RebaseOutcome, MuseError> {
    let state = state_files.read_rebase().map_err(MuseError::IoError)?.ok_or(MuseError::NoRebaseInProgress)?;
    if !state.conflict_paths.is_empty() {
        return Err(MuseError::RebaseConflict {
            commit: state.current_commit.clone().unwrap_or_else(|| state.upstream_commit.clone()),
            paths: state.conflict_paths,
        });
    }
    let current_commit = state.current_commit.clone().ok_or_else(|| MuseError::CorruptState("rebase state missing current_commit".to_string()))?;
    let resolved_manifest = crate::working_tree::snapshot_working_tree(working_tree_root, objects)
        .map_err(|e| MuseError::IoError(std::io::Error::other(e.to_string())))?;
    let original = load_commit(store, &current_commit)?;

    let new_id = create_commit(
        store, repo_id, branch, vec![state.current_onto.clone()], &resolved_manifest, &original.message, author, committed_at,
    )?;

    let mut remaining: Vec<PlanEntry> = Vec::new();
    for id in &state.commits_to_replay {
        if id == &current_commit {
            continue;
        }
        let c = load_commit(store, id)?;
        remaining.push(PlanEntry { action: PlanAction::Pick, commit_id: id.clone(), message: c.message });
    }

    let mut replayed: Vec<RebasedCommit> = state
        .completed_pairs
        .iter()
        .map(|(o, n)| RebasedCommit { original_id: o.clone(), new_id: n.clone() })
        .collect();
    replayed.push(RebasedCommit { original_id: current_commit, new_id: new_id.clone() });

    if remaining.is_empty() {
        store.set_latest_commit_on(repo_id, branch, &new_id)?;
        state_files.clear_rebase().map_err(MuseError::IoError)?;
        return Ok(RebaseOutcome::Completed { new_tip: new_id, replayed });
    }

    rebase(
        store,
        state_files,
        repo_id,
        branch,
        &state.original_head,
        &state.upstream_commit,
        state.base_commit.as_ref(),
        &state.original_branch,
        remaining,
        author,
        committed_at,
    )
    .map(|outcome| match outcome {
        RebaseOutcome::Completed { new_tip, replayed: mut rest } => {
            let mut all = replayed;
            all.append(&mut rest);
            RebaseOutcome::Completed { new_tip, replayed: all }
        }
        other => other,
    })
}

/// `rebase --abort`: restores the branch ref to `original_head` and
/// deletes `RebaseState`. Replayed commits already created remain in the
/// database, orphaned but unreferenced by any ref (§4.5).
pub fn abort_rebase(
    store: &dyn Persistence,
    state_files: &StateFiles,
    repo_id: &str,
    branch: &str,
) -> Result<(), MuseError> {
    let state = state_files.read_rebase().map_err(MuseError::IoError)?.ok_or(MuseError::NoRebaseInProgress)?;
    store.set_latest_commit_on(repo_id, branch, &state.original_head)?;
    state_files.clear_rebase().map_err(MuseError::IoError)?;
    Ok(())
}

fn commit_manifest(store: &dyn Persistence, id: &CommitId) -> Result<Manifest, MuseError> {
    let commit = load_commit(store, id)?;
    load_manifest_for_snapshot(store, &commit.snapshot_id)
}

fn parent_manifest_of(store: &dyn Persistence, id: &CommitId) -> Result<Manifest, MuseError> {
    let commit = load_commit(store, id)?;
    match commit.first_parent() {
        Some(parent) => commit_manifest(store, parent),
        None => Ok(Manifest::new()),
    }
}

fn load_manifest_for(store: &dyn Persistence, commit_id: &CommitId) -> Result<Manifest, MuseError> {
    let commit = load_commit(store, commit_id)?;
    load_manifest_for_snapshot(store, &commit.snapshot_id)
}

fn load_manifest_for_snapshot(store: &dyn Persistence, id: &crate::manifest::SnapshotId) -> Result<Manifest, MuseError> {
    store.get_snapshot(id)?.ok_or_else(|| MuseError::CorruptState(format!("missing snapshot {id}")))
}

fn load_commit(store: &dyn Persistence, id: &CommitId) -> Result<Commit, MuseError> {
    store.get_commit(id)?.ok_or_else(|| MuseError::CorruptState(format!("missing commit {id}")))
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
    let commit = Commit::new(repo_id.to_string(), branch.to_string(), parent_ids, snapshot_id, message.to_string(), author.to_string(), committed_at);
    store.put_commit(&commit)?;
    store.flush()?;
    Ok(commit.commit_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryPersistence;
    use crate::object_store::ObjectStore as _;

    fn commit_with(store: &MemoryPersistence, parents: Vec<CommitId>, entries: &[(&str, &[u8])], message: &str) -> CommitId {
        let mut manifest = Manifest::new();
        for (path, content) in entries {
            let id = store.put_object(content).unwrap();
            manifest.insert(path.to_string(), id);
        }
        let snapshot_id = store.put_snapshot(&manifest).unwrap();
        let c = Commit::new("repo".into(), "main".into(), parents, snapshot_id, message.into(), "me".into(), Utc::now());
        store.put_commit(&c).unwrap();
        c.commit_id
    }

    #[test]
    fn single_commit_rebase_produces_new_id() {
        let store = MemoryPersistence::new();
        let state_files = StateFiles::new(&tempfile::tempdir().unwrap().into_path());

        let base = commit_with(&store, vec![], &[("a.mid", b"1")], "base");
        let dev = commit_with(&store, vec![base.clone()], &[("b.mid", b"2")], "dev1");
        let main_c2 = commit_with(&store, vec![base.clone()], &[("c.mid", b"3")], "main c2");

        let plan = build_plan(&store, &main_c2, &dev).unwrap();
        assert_eq!(plan.len(), 1);

        let outcome = rebase(
            &store, &state_files, "repo", "main", &main_c2, &dev, Some(&base), "main", plan, "me", Utc::now(),
        )
        .unwrap();
        match outcome {
            RebaseOutcome::Completed { new_tip, replayed } => {
                assert_eq!(replayed.len(), 1);
                assert_ne!(new_tip, main_c2);
                assert_eq!(replayed[0].original_id, main_c2);
            }
            _ => panic!("expected completion"),
        }
    }

    #[test]
    fn rebase_conflicts_when_both_sides_change_the_same_path() {
        let store = MemoryPersistence::new();
        let state_files = StateFiles::new(&tempfile::tempdir().unwrap().into_path());

        let base = commit_with(&store, vec![], &[("shared.mid", b"v0")], "base");
        let dev = commit_with(&store, vec![base.clone()], &[("shared.mid", b"v2")], "dev touches shared");
        let main_c = commit_with(&store, vec![base.clone()], &[("shared.mid", b"v3")], "main touches shared");

        let plan = build_plan(&store, &main_c, &dev).unwrap();
        let outcome = rebase(&store, &state_files, "repo", "main", &main_c, &dev, Some(&base), "main", plan, "me", Utc::now()).unwrap();

        match outcome {
            RebaseOutcome::Conflicted { commit, paths } => {
                assert_eq!(commit, main_c);
                assert_eq!(paths, vec!["shared.mid".to_string()]);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert!(state_files.read_rebase().unwrap().is_some());
    }

    #[test]
    fn multi_step_rebase_with_disjoint_paths_replays_cleanly() {
        let store = MemoryPersistence::new();
        let state_files = StateFiles::new(&tempfile::tempdir().unwrap().into_path());

        let base = commit_with(&store, vec![], &[], "base");
        let dev = commit_with(&store, vec![base.clone()], &[("d.mid", b"dev")], "dev adds d.mid");
        let c1 = commit_with(&store, vec![base.clone()], &[("a.mid", b"a")], "c1 adds a.mid");
        let c2 = commit_with(&store, vec![c1.clone()], &[("a.mid", b"a"), ("b.mid", b"b")], "c2 adds b.mid");

        let plan = build_plan(&store, &c2, &dev).unwrap();
        assert_eq!(plan.len(), 2);

        let outcome = rebase(&store, &state_files, "repo", "main", &c2, &dev, Some(&base), "main", plan, "me", Utc::now()).unwrap();
        match outcome {
            RebaseOutcome::Completed { new_tip, replayed } => {
                assert_eq!(replayed.len(), 2);
                assert_ne!(new_tip, c2);
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn autosquash_moves_fixup_after_target() {
        let store = MemoryPersistence::new();
        let base = commit_with(&store, vec![], &[], "base");
        let c1 = commit_with(&store, vec![base.clone()], &[], "c1-msg");
        let c2 = commit_with(&store, vec![c1.clone()], &[], "c2-msg");
        let fixup = commit_with(&store, vec![c2.clone()], &[], "fixup! c1-msg");

        let plan = vec![
            PlanEntry { action: PlanAction::Pick, commit_id: c1.clone(), message: "c1-msg".into() },
            PlanEntry { action: PlanAction::Pick, commit_id: c2.clone(), message: "c2-msg".into() },
            PlanEntry { action: PlanAction::Pick, commit_id: fixup.clone(), message: "fixup! c1-msg".into() },
        ];
        let squashed = autosquash(plan);
        assert_eq!(squashed[0].commit_id, c1);
        assert_eq!(squashed[1].commit_id, fixup);
        assert_eq!(squashed[1].action, PlanAction::Fixup);
        assert_eq!(squashed[2].commit_id, c2);
    }

    #[test]
    fn unmatched_fixup_moves_to_end() {
        let store = MemoryPersistence::new();
        let base = commit_with(&store, vec![], &[], "base");
        let c1 = commit_with(&store, vec![base], &[], "c1-msg");
        let stray = commit_with(&store, vec![c1.clone()], &[], "fixup! unknown-msg");

        let plan = vec![
            PlanEntry { action: PlanAction::Pick, commit_id: stray.clone(), message: "fixup! unknown-msg".into() },
            PlanEntry { action: PlanAction::Pick, commit_id: c1.clone(), message: "c1-msg".into() },
        ];
        let squashed = autosquash(plan);
        assert_eq!(squashed.last().unwrap().commit_id, stray);
    }

    #[test]
    fn parse_plan_rejects_unknown_action() {
        let result = parse_plan("bogus abc123 message", |_| Some(CommitId::from_hex_unchecked("a".repeat(64))));
        assert!(matches!(result, Err(PlanParseError::UnknownAction { .. })));
    }

    #[test]
    fn parse_plan_skips_comments_and_blank_lines() {
        let plan = parse_plan("# comment\n\npick abc123 do a thing\n", |_| Some(CommitId::from_hex_unchecked("b".repeat(64)))).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].message, "do a thing");
    }
}
