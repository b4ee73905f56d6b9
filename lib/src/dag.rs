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

//! Ancestor queries over the commit DAG (§4.3): lowest common ancestor and
//! first-parent ranges. Traversal is an explicit-queue BFS, bounded by the
//! size of the history actually walked -- no recursion, so there's no
//! stack depth concern on long linear histories.

use std::collections::HashSet;
use std::collections::VecDeque;

use crate::commit::CommitId;
use crate::error::MuseError;
use crate::persistence::Persistence;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    A,
    B,
    Both,
}

/// Colours nodes reached from `a` and `b` by BFS over parent edges
/// (both parents of a merge commit are followed) and returns the first
/// node reached by both colours. Ties are broken by whichever traversal
/// was queued earlier, which in practice means the side whose BFS frontier
/// reaches the node first explores it first -- deterministic given a fixed
/// traversal order, as required by §4.3.
pub fn lca(store: &dyn Persistence, a: &CommitId, b: &CommitId) -> Result<Option<CommitId>, MuseError> {
    if a == b {
        return Ok(Some(a.clone()));
    }

    let mut colour: std::collections::HashMap<CommitId, Colour> = std::collections::HashMap::new();
    let mut queue: VecDeque<CommitId> = VecDeque::new();
    colour.insert(a.clone(), Colour::A);
    colour.insert(b.clone(), Colour::B);
    queue.push_back(a.clone());
    queue.push_back(b.clone());

    while let Some(id) = queue.pop_front() {
        let mine = *colour.get(&id).expect("queued node was coloured before being pushed");
        let commit = load_commit(store, &id)?;
        for parent in &commit.parent_ids {
            match colour.get(parent).copied() {
                None => {
                    colour.insert(parent.clone(), mine);
                    queue.push_back(parent.clone());
                }
                Some(Colour::Both) => {}
                Some(existing) if existing != mine => {
                    colour.insert(parent.clone(), Colour::Both);
                    return Ok(Some(parent.clone()));
                }
                Some(_) => {}
            }
        }
    }
    Ok(None)
}

/// Whether `ancestor` is reachable from `descendant` by following parent
/// edges (both parents of a merge are considered ancestors). Used to
/// detect a fast-forward: `lca(ours, theirs) == ours` iff `ours` is an
/// ancestor of `theirs`.
pub fn is_ancestor(store: &dyn Persistence, ancestor: &CommitId, descendant: &CommitId) -> Result<bool, MuseError> {
    if ancestor == descendant {
        return Ok(true);
    }
    let mut seen: HashSet<CommitId> = HashSet::new();
    let mut queue: VecDeque<CommitId> = VecDeque::from([descendant.clone()]);
    while let Some(id) = queue.pop_front() {
        if &id == ancestor {
            return Ok(true);
        }
        if !seen.insert(id.clone()) {
            continue;
        }
        let commit = load_commit(store, &id)?;
        for parent in &commit.parent_ids {
            queue.push_back(parent.clone());
        }
    }
    Ok(false)
}

/// Commits reachable from `tip` but not an ancestor of `base`, oldest
/// first, following only the first-parent chain (§4.3: "to avoid
/// re-replaying merge inlines"). If `base` is not an ancestor of `tip`
/// this walks all the way to the root.
pub fn commits_between(store: &dyn Persistence, tip: &CommitId, base: &CommitId) -> Result<Vec<CommitId>, MuseError> {
    let mut chain = Vec::new();
    let mut current = tip.clone();
    loop {
        if &current == base {
            break;
        }
        chain.push(current.clone());
        let commit = load_commit(store, &current)?;
        match commit.first_parent() {
            Some(parent) => current = parent.clone(),
            None => break,
        }
    }
    chain.reverse();
    Ok(chain)
}

fn load_commit(store: &dyn Persistence, id: &CommitId) -> Result<crate::commit::Commit, MuseError> {
    store
        .get_commit(id)?
        .ok_or_else(|| MuseError::CorruptState(format!("commit DAG references missing commit {id}")))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::commit::Commit;
    use crate::manifest::Manifest;
    use crate::memory_store::MemoryPersistence;

    fn commit(store: &MemoryPersistence, parents: Vec<CommitId>, message: &str) -> CommitId {
        let snapshot_id = store.put_snapshot(&Manifest::new()).unwrap();
        let c = Commit::new("repo".into(), "main".into(), parents, snapshot_id, message.into(), "me".into(), Utc::now());
        store.put_commit(&c).unwrap();
        c.commit_id
    }

    #[test]
    fn lca_of_linear_history() {
        let store = MemoryPersistence::new();
        let c1 = commit(&store, vec![], "c1");
        let c2 = commit(&store, vec![c1.clone()], "c2");
        let c3 = commit(&store, vec![c2.clone()], "c3");
        assert_eq!(lca(&store, &c2, &c3).unwrap(), Some(c2.clone()));
        assert!(is_ancestor(&store, &c1, &c3).unwrap());
        assert!(!is_ancestor(&store, &c3, &c1).unwrap());
    }

    #[test]
    fn lca_of_diverged_branches() {
        let store = MemoryPersistence::new();
        let c1 = commit(&store, vec![], "c1");
        let c2 = commit(&store, vec![c1.clone()], "c2");
        let c3 = commit(&store, vec![c1.clone()], "c3");
        assert_eq!(lca(&store, &c2, &c3).unwrap(), Some(c1));
    }

    #[test]
    fn commits_between_follows_first_parent_only() {
        let store = MemoryPersistence::new();
        let c1 = commit(&store, vec![], "c1");
        let c2 = commit(&store, vec![c1.clone()], "c2");
        let other = commit(&store, vec![c1.clone()], "other");
        let merge = commit(&store, vec![c2.clone(), other], "merge");
        let between = commits_between(&store, &merge, &c1).unwrap();
        assert_eq!(between, vec![c2, merge]);
    }
}
