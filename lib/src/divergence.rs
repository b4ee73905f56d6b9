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

//! The divergence engine (§4.6): a qualitative read on how two branches'
//! changes overlap, bucketed by a fixed table of musical-production
//! dimensions.

use std::collections::BTreeSet;

use crate::commit::CommitId;
use crate::dag::lca;
use crate::error::MuseError;
use crate::manifest::Manifest;
use crate::manifest::diff;
use crate::persistence::Persistence;

/// A musical-production dimension a changed path may be classified under.
/// A path can match more than one; a path matching none contributes to no
/// dimension's score (§4.6 step 4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    Melodic,
    Harmonic,
    Rhythmic,
    Structural,
    Dynamic,
}

impl Dimension {
    pub const ALL: [Dimension; 5] =
        [Dimension::Melodic, Dimension::Harmonic, Dimension::Rhythmic, Dimension::Structural, Dimension::Dynamic];

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Dimension::Melodic => &["melody", "lead", "solo", "vocal"],
            Dimension::Harmonic => &["harm", "chord", "key", "scale"],
            Dimension::Rhythmic => &["beat", "drum", "rhythm", "groove", "perc"],
            Dimension::Structural => {
                &["struct", "form", "section", "bridge", "chorus", "verse", "intro", "outro"]
            }
            Dimension::Dynamic => &["mix", "master", "volume", "level", "dyn"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Melodic => "melodic",
            Dimension::Harmonic => "harmonic",
            Dimension::Rhythmic => "rhythmic",
            Dimension::Structural => "structural",
            Dimension::Dynamic => "dynamic",
        }
    }

    /// Whether `path`, compared case-insensitively, contains one of this
    /// dimension's keyword substrings.
    fn matches(self, path_lower: &str) -> bool {
        self.keywords().iter().any(|kw| path_lower.contains(kw))
    }
}

/// The qualitative bucket a numeric score falls into (§4.6 step 7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    None,
    Low,
    Medium,
    High,
}

impl Level {
    fn from_score(score: f64) -> Self {
        if score < 0.15 {
            Level::None
        } else if score < 0.40 {
            Level::Low
        } else if score < 0.70 {
            Level::Medium
        } else {
            Level::High
        }
    }
}

#[derive(Clone, Debug)]
pub struct DimensionScore {
    pub dimension: Dimension,
    pub a_paths: BTreeSet<String>,
    pub b_paths: BTreeSet<String>,
    pub score: f64,
    pub level: Level,
}

#[derive(Clone, Debug)]
pub struct DivergenceReport {
    pub base: Option<CommitId>,
    pub per_dimension: Vec<DimensionScore>,
    pub overall_score: f64,
    pub overall_level: Level,
}

/// Computes the divergence report between branch tips `a` and `b`.
pub fn divergence(store: &dyn Persistence, a: &CommitId, b: &CommitId) -> Result<DivergenceReport, MuseError> {
    let base = lca(store, a, b)?;
    let base_manifest = match &base {
        Some(base_id) => load_manifest(store, base_id)?,
        None => Manifest::new(),
    };
    let a_manifest = load_manifest(store, a)?;
    let b_manifest = load_manifest(store, b)?;

    let a_changes = diff(&base_manifest, &a_manifest).changed_paths();
    let b_changes = diff(&base_manifest, &b_manifest).changed_paths();

    let mut per_dimension = Vec::with_capacity(Dimension::ALL.len());
    let mut score_sum = 0.0;
    for dimension in Dimension::ALL {
        let a_paths: BTreeSet<String> =
            a_changes.iter().filter(|p| dimension.matches(&p.to_lowercase())).cloned().collect();
        let b_paths: BTreeSet<String> =
            b_changes.iter().filter(|p| dimension.matches(&p.to_lowercase())).cloned().collect();
        let score = jaccard_distance(&a_paths, &b_paths);
        score_sum += score;
        per_dimension.push(DimensionScore { dimension, a_paths, b_paths, score, level: Level::from_score(score) });
    }

    let overall_score = score_sum / Dimension::ALL.len() as f64;
    Ok(DivergenceReport { base, per_dimension, overall_score, overall_level: Level::from_score(overall_score) })
}

/// `|a △ b| / |a ∪ b|`; an empty union scores 0.0 rather than dividing by
/// zero (§4.6 step 5: two branches that touch nothing in a dimension have
/// not diverged in it).
fn jaccard_distance(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union: BTreeSet<&String> = a.union(b).collect();
    if union.is_empty() {
        return 0.0;
    }
    let symmetric_difference = a.symmetric_difference(b).count();
    symmetric_difference as f64 / union.len() as f64
}

fn load_manifest(store: &dyn Persistence, commit_id: &CommitId) -> Result<Manifest, MuseError> {
    let commit = store
        .get_commit(commit_id)?
        .ok_or_else(|| MuseError::CorruptState(format!("missing commit {commit_id}")))?;
    store
        .get_snapshot(&commit.snapshot_id)?
        .ok_or_else(|| MuseError::CorruptState(format!("missing snapshot {}", commit.snapshot_id)))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::commit::Commit;
    use crate::manifest::Manifest;
    use crate::memory_store::MemoryPersistence;
    use crate::object_store::ObjectStore as _;

    fn commit_with(store: &MemoryPersistence, parents: Vec<CommitId>, paths: &[&str]) -> CommitId {
        let mut manifest = Manifest::new();
        for path in paths {
            let id = store.put_object(path.as_bytes()).unwrap();
            manifest.insert(path.to_string(), id);
        }
        let snapshot_id = store.put_snapshot(&manifest).unwrap();
        let c = Commit::new("repo".into(), "main".into(), parents, snapshot_id, "msg".into(), "me".into(), Utc::now());
        store.put_commit(&c).unwrap();
        c.commit_id
    }

    #[test]
    fn diverging_melody_and_mix_edits_score_high_on_their_own_dimensions() {
        let store = MemoryPersistence::new();
        let base = commit_with(&store, vec![], &["tracks/drums.mid"]);
        let a = commit_with(&store, vec![base.clone()], &["tracks/drums.mid", "tracks/melody_lead.mid"]);
        let b = commit_with(&store, vec![base], &["tracks/drums.mid", "tracks/mix.json"]);

        let report = divergence(&store, &a, &b).unwrap();
        let melodic = report.per_dimension.iter().find(|d| d.dimension == Dimension::Melodic).unwrap();
        assert_eq!(melodic.score, 1.0);
        assert_eq!(melodic.level, Level::High);

        let rhythmic = report.per_dimension.iter().find(|d| d.dimension == Dimension::Rhythmic).unwrap();
        assert_eq!(rhythmic.score, 0.0);
        assert_eq!(rhythmic.level, Level::None);

        let dynamic = report.per_dimension.iter().find(|d| d.dimension == Dimension::Dynamic).unwrap();
        assert_eq!(dynamic.score, 1.0);
    }

    #[test]
    fn identical_changes_do_not_diverge() {
        let store = MemoryPersistence::new();
        let base = commit_with(&store, vec![], &[]);
        let a = commit_with(&store, vec![base.clone()], &["tracks/beat.mid"]);
        let b = commit_with(&store, vec![base], &["tracks/beat.mid"]);
        let report = divergence(&store, &a, &b).unwrap();
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.overall_level, Level::None);
    }

    #[test]
    fn disjoint_histories_treat_base_as_empty() {
        let store = MemoryPersistence::new();
        let a = commit_with(&store, vec![], &["tracks/melody_lead.mid"]);
        let b = commit_with(&store, vec![], &["tracks/drums.mid"]);
        let report = divergence(&store, &a, &b).unwrap();
        assert!(report.base.is_none());
        // melodic and rhythmic each score 1.0 (fully disjoint in that
        // dimension); the other three dimensions are untouched and score
        // 0.0, so the mean over all five is 0.4.
        assert!((report.overall_score - 0.4).abs() < 1e-9);
        assert_eq!(report.overall_level, Level::Medium);
    }
}
