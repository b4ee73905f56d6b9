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

//! The find engine (§4.7): commit search over message text, with plain
//! substring filters pushed to the persistence layer and range filters
//! (`key=low-high`) tested here once candidates are loaded.

use chrono::DateTime;
use chrono::Utc;

use crate::commit::Commit;
use crate::error::MuseError;
use crate::persistence::Persistence;

/// One search filter. All filters supplied to [`find`] combine with AND.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Case-insensitive substring match against the commit message.
    /// Pushed down to the persistence layer when possible (§4.7).
    PlainText(String),
    /// `key=low-high`: the message must contain a `key = <number>` token
    /// (case-insensitive, flexible whitespace around `=`) whose value
    /// falls in `[low, high]`.
    Range { key: String, low: f64, high: f64 },
}

/// Parses one raw filter token. A token of the form `key=low-high` where
/// both bounds parse as non-negative decimals is a [`Filter::Range`];
/// everything else -- including a `key=value` token where `value` is not
/// a `low-high` pair -- is a [`Filter::PlainText`] substring match over
/// the whole token (§4.7: "or any substring").
pub fn parse_filter(token: &str) -> Filter {
    if let Some((key, rest)) = token.split_once('=') {
        if let Some((low_str, high_str)) = rest.split_once('-') {
            if let (Ok(low), Ok(high)) = (low_str.trim().parse::<f64>(), high_str.trim().parse::<f64>()) {
                if low >= 0.0 && high >= 0.0 {
                    return Filter::Range { key: key.trim().to_string(), low, high };
                }
            }
        }
    }
    Filter::PlainText(token.to_string())
}

#[derive(Clone, Debug, Default)]
pub struct FindQuery {
    pub filters: Vec<Filter>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
}

/// Runs `query` against `repo_id`'s commits. Plain-text filters are
/// handed to the persistence layer as a combined predicate (a
/// database-backed implementation may push some or all of them down to
/// SQL); range filters are always evaluated here, since they depend on
/// parsing a number out of free text that no generic backend can index.
pub fn find(store: &dyn Persistence, repo_id: &str, query: &FindQuery) -> Result<Vec<Commit>, MuseError> {
    let range_filters: Vec<&Filter> = query.filters.iter().filter(|f| matches!(f, Filter::Range { .. })).collect();
    let text_filters: Vec<&Filter> = query.filters.iter().filter(|f| matches!(f, Filter::PlainText(_))).collect();

    let predicate = move |commit: &Commit| -> bool {
        text_filters.iter().all(|f| match f {
            Filter::PlainText(needle) => commit.message.to_lowercase().contains(&needle.to_lowercase()),
            Filter::Range { .. } => unreachable!("text_filters only contains PlainText"),
        })
    };

    // A backend truncates to the limit it's given. If range filters still
    // need to run here, truncating at the backend could drop commits that
    // would have passed them -- so only pass the real limit through when
    // there's nothing left to filter in-engine.
    let backend_limit = if range_filters.is_empty() { query.limit } else { usize::MAX };
    let candidates = store.commits_matching(repo_id, query.since, query.until, &predicate, backend_limit)?;

    let mut results: Vec<Commit> = candidates
        .into_iter()
        .filter(|commit| {
            range_filters.iter().all(|f| match f {
                Filter::Range { key, low, high } => message_range_matches(&commit.message, key, *low, *high),
                Filter::PlainText(_) => unreachable!("range_filters only contains Range"),
            })
        })
        .collect();

    results.sort_by(|a, b| b.committed_at.cmp(&a.committed_at));
    results.truncate(query.limit);
    Ok(results)
}

/// Finds the first `\bkey\s*=\s*<number>\b` occurrence (case-insensitive)
/// in `message` and tests it against `[low, high]`. A message with no
/// such token never matches a range filter.
fn message_range_matches(message: &str, key: &str, low: f64, high: f64) -> bool {
    find_key_value(message, key).is_some_and(|value| value >= low && value <= high)
}

/// Scans `message` for `key` (case-insensitive, as a standalone word)
/// followed by optional whitespace, `=`, optional whitespace, and a
/// non-negative decimal number, itself bounded by a non-word character
/// or the end of the message.
fn find_key_value(message: &str, key: &str) -> Option<f64> {
    let lower = message.to_lowercase();
    let key_lower = key.to_lowercase();
    let bytes = lower.as_bytes();
    let mut search_from = 0;
    while let Some(rel_idx) = lower[search_from..].find(&key_lower) {
        let start = search_from + rel_idx;
        let end = start + key_lower.len();
        let left_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        if left_ok {
            let mut cursor = end;
            cursor = skip_whitespace(bytes, cursor);
            if cursor < bytes.len() && bytes[cursor] == b'=' {
                cursor += 1;
                cursor = skip_whitespace(bytes, cursor);
                let number_start = cursor;
                while cursor < bytes.len() && (bytes[cursor].is_ascii_digit() || bytes[cursor] == b'.') {
                    cursor += 1;
                }
                if cursor > number_start {
                    let boundary_ok = cursor == bytes.len() || !is_word_byte(bytes[cursor]);
                    if boundary_ok {
                        if let Ok(value) = lower[number_start..cursor].parse::<f64>() {
                            return Some(value);
                        }
                    }
                }
            }
        }
        search_from = start + 1;
        if search_from >= lower.len() {
            break;
        }
    }
    None
}

fn skip_whitespace(bytes: &[u8], mut cursor: usize) -> usize {
    while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
        cursor += 1;
    }
    cursor
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use chrono::Utc;

    use super::*;
    use crate::commit::Commit;
    use crate::manifest::Manifest;
    use crate::memory_store::MemoryPersistence;

    fn commit_at(store: &MemoryPersistence, message: &str, committed_at: DateTime<Utc>) -> Commit {
        let snapshot_id = store.put_snapshot(&Manifest::new()).unwrap();
        let c = Commit::new("repo".into(), "main".into(), vec![], snapshot_id, message.into(), "me".into(), committed_at);
        store.put_commit(&c).unwrap();
        c
    }

    #[test]
    fn parse_filter_recognizes_range_vs_plain_text() {
        assert_eq!(parse_filter("key=40-60"), Filter::Range { key: "key".into(), low: 40.0, high: 60.0 });
        assert_eq!(parse_filter("bpm=120-140"), Filter::Range { key: "bpm".into(), low: 120.0, high: 140.0 });
        assert_eq!(parse_filter("remix"), Filter::PlainText("remix".into()));
        assert_eq!(parse_filter("mood=sad"), Filter::PlainText("mood=sad".into()));
    }

    #[test]
    fn range_filter_matches_key_value_in_message() {
        let store = MemoryPersistence::new();
        let now = Utc::now();
        commit_at(&store, "raise bpm=128 on the chorus", now);
        commit_at(&store, "drop bpm=95 for the bridge", now - Duration::seconds(1));

        let query = FindQuery { filters: vec![parse_filter("bpm=100-140")], since: None, until: None, limit: 10 };
        let results = find(&store, "repo", &query).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].message.contains("128"));
    }

    #[test]
    fn plain_text_filter_is_case_insensitive() {
        let store = MemoryPersistence::new();
        let now = Utc::now();
        commit_at(&store, "Remix the vocal take", now);
        commit_at(&store, "unrelated change", now - Duration::seconds(1));

        let query = FindQuery { filters: vec![parse_filter("REMIX")], since: None, until: None, limit: 10 };
        let results = find(&store, "repo", &query).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn results_are_newest_first_and_capped_at_limit() {
        let store = MemoryPersistence::new();
        let now = Utc::now();
        for i in 0..5 {
            commit_at(&store, &format!("take {i}"), now - Duration::seconds(i));
        }
        let query = FindQuery { filters: vec![], since: None, until: None, limit: 2 };
        let results = find(&store, "repo", &query).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].committed_at > results[1].committed_at);
    }

    #[test]
    fn combined_filters_require_all_to_match() {
        let store = MemoryPersistence::new();
        let now = Utc::now();
        commit_at(&store, "remix bpm=130 drop", now);
        commit_at(&store, "remix bpm=80 drop", now - Duration::seconds(1));
        commit_at(&store, "other bpm=130 change", now - Duration::seconds(2));

        let query = FindQuery {
            filters: vec![parse_filter("remix"), parse_filter("bpm=100-140")],
            since: None,
            until: None,
            limit: 10,
        };
        let results = find(&store, "repo", &query).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].message.starts_with("remix bpm=130"));
    }
}
