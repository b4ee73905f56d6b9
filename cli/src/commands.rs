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

//! Subcommand definitions. Each variant is a thin wrapper: parse args,
//! call one [`muse_lib::Repository`] method, print the result. No VCS
//! logic lives here.

use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use clap::Subcommand;
use muse_lib::CommitId;
use muse_lib::MuseError;
use muse_lib::Repository;
use muse_lib::Revision;
use muse_lib::find::FindQuery;
use muse_lib::find::parse_filter;
use muse_lib::merge::MergeOptions;
use muse_lib::merge::MergeOutcome;
use muse_lib::merge::MergeStrategyOpt;
use muse_lib::merge::ResolveSide;
use muse_lib::rewrite::RebaseOutcome;
use muse_lib::rewrite::parse_plan;

use crate::cli_util;

#[derive(Parser)]
#[command(name = "muse", about = "Version control for music production artifacts")]
pub struct Cli {
    /// Repository root to operate on (defaults to walking up from cwd).
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new repository at `path`.
    Init {
        path: PathBuf,
        #[arg(long, default_value = "main")]
        branch: String,
    },
    /// Snapshot the working tree and commit it on the current branch.
    Commit {
        #[arg(short, long)]
        message: String,
        #[arg(long)]
        author: Option<String>,
    },
    #[command(subcommand)]
    Branch(BranchCommand),
    /// Switch HEAD to `branch` and project it onto the working tree.
    Checkout { branch: String },
    /// Merge `branch` into the current branch.
    Merge {
        branch: String,
        #[arg(long)]
        no_ff: bool,
        #[arg(long)]
        squash: bool,
        #[arg(long, value_enum)]
        strategy: Option<Strategy>,
        #[arg(short, long, default_value = "merge")]
        message: String,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        r#continue: bool,
        #[arg(long)]
        abort: bool,
    },
    /// Mark a conflicted path resolved during an in-progress merge.
    Resolve {
        path: String,
        #[arg(long, conflicts_with = "theirs")]
        ours: bool,
        #[arg(long)]
        theirs: bool,
    },
    /// Replay the current branch's commits onto `upstream`.
    Rebase {
        upstream: Option<String>,
        #[arg(long)]
        autosquash: bool,
        /// Path to an interactive plan (pick/squash/fixup/drop/reword lines)
        /// to replay instead of the auto-generated all-`pick` plan.
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        r#continue: bool,
        #[arg(long)]
        abort: bool,
    },
    /// Report musical divergence between two branches.
    Divergence { branch_a: String, branch_b: String },
    /// Search commit messages.
    Find {
        filters: Vec<String>,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        until: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show HEAD, the working-tree diff against it, and any in-progress operation.
    Status,
}

#[derive(Subcommand)]
pub enum BranchCommand {
    Create {
        name: String,
        #[arg(long)]
        at: Option<String>,
    },
    Delete { name: String },
    List,
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum Strategy {
    Ours,
    Theirs,
}

fn resolve_author(explicit: Option<String>) -> String {
    explicit
        .or_else(|| std::env::var("MUSE_AUTHOR").ok())
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a `--since`/`--until` bound, given as RFC 3339 (e.g.
/// `2024-01-01T00:00:00Z`).
fn parse_datetime(text: &str) -> Result<chrono::DateTime<Utc>, MuseError> {
    text.parse::<chrono::DateTime<Utc>>()
        .map_err(|e| MuseError::Usage(format!("invalid date {text:?}: {e}")))
}

pub fn run(cli: Cli) -> Result<(), MuseError> {
    match cli.command {
        Command::Init { path, branch } => {
            std::fs::create_dir_all(&path).map_err(MuseError::IoError)?;
            let repo_id = uuid_like_repo_id();
            Repository::init_fs(&path, repo_id, &branch)?;
            println!("Initialized muse repository in {}", path.display());
            Ok(())
        }
        Command::Commit { message, author } => {
            let repo = cli_util::open_repo(cli.repo.as_deref())?;
            let id = repo.commit(&message, &resolve_author(author), Utc::now())?;
            println!("{id}");
            Ok(())
        }
        Command::Branch(sub) => run_branch(&cli.repo, sub),
        Command::Checkout { branch } => {
            let repo = cli_util::open_repo(cli.repo.as_deref())?;
            repo.checkout(&branch)
        }
        Command::Merge { branch, no_ff, squash, strategy, message, author, r#continue, abort } => {
            let repo = cli_util::open_repo(cli.repo.as_deref())?;
            if abort {
                return repo.abort_merge();
            }
            if r#continue {
                let id = repo.continue_merge(&resolve_author(author), &message, Utc::now())?;
                println!("{id}");
                return Ok(());
            }
            let options = MergeOptions {
                no_ff,
                squash,
                strategy: match strategy {
                    Some(Strategy::Ours) => MergeStrategyOpt::Ours,
                    Some(Strategy::Theirs) => MergeStrategyOpt::Theirs,
                    None => MergeStrategyOpt::Default,
                },
            };
            let outcome = repo.merge(&branch, &options, &resolve_author(author), &message, Utc::now())?;
            print_merge_outcome(&outcome);
            Ok(())
        }
        Command::Resolve { path, ours, theirs } => {
            let repo = cli_util::open_repo(cli.repo.as_deref())?;
            let side = if theirs {
                ResolveSide::Theirs
            } else if ours {
                ResolveSide::Ours
            } else {
                return Err(MuseError::Usage("resolve requires --ours or --theirs".to_string()));
            };
            repo.resolve_conflict(&path, side)
        }
        Command::Rebase { upstream, autosquash, plan, author, r#continue, abort } => {
            let repo = cli_util::open_repo(cli.repo.as_deref())?;
            if abort {
                return repo.abort_rebase();
            }
            if r#continue {
                let outcome = repo.continue_rebase(&resolve_author(author), Utc::now())?;
                print_rebase_outcome(&outcome);
                return Ok(());
            }
            let upstream = upstream.ok_or_else(|| MuseError::Usage("rebase requires an upstream branch".to_string()))?;
            let plan = match plan {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)?;
                    parse_plan(&text, |short| repo.resolve(Revision::CommitIdOrPrefix(short)).ok())
                        .map_err(|e| MuseError::Usage(e.to_string()))?
                }
                None => repo.rebase_plan(&upstream, autosquash)?,
            };
            let outcome = repo.rebase(&upstream, plan, &resolve_author(author), Utc::now())?;
            print_rebase_outcome(&outcome);
            Ok(())
        }
        Command::Divergence { branch_a, branch_b } => {
            let repo = cli_util::open_repo(cli.repo.as_deref())?;
            let report = repo.divergence(&branch_a, &branch_b)?;
            for dim in &report.per_dimension {
                println!("{:?}: score={:.2} level={:?}", dim.dimension, dim.score, dim.level);
            }
            println!("overall: score={:.2} level={:?}", report.overall_score, report.overall_level);
            Ok(())
        }
        Command::Find { filters, since, until, limit } => {
            let repo = cli_util::open_repo(cli.repo.as_deref())?;
            let query = FindQuery {
                filters: filters.iter().map(|f| parse_filter(f)).collect(),
                since: since.as_deref().map(parse_datetime).transpose()?,
                until: until.as_deref().map(parse_datetime).transpose()?,
                limit: limit.unwrap_or(20),
            };
            let commits = repo.find(&query)?;
            for commit in commits {
                println!("{} {}", &commit.commit_id.as_hex()[..12], commit.message);
            }
            Ok(())
        }
        Command::Status => {
            let repo = cli_util::open_repo(cli.repo.as_deref())?;
            let status = repo.status()?;
            print_status(&status);
            Ok(())
        }
    }
}

fn run_branch(repo_override: &Option<PathBuf>, sub: BranchCommand) -> Result<(), MuseError> {
    let repo = cli_util::open_repo(repo_override.as_deref())?;
    match sub {
        BranchCommand::Create { name, at } => {
            let target: Option<CommitId> = at.map(|text| repo.resolve(Revision::CommitIdOrPrefix(&text))).transpose()?;
            let id = repo.create_branch(&name, target.as_ref())?;
            println!("{name} -> {id}");
            Ok(())
        }
        BranchCommand::Delete { name } => repo.delete_branch(&name),
        BranchCommand::List => {
            for name in repo.list_branches()? {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn print_merge_outcome(outcome: &MergeOutcome) {
    match outcome {
        MergeOutcome::FastForward { new_tip } => println!("fast-forward to {new_tip}"),
        MergeOutcome::AlreadyUpToDate => println!("already up to date"),
        MergeOutcome::Merged { commit_id } => println!("merged as {commit_id}"),
        MergeOutcome::Conflicted { paths } => {
            println!("conflict in {} path(s):", paths.len());
            for path in paths {
                println!("  {path}");
            }
        }
    }
}

fn print_rebase_outcome(outcome: &RebaseOutcome) {
    match outcome {
        RebaseOutcome::NothingToRebase => println!("nothing to rebase"),
        RebaseOutcome::Completed { new_tip, replayed } => {
            println!("rebased {} commit(s), new tip {new_tip}", replayed.len());
        }
        RebaseOutcome::Conflicted { commit, paths } => {
            println!("conflict replaying {commit} in {} path(s):", paths.len());
            for path in paths {
                println!("  {path}");
            }
        }
    }
}

fn print_status(status: &muse_lib::repo::RepoStatus) {
    match &status.head {
        muse_lib::refs::Head::Branch(name) => println!("On branch {name}"),
        muse_lib::refs::Head::Detached(id) => println!("HEAD detached at {id}"),
    }
    if status.merge_in_progress {
        println!("A merge is in progress.");
    }
    if status.rebase_in_progress {
        println!("A rebase is in progress.");
    }
    let diff = &status.working_tree_diff;
    for path in &diff.added {
        println!("  added:    {path}");
    }
    for path in &diff.modified {
        println!("  modified: {path}");
    }
    for path in &diff.removed {
        println!("  removed:  {path}");
    }
}

/// A repo id with no external entropy source available at this layer
/// (no uuid dependency): derived from the path and current time, good
/// enough to scope a single local repository.
fn uuid_like_repo_id() -> String {
    use std::time::SystemTime;
    use std::time::UNIX_EPOCH;
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or_default();
    format!("{nanos:032x}")
}
