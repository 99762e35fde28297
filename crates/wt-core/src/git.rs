//! Thin wrappers over `git` for worktree management.

use crate::error::{Result, WtError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// The worktree operations lifecycle commands depend on.
pub trait Worktrees {
    /// Create a worktree at `path` on `branch`, creating the branch if needed.
    fn add(&self, root: &Path, path: &Path, branch: &str) -> Result<()>;

    /// Remove the worktree at `path`, discarding local changes.
    fn remove(&self, root: &Path, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GitWorktrees;

impl Worktrees for GitWorktrees {
    fn add(&self, root: &Path, path: &Path, branch: &str) -> Result<()> {
        add_worktree(root, path, branch)
    }

    fn remove(&self, root: &Path, path: &Path) -> Result<()> {
        remove_worktree(root, path)
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub head: String,
    /// Full ref, e.g. `refs/heads/feature/auth`. Empty for a detached HEAD.
    pub branch: String,
}

impl WorktreeInfo {
    pub fn branch_name(&self) -> &str {
        self.branch
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.branch)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorktreeStats {
    pub dirty: bool,
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
}

impl WorktreeStats {
    /// `"N changed  +X -Y"` when dirty, `"clean"` otherwise.
    pub fn summary(&self) -> String {
        if !self.dirty || (self.files_changed == 0 && self.insertions == 0 && self.deletions == 0)
        {
            return "clean".to_string();
        }
        format!(
            "{} changed  +{} -{}",
            self.files_changed, self.insertions, self.deletions
        )
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

fn git(dir: &Path, args: &[&str]) -> Result<Output> {
    Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map_err(|source| WtError::Spawn {
            command: format!("git {}", args.join(" ")),
            source,
        })
}

/// Run git and return trimmed stdout, failing on a nonzero exit.
fn git_ok(dir: &Path, args: &[&str]) -> Result<String> {
    let output = git(dir, args)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("unknown error")
            .trim()
            .to_string();
        return Err(WtError::Git {
            args: args.join(" "),
            message,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

pub fn repo_root(dir: &Path) -> Result<PathBuf> {
    git_ok(dir, &["rev-parse", "--show-toplevel"]).map(PathBuf::from)
}

pub fn branch_exists(root: &Path, branch: &str) -> bool {
    git(root, &["rev-parse", "--verify", "--quiet", branch])
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn add_worktree(root: &Path, path: &Path, branch: &str) -> Result<()> {
    let path = path.to_string_lossy();
    if branch_exists(root, branch) {
        git_ok(root, &["worktree", "add", &path, branch])?;
    } else {
        git_ok(root, &["worktree", "add", &path, "-b", branch])?;
    }
    Ok(())
}

pub fn remove_worktree(root: &Path, path: &Path) -> Result<()> {
    let path = path.to_string_lossy();
    git_ok(root, &["worktree", "remove", &path, "--force"])?;
    Ok(())
}

pub fn list_worktrees(root: &Path) -> Result<Vec<WorktreeInfo>> {
    let out = git_ok(root, &["worktree", "list", "--porcelain"])?;
    Ok(parse_porcelain(&out))
}

pub fn parse_porcelain(output: &str) -> Vec<WorktreeInfo> {
    output
        .trim()
        .split("\n\n")
        .filter_map(|block| {
            let mut path = None;
            let mut head = String::new();
            let mut branch = String::new();
            for line in block.trim().lines() {
                if let Some(v) = line.strip_prefix("worktree ") {
                    path = Some(PathBuf::from(v));
                } else if let Some(v) = line.strip_prefix("HEAD ") {
                    head = v.to_string();
                } else if let Some(v) = line.strip_prefix("branch ") {
                    branch = v.to_string();
                }
            }
            Some(WorktreeInfo {
                path: path?,
                head,
                branch,
            })
        })
        .collect()
}

/// Dirty flag plus `git diff --shortstat HEAD` counts. Errors read as clean.
pub fn worktree_stats(path: &Path) -> WorktreeStats {
    let dirty = git_ok(path, &["status", "--porcelain"])
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    if !dirty {
        return WorktreeStats::default();
    }
    let shortstat = git_ok(path, &["diff", "--shortstat", "HEAD"]).unwrap_or_default();
    WorktreeStats {
        dirty,
        ..parse_shortstat(&shortstat)
    }
}

/// Parse ` 3 files changed, 10 insertions(+), 2 deletions(-)`.
pub fn parse_shortstat(line: &str) -> WorktreeStats {
    let mut stats = WorktreeStats::default();
    for part in line.split(',') {
        let mut words = part.split_whitespace();
        let (Some(n), Some(kind)) = (words.next(), words.next()) else {
            continue;
        };
        let Ok(n) = n.parse::<u32>() else {
            continue;
        };
        if kind.starts_with("file") {
            stats.files_changed = n;
        } else if kind.starts_with("insertion") {
            stats.insertions = n;
        } else if kind.starts_with("deletion") {
            stats.deletions = n;
        }
    }
    stats
}

/// Default branch from `origin/HEAD`, falling back to `main`.
pub fn default_branch(root: &Path) -> String {
    git_ok(root, &["symbolic-ref", "refs/remotes/origin/HEAD"])
        .ok()
        .and_then(|r| r.strip_prefix("refs/remotes/origin/").map(str::to_string))
        .unwrap_or_else(|| "main".to_string())
}

pub fn fetch(root: &Path, branch: &str) -> Result<String> {
    let output = git(root, &["fetch", "origin", branch])?;
    if !output.status.success() {
        return Err(WtError::Git {
            args: format!("fetch origin {branch}"),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    // git fetch reports progress on stderr
    Ok(String::from_utf8_lossy(&output.stderr).trim().to_string())
}
